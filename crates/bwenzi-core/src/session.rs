// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session model and the dual-tier session manager.
//!
//! A [`Session`] is the typed view of one live USSD conversation. The
//! [`SessionManager`] keeps sessions in an in-memory cache and writes every
//! mutation through to the durable store; reads go durable-first so a
//! restarted process picks the conversation back up mid-flow.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::persistence::{SessionRecord, SessionStore};

/// Steps of the registration flow, in conversation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegStep {
    /// Terms and conditions accept/decline.
    Terms,
    /// First name entry.
    FirstName,
    /// Last name entry.
    LastName,
    /// Gender selection.
    Gender,
    /// Province selection.
    Province,
    /// District selection, scoped to the chosen province.
    District,
    /// Free-text address or township.
    Address,
    /// Coarse business sector (pre-profiling).
    BusinessSector,
    /// National Registration Card number, optional.
    Nrc,
    /// PIN creation.
    Pin,
    /// PIN confirmation.
    PinConfirm,
}

/// Steps of the business profiling flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BizStep {
    /// Whether the member runs a business today.
    HasBusiness,
    /// Detailed business sector.
    Sector,
    /// Business name, optional.
    Name,
    /// Monthly revenue range.
    Revenue,
}

/// Steps of the subscription and payment-setup flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubStep {
    /// Plan selection.
    PlanSelect,
    /// Cooperative membership opt-in.
    Cooperative,
    /// Mobile money vs bank transfer.
    PaymentMethod,
    /// Use session number or enter a different one.
    MobileChoice,
    /// Manual mobile money number entry.
    MobileNumber,
    /// Final payment confirmation.
    Confirm,
}

/// Steps of the in-session payment retry flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayStep {
    /// A charge attempt is in flight.
    Processing,
    /// Charge succeeded; completing registration.
    Success,
    /// Charge failed; offering retry or cancel.
    Failed,
}

/// Position of a session in the conversation state machine.
///
/// Serialized to flat snake_case strings (`reg_terms`, `sub_confirm`, ...)
/// so stored sessions stay readable and compatible across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Fresh session, no routing decision made yet.
    Start,
    /// Registration flow.
    Registration(RegStep),
    /// Business profiling flow.
    Business(BizStep),
    /// Subscription and payment-setup flow.
    Subscription(SubStep),
    /// Payment retry flow.
    Payment(PayStep),
    /// Existing member entering their PIN.
    LoginPin,
    /// Authenticated member at the main menu.
    MainMenu,
}

impl SessionState {
    /// Wire form of the state, as stored in the durable tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Registration(step) => match step {
                RegStep::Terms => "reg_terms",
                RegStep::FirstName => "reg_first_name",
                RegStep::LastName => "reg_last_name",
                RegStep::Gender => "reg_gender",
                RegStep::Province => "reg_province",
                RegStep::District => "reg_district",
                RegStep::Address => "reg_address",
                RegStep::BusinessSector => "reg_business_sector",
                RegStep::Nrc => "reg_nrc",
                RegStep::Pin => "reg_pin",
                RegStep::PinConfirm => "reg_pin_confirm",
            },
            Self::Business(step) => match step {
                BizStep::HasBusiness => "biz_has_business",
                BizStep::Sector => "biz_sector",
                BizStep::Name => "biz_name",
                BizStep::Revenue => "biz_revenue",
            },
            Self::Subscription(step) => match step {
                SubStep::PlanSelect => "sub_plan_select",
                SubStep::Cooperative => "sub_cooperative",
                SubStep::PaymentMethod => "sub_payment_method",
                SubStep::MobileChoice => "sub_mobile_choice",
                SubStep::MobileNumber => "sub_mobile_number",
                SubStep::Confirm => "sub_confirm",
            },
            Self::Payment(step) => match step {
                PayStep::Processing => "pay_processing",
                PayStep::Success => "pay_success",
                PayStep::Failed => "pay_failed",
            },
            Self::LoginPin => "login_pin",
            Self::MainMenu => "main_menu",
        }
    }

    /// Parse the wire form back into a state. Unknown strings yield `None`;
    /// the dispatcher treats them as a fresh session.
    pub fn parse(s: &str) -> Option<Self> {
        let state = match s {
            "start" => Self::Start,
            "reg_terms" => Self::Registration(RegStep::Terms),
            "reg_first_name" => Self::Registration(RegStep::FirstName),
            "reg_last_name" => Self::Registration(RegStep::LastName),
            "reg_gender" => Self::Registration(RegStep::Gender),
            "reg_province" => Self::Registration(RegStep::Province),
            "reg_district" => Self::Registration(RegStep::District),
            "reg_address" => Self::Registration(RegStep::Address),
            "reg_business_sector" => Self::Registration(RegStep::BusinessSector),
            "reg_nrc" => Self::Registration(RegStep::Nrc),
            "reg_pin" => Self::Registration(RegStep::Pin),
            "reg_pin_confirm" => Self::Registration(RegStep::PinConfirm),
            "biz_has_business" => Self::Business(BizStep::HasBusiness),
            "biz_sector" => Self::Business(BizStep::Sector),
            "biz_name" => Self::Business(BizStep::Name),
            "biz_revenue" => Self::Business(BizStep::Revenue),
            "sub_plan_select" => Self::Subscription(SubStep::PlanSelect),
            "sub_cooperative" => Self::Subscription(SubStep::Cooperative),
            "sub_payment_method" => Self::Subscription(SubStep::PaymentMethod),
            "sub_mobile_choice" => Self::Subscription(SubStep::MobileChoice),
            "sub_mobile_number" => Self::Subscription(SubStep::MobileNumber),
            "sub_confirm" => Self::Subscription(SubStep::Confirm),
            "pay_processing" => Self::Payment(PayStep::Processing),
            "pay_success" => Self::Payment(PayStep::Success),
            "pay_failed" => Self::Payment(PayStep::Failed),
            "login_pin" => Self::LoginPin,
            "main_menu" => Self::MainMenu,
            _ => return None,
        };
        Some(state)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration data collected across the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationData {
    /// Member first name, title-cased.
    pub first_name: String,
    /// Member last name, title-cased.
    pub last_name: String,
    /// Gender as displayed ("Male"/"Female").
    pub gender: String,
    /// Subscriber number the session arrived on.
    pub phone_number: String,
    /// Province name.
    pub province: String,
    /// District name.
    pub district: String,
    /// Free-text address or township.
    pub address: String,
    /// NRC number, empty when skipped.
    pub nrc_number: String,
    /// Whether the member runs a business today.
    pub has_business: bool,
    /// Business name, if given.
    pub business_name: Option<String>,
    /// Business sector, lowercase.
    pub business_sector: Option<String>,
    /// Monthly revenue range, as displayed.
    pub monthly_revenue_range: Option<String>,
    /// Chosen PIN. Held in the session only until account creation.
    pub pin: String,
    /// Subscription plan ID.
    pub subscription_plan: String,
    /// Cooperative membership opt-in.
    pub cooperative_join: bool,
    /// `mobile_money` or `bank_transfer`.
    pub payment_method: String,
    /// Mobile money number to charge, international form.
    pub payment_number: String,
}

impl Default for RegistrationData {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            gender: String::new(),
            phone_number: String::new(),
            province: String::new(),
            district: String::new(),
            address: String::new(),
            nrc_number: String::new(),
            has_business: false,
            business_name: None,
            business_sector: None,
            monthly_revenue_range: None,
            pin: String::new(),
            subscription_plan: "basic".to_string(),
            cooperative_join: false,
            payment_method: String::new(),
            payment_number: String::new(),
        }
    }
}

/// Per-session scratch values that are not part of the registration record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scratch {
    /// Zero-based index of the chosen province, set while the district menu
    /// is open so district choices resolve against the right list.
    pub selected_province: Option<usize>,
    /// Base monthly price of the chosen plan.
    pub plan_price: Option<f64>,
    /// Total monthly fee including the cooperative portion.
    pub total_fee: Option<f64>,
    /// Directory ID of the member logging in.
    pub member_id: Option<String>,
    /// First name of the member logging in, for menu greetings.
    pub member_name: Option<String>,
    /// Payment reference for an in-session retry flow.
    pub payment_ref: Option<String>,
}

/// Retry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attempts {
    /// Failed login PIN entries this session.
    pub pin: u32,
}

/// One live USSD conversation.
#[derive(Debug, Clone)]
pub struct Session {
    /// Aggregator-assigned session identifier.
    pub session_id: String,
    /// Subscriber number the session arrived on.
    pub msisdn: String,
    /// Current state machine position.
    pub state: SessionState,
    /// Scratch values.
    pub scratch: Scratch,
    /// Registration data collected so far.
    pub registration: RegistrationData,
    /// Retry counters.
    pub attempts: Attempts,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last turn activity.
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session at the start state. The subscriber number is
    /// seeded into the registration data so payment setup can offer it.
    pub fn new(session_id: &str, msisdn: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            msisdn: msisdn.to_string(),
            state: SessionState::Start,
            scratch: Scratch::default(),
            registration: RegistrationData {
                phone_number: msisdn.to_string(),
                ..RegistrationData::default()
            },
            attempts: Attempts::default(),
            created_at: now,
            last_activity: now,
        }
    }

    /// Flatten into a durable store row.
    pub fn to_record(&self) -> Result<SessionRecord, EngineError> {
        Ok(SessionRecord {
            session_id: self.session_id.clone(),
            msisdn: self.msisdn.clone(),
            state: self.state.as_str().to_string(),
            scratch: serde_json::to_string(&self.scratch)?,
            registration: serde_json::to_string(&self.registration)?,
            attempts: serde_json::to_string(&self.attempts)?,
            created_at: self.created_at,
            last_activity: self.last_activity,
        })
    }

    /// Rebuild from a durable store row.
    pub fn from_record(record: SessionRecord) -> Result<Self, EngineError> {
        let state =
            SessionState::parse(&record.state).ok_or_else(|| EngineError::StorageError {
                operation: "load_session".to_string(),
                details: format!("unknown session state '{}'", record.state),
            })?;
        Ok(Self {
            session_id: record.session_id,
            msisdn: record.msisdn,
            state,
            scratch: serde_json::from_str(&record.scratch)?,
            registration: serde_json::from_str(&record.registration)?,
            attempts: serde_json::from_str(&record.attempts)?,
            created_at: record.created_at,
            last_activity: record.last_activity,
        })
    }
}

/// Set-if-present update to [`RegistrationData`].
#[derive(Debug, Clone, Default)]
pub struct RegistrationPatch {
    /// New first name.
    pub first_name: Option<String>,
    /// New last name.
    pub last_name: Option<String>,
    /// New gender.
    pub gender: Option<String>,
    /// New province.
    pub province: Option<String>,
    /// New district.
    pub district: Option<String>,
    /// New address.
    pub address: Option<String>,
    /// New NRC number.
    pub nrc_number: Option<String>,
    /// New has-business flag.
    pub has_business: Option<bool>,
    /// New business name.
    pub business_name: Option<String>,
    /// New business sector.
    pub business_sector: Option<String>,
    /// New revenue range.
    pub monthly_revenue_range: Option<String>,
    /// New PIN.
    pub pin: Option<String>,
    /// New subscription plan.
    pub subscription_plan: Option<String>,
    /// New cooperative opt-in.
    pub cooperative_join: Option<bool>,
    /// New payment method.
    pub payment_method: Option<String>,
    /// New payment number.
    pub payment_number: Option<String>,
}

impl RegistrationPatch {
    fn apply(self, reg: &mut RegistrationData) {
        if let Some(v) = self.first_name {
            reg.first_name = v;
        }
        if let Some(v) = self.last_name {
            reg.last_name = v;
        }
        if let Some(v) = self.gender {
            reg.gender = v;
        }
        if let Some(v) = self.province {
            reg.province = v;
        }
        if let Some(v) = self.district {
            reg.district = v;
        }
        if let Some(v) = self.address {
            reg.address = v;
        }
        if let Some(v) = self.nrc_number {
            reg.nrc_number = v;
        }
        if let Some(v) = self.has_business {
            reg.has_business = v;
        }
        if let Some(v) = self.business_name {
            reg.business_name = Some(v);
        }
        if let Some(v) = self.business_sector {
            reg.business_sector = Some(v);
        }
        if let Some(v) = self.monthly_revenue_range {
            reg.monthly_revenue_range = Some(v);
        }
        if let Some(v) = self.pin {
            reg.pin = v;
        }
        if let Some(v) = self.subscription_plan {
            reg.subscription_plan = v;
        }
        if let Some(v) = self.cooperative_join {
            reg.cooperative_join = v;
        }
        if let Some(v) = self.payment_method {
            reg.payment_method = v;
        }
        if let Some(v) = self.payment_number {
            reg.payment_number = v;
        }
    }
}

/// Set-if-present update to [`Scratch`].
#[derive(Debug, Clone, Default)]
pub struct ScratchPatch {
    /// New selected province index.
    pub selected_province: Option<usize>,
    /// New base plan price.
    pub plan_price: Option<f64>,
    /// New total fee.
    pub total_fee: Option<f64>,
    /// New member ID.
    pub member_id: Option<String>,
    /// New member first name.
    pub member_name: Option<String>,
    /// New payment reference.
    pub payment_ref: Option<String>,
}

impl ScratchPatch {
    fn apply(self, scratch: &mut Scratch) {
        if let Some(v) = self.selected_province {
            scratch.selected_province = Some(v);
        }
        if let Some(v) = self.plan_price {
            scratch.plan_price = Some(v);
        }
        if let Some(v) = self.total_fee {
            scratch.total_fee = Some(v);
        }
        if let Some(v) = self.member_id {
            scratch.member_id = Some(v);
        }
        if let Some(v) = self.member_name {
            scratch.member_name = Some(v);
        }
        if let Some(v) = self.payment_ref {
            scratch.payment_ref = Some(v);
        }
    }
}

/// One merged session update, applied atomically under the cache lock.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// New state machine position.
    pub state: Option<SessionState>,
    /// Scratch updates.
    pub scratch: Option<ScratchPatch>,
    /// Registration data updates.
    pub registration: Option<RegistrationPatch>,
    /// Replacement retry counters.
    pub attempts: Option<Attempts>,
}

impl SessionPatch {
    /// Patch that only moves the state machine.
    pub fn state(state: SessionState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Add scratch updates to this patch.
    pub fn with_scratch(mut self, scratch: ScratchPatch) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Add registration updates to this patch.
    pub fn with_registration(mut self, registration: RegistrationPatch) -> Self {
        self.registration = Some(registration);
        self
    }

    /// Replace the retry counters.
    pub fn with_attempts(mut self, attempts: Attempts) -> Self {
        self.attempts = Some(attempts);
        self
    }

    fn apply(self, session: &mut Session) {
        if let Some(state) = self.state {
            debug!(
                session_id = %session.session_id,
                from = %session.state,
                to = %state,
                "session state transition"
            );
            session.state = state;
        }
        if let Some(scratch) = self.scratch {
            scratch.apply(&mut session.scratch);
        }
        if let Some(registration) = self.registration {
            registration.apply(&mut session.registration);
        }
        if let Some(attempts) = self.attempts {
            session.attempts = attempts;
        }
    }
}

/// Dual-tier session manager: in-memory cache plus durable write-through.
///
/// The durable tier is authoritative for reads so a process restart resumes
/// conversations; the cache keeps the engine serving turns when the durable
/// tier is briefly unavailable. Sessions idle longer than the timeout are
/// treated as absent in both tiers.
pub struct SessionManager {
    cache: Mutex<HashMap<String, Session>>,
    store: Arc<dyn SessionStore>,
    timeout: Duration,
}

impl SessionManager {
    /// Create a manager over the given durable store with an idle timeout
    /// in seconds.
    pub fn new(store: Arc<dyn SessionStore>, timeout_secs: u64) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            store,
            timeout: Duration::seconds(timeout_secs as i64),
        }
    }

    /// Create a session, replacing any existing one with the same ID.
    ///
    /// Aggregators occasionally reuse a live session ID for a new dial-in;
    /// the old conversation is abandoned and restarted rather than resumed.
    pub async fn create(&self, session_id: &str, msisdn: &str) -> Session {
        let session = Session::new(session_id, msisdn);

        {
            let mut cache = self.cache.lock().await;
            cache.insert(session_id.to_string(), session.clone());
        }
        info!(session_id, msisdn, "created session");

        self.write_through(&session).await;
        session
    }

    /// Fetch a live session, bumping its activity timestamp in both tiers.
    ///
    /// Reads the durable tier first; on storage failure or a miss, falls
    /// back to the cache. Expired sessions are evicted and reported absent.
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let now = Utc::now();
        let cutoff = now - self.timeout;

        match self.store.load_session(session_id, cutoff).await {
            Ok(Some(record)) => match Session::from_record(record) {
                Ok(mut session) => {
                    session.last_activity = now;
                    {
                        let mut cache = self.cache.lock().await;
                        cache.insert(session_id.to_string(), session.clone());
                    }
                    self.write_through(&session).await;
                    debug!(session_id, state = %session.state, "loaded session from durable store");
                    return Some(session);
                }
                Err(e) => {
                    warn!(session_id, error = %e, "discarding undecodable session row");
                    let _ = self.store.delete_session(session_id).await;
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(session_id, error = %e, "durable session read failed, trying cache");
            }
        }

        let mut cache = self.cache.lock().await;
        if let Some(session) = cache.get_mut(session_id) {
            if now - session.last_activity <= self.timeout {
                session.last_activity = now;
                let snapshot = session.clone();
                drop(cache);
                self.write_through(&snapshot).await;
                return Some(snapshot);
            }
            debug!(session_id, "session expired, evicting from cache");
            cache.remove(session_id);
        }

        None
    }

    /// Apply a patch to a session and persist the result.
    ///
    /// Updating a session that no longer exists in either tier is a logged
    /// no-op; the next turn will see the session as absent and restart.
    pub async fn update(&self, session_id: &str, patch: SessionPatch) {
        let now = Utc::now();
        let cutoff = now - self.timeout;
        let mut cache = self.cache.lock().await;

        if !cache.contains_key(session_id) {
            match self.store.load_session(session_id, cutoff).await {
                Ok(Some(record)) => match Session::from_record(record) {
                    Ok(session) => {
                        cache.insert(session_id.to_string(), session);
                    }
                    Err(e) => {
                        warn!(session_id, error = %e, "discarding undecodable session row");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    warn!(session_id, error = %e, "durable session read failed during update");
                }
            }
        }

        let Some(session) = cache.get_mut(session_id) else {
            warn!(session_id, "cannot update session: not found");
            return;
        };

        patch.apply(session);
        session.last_activity = now;
        let snapshot = session.clone();
        drop(cache);

        self.write_through(&snapshot).await;
    }

    /// Remove a session from both tiers. Clearing an absent session is a
    /// no-op; durable delete failures are logged and swallowed.
    pub async fn clear(&self, session_id: &str) {
        {
            let mut cache = self.cache.lock().await;
            cache.remove(session_id);
        }
        info!(session_id, "cleared session");

        if let Err(e) = self.store.delete_session(session_id).await {
            warn!(session_id, error = %e, "durable session delete failed");
        }
    }

    async fn write_through(&self, session: &Session) {
        let record = match session.to_record() {
            Ok(record) => record,
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "session encode failed");
                return;
            }
        };
        if let Err(e) = self.store.upsert_session(&record).await {
            warn!(
                session_id = %session.session_id,
                error = %e,
                "durable session write failed, continuing on cache"
            );
        }
    }
}
