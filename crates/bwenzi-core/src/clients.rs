// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Upstream collaborators: member directory, payment gateway, SMS notifier.
//!
//! The engine talks to each collaborator through a trait so flows can be
//! tested against in-process fakes. The production implementations are
//! thin JSON-over-HTTP clients.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::EngineError;
use crate::session::RegistrationData;
use crate::validate;

/// An existing member as returned by the directory.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberRecord {
    /// Directory-assigned member ID.
    pub id: String,
    /// Member first name.
    pub first_name: String,
    /// Member last name.
    pub last_name: String,
    /// Phone number on record, international form.
    pub phone_number: String,
}

/// Business profile attached to a new member.
#[derive(Debug, Clone, Serialize)]
pub struct NewBusinessProfile {
    /// Business name, if given.
    pub business_name: Option<String>,
    /// Business sector.
    pub business_sector: String,
    /// Monthly revenue range.
    pub monthly_revenue_range: Option<String>,
}

/// Payload for creating a member account in the directory.
#[derive(Debug, Clone, Serialize)]
pub struct NewMember {
    /// Phone number, `+260` form.
    pub phone_number: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Gender.
    pub gender: String,
    /// Province.
    pub province: String,
    /// District.
    pub district: String,
    /// Address or township.
    pub address: String,
    /// NRC number, if given.
    pub national_id: Option<String>,
    /// Salted SHA-256 digest of the chosen PIN.
    pub pin_digest: String,
    /// Subscription plan ID.
    pub subscription_plan: String,
    /// Cooperative membership opt-in.
    pub cooperative_member: bool,
    /// `mobile_money` or `bank_transfer`.
    pub payment_method: String,
    /// Business profile, when the member runs a business.
    pub business: Option<NewBusinessProfile>,
}

impl NewMember {
    /// Build a directory payload from collected registration data.
    pub fn from_registration(reg: &RegistrationData) -> Self {
        let business = if reg.has_business {
            reg.business_sector
                .clone()
                .map(|business_sector| NewBusinessProfile {
                    business_name: reg.business_name.clone(),
                    business_sector,
                    monthly_revenue_range: reg.monthly_revenue_range.clone(),
                })
        } else {
            None
        };

        let phone_number = validate::format_phone_international(&reg.phone_number);
        Self {
            pin_digest: digest_pin(&reg.pin, &phone_number),
            phone_number,
            first_name: reg.first_name.clone(),
            last_name: reg.last_name.clone(),
            gender: reg.gender.clone(),
            province: reg.province.clone(),
            district: reg.district.clone(),
            address: reg.address.clone(),
            national_id: (!reg.nrc_number.is_empty()).then(|| reg.nrc_number.clone()),
            subscription_plan: reg.subscription_plan.clone(),
            cooperative_member: reg.cooperative_join,
            payment_method: reg.payment_method.clone(),
            business,
        }
    }
}

/// Salted SHA-256 PIN digest. The phone number serves as the salt so equal
/// PINs do not produce equal digests across members.
pub fn digest_pin(pin: &str, phone_number: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(phone_number.as_bytes());
    hasher.update(b":");
    hasher.update(pin.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Member directory: account lookup, PIN verification, account creation.
#[async_trait::async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Look up a member by phone number. Tried with each supported number
    /// form by the caller.
    async fn find_by_phone(&self, phone: &str) -> Result<Option<MemberRecord>, EngineError>;

    /// Verify a login PIN against the member's stored credential.
    async fn verify_pin(&self, member_id: &str, pin: &str) -> Result<bool, EngineError>;

    /// Create a member account. Returns the created record; creating an
    /// account for an existing number returns the existing record.
    async fn create_member(&self, member: &NewMember) -> Result<MemberRecord, EngineError>;
}

/// Mobile-money payment gateway.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiate a collection against a subscriber number. The gateway runs
    /// its own confirmation prompt on the handset; `Ok(true)` means the
    /// collection was accepted for processing, not that money moved.
    async fn collect(&self, phone: &str, amount: f64, reference: &str)
    -> Result<bool, EngineError>;
}

/// Outbound SMS notifications.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message to a subscriber number.
    async fn send(&self, phone: &str, message: &str) -> Result<(), EngineError>;
}

/// HTTP member directory client.
pub struct HttpMemberDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMemberDirectory {
    /// Create a client against the directory base URL.
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyPinResponse {
    valid: bool,
}

#[async_trait::async_trait]
impl MemberDirectory for HttpMemberDirectory {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<MemberRecord>, EngineError> {
        let response = self
            .client
            .get(format!("{}/members", self.base_url))
            .query(&[("phone", phone)])
            .send()
            .await
            .map_err(|e| EngineError::DirectoryError {
                details: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = response
            .error_for_status()
            .map_err(|e| EngineError::DirectoryError {
                details: e.to_string(),
            })?;

        let member: MemberRecord =
            response
                .json()
                .await
                .map_err(|e| EngineError::DirectoryError {
                    details: e.to_string(),
                })?;
        debug!(phone, member_id = %member.id, "directory member found");
        Ok(Some(member))
    }

    async fn verify_pin(&self, member_id: &str, pin: &str) -> Result<bool, EngineError> {
        let response = self
            .client
            .post(format!("{}/members/{}/verify-pin", self.base_url, member_id))
            .json(&serde_json::json!({ "pin": pin }))
            .send()
            .await
            .map_err(|e| EngineError::DirectoryError {
                details: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| EngineError::DirectoryError {
                details: e.to_string(),
            })?;

        let body: VerifyPinResponse =
            response
                .json()
                .await
                .map_err(|e| EngineError::DirectoryError {
                    details: e.to_string(),
                })?;
        Ok(body.valid)
    }

    async fn create_member(&self, member: &NewMember) -> Result<MemberRecord, EngineError> {
        let response = self
            .client
            .post(format!("{}/members", self.base_url))
            .json(member)
            .send()
            .await
            .map_err(|e| EngineError::DirectoryError {
                details: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| EngineError::DirectoryError {
                details: e.to_string(),
            })?;

        response
            .json()
            .await
            .map_err(|e| EngineError::DirectoryError {
                details: e.to_string(),
            })
    }
}

/// HTTP payment gateway client.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpPaymentGateway {
    /// Create a client against the gateway base URL with a per-request
    /// timeout. A hung gateway must not hold the turn open indefinitely.
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct CollectRequest<'a> {
    customer_phone: &'a str,
    amount: f64,
    payment_reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct CollectResponse {
    success: bool,
}

#[async_trait::async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn collect(
        &self,
        phone: &str,
        amount: f64,
        reference: &str,
    ) -> Result<bool, EngineError> {
        let response = self
            .client
            .post(format!("{}/payments/collect", self.base_url))
            .timeout(self.timeout)
            .json(&CollectRequest {
                customer_phone: phone,
                amount,
                payment_reference: reference,
            })
            .send()
            .await
            .map_err(|e| EngineError::GatewayError {
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| EngineError::GatewayError {
                reason: e.to_string(),
            })?;

        let body: CollectResponse =
            response
                .json()
                .await
                .map_err(|e| EngineError::GatewayError {
                    reason: e.to_string(),
                })?;
        debug!(reference, success = body.success, "gateway collection response");
        Ok(body.success)
    }
}

/// HTTP SMS notifier client.
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotifier {
    /// Create a client against the notification service base URL.
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, phone: &str, message: &str) -> Result<(), EngineError> {
        self.client
            .post(format!("{}/sms", self.base_url))
            .json(&serde_json::json!({ "to": phone, "message": message }))
            .send()
            .await
            .map_err(|e| EngineError::NotifyError {
                details: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| EngineError::NotifyError {
                details: e.to_string(),
            })?;
        Ok(())
    }
}
