// Copyright (C) 2025 Bwenzi Ltd
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registration flow: terms through PIN confirmation.

use crate::engine::{TurnReply, UssdEngine};
use crate::error::EngineError;
use crate::geography;
use crate::session::{
    BizStep, RegStep, RegistrationPatch, ScratchPatch, Session, SessionPatch, SessionState,
};
use crate::validate;

use super::title_case;

/// Terms and conditions prompt shown at the start of registration.
pub(crate) fn terms_prompt() -> String {
    // Kept compact so it fits in one page with the invalid-choice prefix
    "Welcome to Bwenzi!\nT&Cs: 18+ only\nFrom K2.00/month\nSecure platform\n1. Accept\n2. Decline"
        .to_string()
}

/// Route one turn within the registration namespace.
pub(crate) async fn handle(
    engine: &UssdEngine,
    session: &Session,
    step: RegStep,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match step {
        RegStep::Terms => handle_terms(engine, session, input).await,
        RegStep::FirstName => handle_first_name(engine, session, input).await,
        RegStep::LastName => handle_last_name(engine, session, input).await,
        RegStep::Gender => handle_gender(engine, session, input).await,
        RegStep::Province => handle_province(engine, session, input).await,
        RegStep::District => handle_district(engine, session, input).await,
        RegStep::Address => handle_address(engine, session, input).await,
        RegStep::BusinessSector => handle_business_sector(engine, session, input).await,
        RegStep::Nrc => handle_nrc(engine, session, input).await,
        RegStep::Pin => handle_pin(engine, session, input).await,
        RegStep::PinConfirm => handle_pin_confirm(engine, session, input).await,
    }
}

async fn handle_terms(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    match input {
        "1" => {
            engine
                .sessions
                .update(
                    &session.session_id,
                    SessionPatch::state(SessionState::Registration(RegStep::FirstName)),
                )
                .await;
            Ok(TurnReply::prompt("First name:"))
        }
        "2" => {
            engine.sessions.clear(&session.session_id).await;
            Ok(TurnReply::end("Registration cancelled.\nThank you!"))
        }
        _ => Ok(TurnReply::prompt(format!(
            "Invalid choice.\n{}",
            terms_prompt()
        ))),
    }
}

async fn handle_first_name(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let name = input.trim();

    if name.is_empty() {
        return Ok(TurnReply::prompt("Enter your first name:"));
    }
    if !validate::validate_name(name) {
        return Ok(TurnReply::prompt("Letters only please.\nFirst name:"));
    }

    let name = title_case(name);
    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Registration(RegStep::LastName))
                .with_registration(RegistrationPatch {
                    first_name: Some(name.clone()),
                    ..RegistrationPatch::default()
                }),
        )
        .await;

    Ok(TurnReply::prompt(format!("Hi {}!\nLast name:", name)))
}

async fn handle_last_name(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let name = input.trim();

    if name.is_empty() {
        return Ok(TurnReply::prompt("Enter your last name:"));
    }
    if !validate::validate_name(name) {
        return Ok(TurnReply::prompt("Letters only please.\nLast name:"));
    }

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Registration(RegStep::Gender)).with_registration(
                RegistrationPatch {
                    last_name: Some(title_case(name)),
                    ..RegistrationPatch::default()
                },
            ),
        )
        .await;

    Ok(TurnReply::prompt("Gender:\n1. Male\n2. Female"))
}

async fn handle_gender(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let gender = match input {
        "1" => "Male",
        "2" => "Female",
        _ => {
            return Ok(TurnReply::prompt(
                "Invalid selection.\nGender:\n1. Male\n2. Female",
            ));
        }
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Registration(RegStep::Province))
                .with_registration(RegistrationPatch {
                    gender: Some(gender.to_string()),
                    ..RegistrationPatch::default()
                }),
        )
        .await;

    Ok(TurnReply::prompt(geography::province_menu()))
}

async fn handle_province(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let Some((index, province)) = geography::province_by_choice(input) else {
        return Ok(TurnReply::prompt(geography::province_menu()));
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Registration(RegStep::District))
                .with_registration(RegistrationPatch {
                    province: Some(province.name.to_string()),
                    ..RegistrationPatch::default()
                })
                .with_scratch(ScratchPatch {
                    selected_province: Some(index),
                    ..ScratchPatch::default()
                }),
        )
        .await;

    Ok(TurnReply::prompt(geography::district_menu(province)))
}

async fn handle_district(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    // The district list only makes sense relative to the recorded province;
    // if that scratch value is gone, fall back to province selection.
    let province = session
        .scratch
        .selected_province
        .and_then(|i| geography::PROVINCES.get(i));
    let Some(province) = province else {
        engine
            .sessions
            .update(
                &session.session_id,
                SessionPatch::state(SessionState::Registration(RegStep::Province)),
            )
            .await;
        return Ok(TurnReply::prompt(geography::province_menu()));
    };

    let district = input
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|&n| n >= 1 && n <= province.districts.len())
        .map(|n| province.districts[n - 1]);

    let Some(district) = district else {
        return Ok(TurnReply::prompt(geography::district_menu(province)));
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Registration(RegStep::Address))
                .with_registration(RegistrationPatch {
                    district: Some(district.to_string()),
                    ..RegistrationPatch::default()
                }),
        )
        .await;

    Ok(TurnReply::prompt(format!(
        "Step 6/6\nDistrict: {}\nAddress/Township:",
        district
    )))
}

async fn handle_address(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let address = input.trim();

    if address.chars().count() < 3 {
        return Ok(TurnReply::prompt("Address too short.\nAddress/Township:"));
    }

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Registration(RegStep::BusinessSector))
                .with_registration(RegistrationPatch {
                    address: Some(address.to_string()),
                    ..RegistrationPatch::default()
                }),
        )
        .await;

    Ok(TurnReply::prompt(
        "Business Sector:\n1. Agriculture\n2. Transport\n3. Retail\n4. Services\n5. Other",
    ))
}

async fn handle_business_sector(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let sector = match input {
        "1" => "agriculture",
        "2" => "transport",
        "3" => "retail",
        "4" => "services",
        "5" => "other",
        _ => {
            return Ok(TurnReply::prompt(
                "Invalid choice.\n1. Agriculture\n2. Transport\n3. Retail\n4. Services\n5. Other",
            ));
        }
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Registration(RegStep::Nrc)).with_registration(
                RegistrationPatch {
                    business_sector: Some(sector.to_string()),
                    ..RegistrationPatch::default()
                },
            ),
        )
        .await;

    Ok(TurnReply::prompt(
        "NRC Number:\n(Format: 123456/12/1)\n(or 0 to skip)",
    ))
}

async fn handle_nrc(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let nrc = input.trim().to_uppercase();

    if nrc != "0" && !validate::validate_nrc(&nrc) {
        return Ok(TurnReply::prompt("Format: 123456/12/1\nNRC (0=skip):"));
    }

    let registration = if nrc == "0" {
        RegistrationPatch::default()
    } else {
        RegistrationPatch {
            nrc_number: Some(nrc),
            ..RegistrationPatch::default()
        }
    };

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Registration(RegStep::Pin))
                .with_registration(registration),
        )
        .await;

    Ok(TurnReply::prompt("Create 4-digit PIN:"))
}

async fn handle_pin(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    let pin = input.trim();

    if !validate::validate_pin(pin) {
        return Ok(TurnReply::prompt("4 digits only.\nCreate PIN:"));
    }

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Registration(RegStep::PinConfirm))
                .with_registration(RegistrationPatch {
                    pin: Some(pin.to_string()),
                    ..RegistrationPatch::default()
                }),
        )
        .await;

    Ok(TurnReply::prompt("Confirm PIN:"))
}

async fn handle_pin_confirm(
    engine: &UssdEngine,
    session: &Session,
    input: &str,
) -> Result<TurnReply, EngineError> {
    if input.trim() != session.registration.pin {
        // Discard the staged PIN and start over at creation
        engine
            .sessions
            .update(
                &session.session_id,
                SessionPatch::state(SessionState::Registration(RegStep::Pin)).with_registration(
                    RegistrationPatch {
                        pin: Some(String::new()),
                        ..RegistrationPatch::default()
                    },
                ),
            )
            .await;
        return Ok(TurnReply::prompt("PINs don't match.\nCreate 4-digit PIN:"));
    }

    engine
        .sessions
        .update(
            &session.session_id,
            SessionPatch::state(SessionState::Business(BizStep::HasBusiness)),
        )
        .await;

    Ok(TurnReply::prompt(
        "PIN set!\nDo you have a business?\n1. Yes\n2. Planning\n3. No",
    ))
}
