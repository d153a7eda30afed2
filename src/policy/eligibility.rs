use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Competition, CompetitionChanges, NewRegistration, Registration, RegistrationStatus,
};

/// Why a registration-side action is not allowed at this point in time or state.
/// Independent of who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("Registration for this competition is closed")]
    RegistrationClosed,
    #[error("Student is already registered for this competition")]
    DuplicateRegistration,
    #[error("Cannot cancel registration after competition has started")]
    CompetitionAlreadyStarted,
    #[error("Last registration date must be before start date")]
    InvalidDates,
    #[error("Cannot change registration status from {from} to {to}")]
    InvalidTransition {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },
}

/// Registration is open up to and including `last_registration_date`.
pub fn check_registration_window(
    competition: &Competition,
    now: DateTime<Utc>,
) -> Result<(), Ineligible> {
    if now > competition.last_registration_date {
        return Err(Ineligible::RegistrationClosed);
    }
    Ok(())
}

/// Any existing row for the pair blocks a new one, whatever its status.
pub fn check_not_registered(existing: Option<&Registration>) -> Result<(), Ineligible> {
    match existing {
        Some(_) => Err(Ineligible::DuplicateRegistration),
        None => Ok(()),
    }
}

/// Registrations created through the API skip `Pending` and start confirmed.
pub fn confirmed_registration(
    student_id: i32,
    competition_id: i32,
    now: DateTime<Utc>,
) -> NewRegistration {
    NewRegistration {
        student_id,
        competition_id,
        registration_date: now,
        status: RegistrationStatus::Confirmed,
    }
}

/// Cancellation is allowed until the competition starts. A rejected
/// registration stays rejected; cancelling an already cancelled one is a
/// no-op. A registration whose competition no longer resolves has nothing to
/// compare against and may be cancelled.
pub fn check_cancellation(
    current: RegistrationStatus,
    competition: Option<&Competition>,
    now: DateTime<Utc>,
) -> Result<(), Ineligible> {
    if current == RegistrationStatus::Rejected {
        return Err(Ineligible::InvalidTransition {
            from: current,
            to: RegistrationStatus::Cancelled,
        });
    }
    match competition {
        Some(competition) if now > competition.start_date => {
            Err(Ineligible::CompetitionAlreadyStarted)
        }
        _ => Ok(()),
    }
}

pub fn check_status_transition(
    from: RegistrationStatus,
    to: RegistrationStatus,
) -> Result<(), Ineligible> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Ineligible::InvalidTransition { from, to })
    }
}

pub fn validate_competition_dates(
    start_date: DateTime<Utc>,
    last_registration_date: DateTime<Utc>,
) -> Result<(), Ineligible> {
    if last_registration_date > start_date {
        return Err(Ineligible::InvalidDates);
    }
    Ok(())
}

/// Re-validates the date ordering after a partial update: each side is taken
/// from the change set when supplied, otherwise from the persisted row.
pub fn validate_competition_update(
    existing: &Competition,
    changes: &CompetitionChanges,
) -> Result<(), Ineligible> {
    let start_date = changes.start_date.unwrap_or(existing.start_date);
    let last_registration_date = changes
        .last_registration_date
        .unwrap_or(existing.last_registration_date);
    validate_competition_dates(start_date, last_registration_date)
}
