//! crates/training_portal_core/src/passcode.rs
//!
//! Issuance and validation of the short numeric codes trainees log in with.
//!
//! Codes are low-stakes onboarding credentials, not an authentication record:
//! they are drawn from a small uniform range with a non-cryptographic PRNG and
//! collisions between trainees are tolerated because validation always matches
//! on email and code together. A trainee may hold several active codes at once
//! so a coordinator can re-issue without locking anyone out.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::domain::{normalize_email, PasscodeEntry};

/// Longest validity a code may be issued with, in days.
pub const MAX_VALID_DAYS: i64 = 3650;

static NUMERIC_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("numeric code pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasscodeError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Passcode {0} has already been used")]
    AlreadyUsed(Uuid),
}

/// Why a submitted code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    #[error("passcode has expired")]
    Expired,
    #[error("passcode not found")]
    NotFound,
    #[error("passcode has already been used")]
    AlreadyUsed,
}

/// Observed state of an entry. `Expired` is derived from the clock, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PasscodeStatus {
    Active,
    Used,
    Expired,
}

pub fn status(entry: &PasscodeEntry, now: DateTime<Utc>) -> PasscodeStatus {
    if entry.is_used {
        PasscodeStatus::Used
    } else if now >= entry.expires_at {
        PasscodeStatus::Expired
    } else {
        PasscodeStatus::Active
    }
}

pub fn is_numeric_code(code: &str) -> bool {
    NUMERIC_CODE.is_match(code)
}

//=========================================================================================
// Issuance
//=========================================================================================

/// Range and lifetime settings for generated codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasscodePolicy {
    min_code: u32,
    max_code: u32,
    default_valid_days: i64,
}

impl PasscodePolicy {
    pub fn new(min_code: u32, max_code: u32, default_valid_days: i64) -> Result<Self, PasscodeError> {
        if min_code > max_code {
            return Err(PasscodeError::Validation(format!(
                "code range {}..={} is empty",
                min_code, max_code
            )));
        }
        if !(1..=MAX_VALID_DAYS).contains(&default_valid_days) {
            return Err(PasscodeError::Validation(format!(
                "default validity must be between 1 and {} days",
                MAX_VALID_DAYS
            )));
        }
        Ok(Self {
            min_code,
            max_code,
            default_valid_days,
        })
    }

    pub fn default_valid_days(&self) -> i64 {
        self.default_valid_days
    }
}

impl Default for PasscodePolicy {
    /// Four digit codes valid for a week.
    fn default() -> Self {
        Self {
            min_code: 1000,
            max_code: 9999,
            default_valid_days: 7,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PasscodeIssuer {
    policy: PasscodePolicy,
}

impl PasscodeIssuer {
    pub fn new(policy: PasscodePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PasscodePolicy {
        &self.policy
    }

    /// Draws a code uniformly from the configured range.
    pub fn generate_code(&self) -> String {
        rand::thread_rng()
            .gen_range(self.policy.min_code..=self.policy.max_code)
            .to_string()
    }

    /// Creates a new entry. Nothing is stored here; the caller appends it to the registry.
    pub fn issue(
        &self,
        trainee_email: &str,
        explicit_code: Option<&str>,
        valid_days: Option<i64>,
        issued_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PasscodeEntry, PasscodeError> {
        let trainee_email = trainee_email.trim();
        if trainee_email.is_empty() {
            return Err(PasscodeError::Validation(
                "trainee email is required".to_string(),
            ));
        }

        let code = match explicit_code.map(str::trim) {
            Some(code) if is_numeric_code(code) => code.to_string(),
            Some(code) => {
                return Err(PasscodeError::Validation(format!(
                    "passcode '{}' must contain digits only",
                    code
                )))
            }
            None => self.generate_code(),
        };

        let valid_days = valid_days.unwrap_or(self.policy.default_valid_days);
        if !(1..=MAX_VALID_DAYS).contains(&valid_days) {
            return Err(PasscodeError::Validation(format!(
                "validity of {} days must be between 1 and {}",
                valid_days, MAX_VALID_DAYS
            )));
        }

        let expires_at = Duration::try_days(valid_days)
            .and_then(|validity| now.checked_add_signed(validity))
            .ok_or_else(|| {
                PasscodeError::Validation(format!("validity of {} days is out of range", valid_days))
            })?;

        Ok(PasscodeEntry {
            id: Uuid::new_v4(),
            code,
            trainee_email: trainee_email.to_string(),
            is_used: false,
            created_at: now,
            expires_at,
            used_at: None,
            issued_by: issued_by.map(str::to_string),
        })
    }
}

//=========================================================================================
// Validation
//=========================================================================================

/// Finds the entry a trainee may log in with.
///
/// Among entries matching email and code, the most recently created live one wins.
/// If none is live, the most recent match decides the reason.
pub fn validate<'a>(
    registry: &'a [PasscodeEntry],
    trainee_email: &str,
    submitted_code: &str,
    now: DateTime<Utc>,
) -> Result<&'a PasscodeEntry, RejectReason> {
    let email = normalize_email(trainee_email);
    let code = submitted_code.trim();

    let matches: Vec<&PasscodeEntry> = registry
        .iter()
        .filter(|e| e.code == code && normalize_email(&e.trainee_email) == email)
        .collect();

    if let Some(live) = matches
        .iter()
        .copied()
        .filter(|e| status(e, now) == PasscodeStatus::Active)
        .max_by_key(|e| e.created_at)
    {
        return Ok(live);
    }

    match matches.into_iter().max_by_key(|e| e.created_at) {
        None => Err(RejectReason::NotFound),
        Some(latest) if latest.is_used => Err(RejectReason::AlreadyUsed),
        Some(_) => Err(RejectReason::Expired),
    }
}

/// Returns the used copy of `entry`. A second call on a used entry is an error.
pub fn mark_used(entry: &PasscodeEntry, now: DateTime<Utc>) -> Result<PasscodeEntry, PasscodeError> {
    if entry.is_used {
        return Err(PasscodeError::AlreadyUsed(entry.id));
    }
    Ok(PasscodeEntry {
        is_used: true,
        used_at: Some(now),
        ..entry.clone()
    })
}
