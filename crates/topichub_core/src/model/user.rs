//! User domain model.
//!
//! # Responsibility
//! - Define the user record referenced by topic rosters and notifications.
//! - Validate email syntax at construction time.
//!
//! # Invariants
//! - `email` is unique in the store and non-empty.
//! - Role-specific attributes are optional fields gated by the role tag,
//!   not subtypes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a user.
pub type UserId = Uuid;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap_or_else(|err| {
        // A broken literal pattern is a programming error, not runtime input.
        panic!("email pattern failed to compile: {err}")
    })
});

/// Directory-level role tag for a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Administrator,
    Supervisor,
    Student,
}

impl UserRole {
    /// Stable string tag used in the store.
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Supervisor => "supervisor",
            Self::Student => "student",
        }
    }

    pub fn parse_tag(value: &str) -> Option<Self> {
        match value {
            "administrator" => Some(Self::Administrator),
            "supervisor" => Some(Self::Supervisor),
            "student" => Some(Self::Student),
            _ => None,
        }
    }
}

/// Validation error for user construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    InvalidEmail(String),
}

impl Display for UserValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEmail(email) => write!(f, "invalid email address `{email}`"),
        }
    }
}

impl Error for UserValidationError {}

/// Canonical user record.
///
/// Read-mostly from the topic core's perspective; ownership belongs to the
/// user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    /// Meaningful only when `role == UserRole::Student`.
    pub matriculation_number: Option<String>,
    /// Stored picture reference. `None` means the default picture.
    pub profile_picture: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    /// Creates a new user record with a generated stable ID.
    ///
    /// # Errors
    /// - `InvalidEmail` when `email` fails syntax validation.
    pub fn new(
        email: impl Into<String>,
        role: UserRole,
        now_ms: i64,
    ) -> Result<Self, UserValidationError> {
        let email = email.into();
        if !is_valid_email(&email) {
            return Err(UserValidationError::InvalidEmail(email));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            email,
            first_name: String::new(),
            last_name: String::new(),
            role,
            matriculation_number: None,
            profile_picture: None,
            created_at: now_ms,
            updated_at: now_ms,
        })
    }

    /// Display name assembled from name parts, falling back to the email.
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let trimmed = name.trim();
        if trimmed.is_empty() {
            self.email.clone()
        } else {
            trimmed.to_string()
        }
    }

    /// Matriculation number, present only for student accounts.
    pub fn matriculation(&self) -> Option<&str> {
        match self.role {
            UserRole::Student => self.matriculation_number.as_deref(),
            _ => None,
        }
    }

    pub fn is_administrator(&self) -> bool {
        self.role == UserRole::Administrator
    }
}

/// Returns whether `email` is syntactically acceptable.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}
