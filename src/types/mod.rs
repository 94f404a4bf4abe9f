pub mod error;
pub mod utils;

pub use error::{
    BackoffHint, Classifier, Failure, FailureKind, LoomError, Result, ResultExt,
};
pub use utils::{
    capitalize_first, json_array, json_bool, json_f64, json_i64, json_object, json_string,
    json_string_array, json_string_or, truncate_chars,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Domain Newtypes
// =============================================================================

use std::fmt;

/// Type-safe wrapper for user IDs
///
/// Prevents accidental mixing of user IDs with other string types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Domain Records
// =============================================================================

/// A user profile plus its completion state, as synchronized between the
/// local cache and the remote store. The payload is deliberately opaque:
/// the app evolves its profile fields without schema migrations here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Opaque profile/completion payload
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Last modification time; drives last-writer-wins conflict handling
    pub updated_at: DateTime<Utc>,
}

impl ProfileRecord {
    /// Create a record stamped with the current time
    pub fn new(payload: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            payload,
            updated_at: Utc::now(),
        }
    }

    /// Create a record with an explicit modification time
    pub fn with_updated_at(
        payload: serde_json::Map<String, serde_json::Value>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            payload,
            updated_at,
        }
    }

    /// Re-stamp the record after a local modification
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// True when this record was modified after `other`
    pub fn is_newer_than(&self, other: &ProfileRecord) -> bool {
        self.updated_at > other.updated_at
    }

    /// The profile payload as a JSON value, for accessor-style reads
    pub fn as_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.payload.clone())
    }
}

/// A generated weekly plan. The payload shape belongs to the prompt contract;
/// consumers read it through the safe accessors in [`utils`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl PlanDocument {
    /// Wrap a validated payload in a fresh document
    pub fn new(payload: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            payload,
        }
    }

    /// The plan payload as a JSON value, for accessor-style reads
    pub fn as_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.payload.clone())
    }
}
