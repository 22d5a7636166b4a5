//! Identifiers, outcomes, and status values shared by the registry and its callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Caller-derived identity of a unit of work, used only as a dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a caller-computed fingerprint.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Opaque identifier handed back at admission and used for status polling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh identifier. Random v4 UUIDs are never reused in practice.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an identifier received from a caller.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Outcome {
    /// Work returned a payload.
    Success(Value),
    /// Work raised an error; holds its description.
    Failure(String),
}

impl Outcome {
    /// Whether the work completed normally.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Registry view of a correlation id.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Admitted and still running (or waiting for a worker).
    Pending,
    /// Finished; the outcome is cached until evicted.
    Done(Outcome),
    /// Never admitted, or evicted from both the dedup index and the outcome cache.
    NotFound,
}

/// Result of asking the registry to admit a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// No job was in flight for the fingerprint; a new id was registered and work must start.
    Created(CorrelationId),
    /// A job with the same fingerprint is already known; reuse its id and start nothing.
    Accepted(CorrelationId),
}

impl Admission {
    /// Correlation id the caller should hand back.
    pub fn id(&self) -> &CorrelationId {
        match self {
            Self::Created(id) | Self::Accepted(id) => id,
        }
    }

    /// Whether this admission started a new job.
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minted_ids_are_unique() {
        let first = CorrelationId::mint();
        let second = CorrelationId::mint();
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 36);
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let success = serde_json::to_value(Outcome::Success(json!("42 chunks"))).unwrap();
        assert_eq!(success, json!({ "kind": "success", "value": "42 chunks" }));

        let failure = serde_json::to_value(Outcome::Failure("boom".into())).unwrap();
        assert_eq!(failure, json!({ "kind": "failure", "value": "boom" }));
    }

    #[test]
    fn correlation_id_serializes_as_plain_string() {
        let id = CorrelationId::new("u1");
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("u1"));
    }

    #[test]
    fn admission_exposes_id_for_both_variants() {
        let id = CorrelationId::new("u1");
        assert_eq!(Admission::Created(id.clone()).id(), &id);
        assert!(!Admission::Accepted(id).is_new());
    }
}
