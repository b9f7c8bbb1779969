//! Types shared between the TiDB custom resources

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Phase of a member group (TiDB, TiKV, ...)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum MemberPhase {
    /// Members are running the desired spec
    #[default]
    Normal,
    /// A rolling upgrade is in progress
    Upgrade,
    /// Replicas are being added or removed
    Scale,
}

impl std::fmt::Display for MemberPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Upgrade => write!(f, "Upgrade"),
            Self::Scale => write!(f, "Scale"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready, Synced)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_phase_display_matches_serialized_form() {
        for phase in [MemberPhase::Normal, MemberPhase::Upgrade, MemberPhase::Scale] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase));
        }
    }

    #[test]
    fn test_condition_serializes_kubernetes_field_names() {
        let cond = Condition::new("Synced", ConditionStatus::True, "StoresUp", "all stores up");
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "Synced");
        assert_eq!(json["status"], "True");
        assert!(json.get("lastTransitionTime").is_some());
    }
}
