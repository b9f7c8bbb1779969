//! TiKVGroup Custom Resource Definition
//!
//! A TiKVGroup is a set of TiKV stores attached to a TidbCluster. Its spec is
//! owned by users and higher-level tooling; its status is written by the
//! controller through the status subresource.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, MemberPhase};

/// Specification for a TiKVGroup
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "pingcap.com",
    version = "v1alpha1",
    kind = "TiKVGroup",
    plural = "tikvgroups",
    shortname = "tg",
    status = "TiKVGroupStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TiKVGroupSpec {
    /// Name of the TidbCluster this group joins
    pub cluster_name: String,

    /// Number of TiKV stores
    #[serde(default)]
    pub replicas: i32,

    /// Container image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// State of a single TiKV store as seen by PD
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TiKVStore {
    /// PD-assigned store ID
    pub id: String,

    /// Pod backing the store
    pub pod_name: String,

    /// Advertised address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// PD store state (Up, Down, Offline, Tombstone)
    pub state: String,
}

/// Status for a TiKVGroup
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TiKVGroupStatus {
    /// The generation of the spec that was last processed by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Current phase of the group
    #[serde(default)]
    pub phase: MemberPhase,

    /// Whether the observed stores match the desired spec
    #[serde(default)]
    pub synced: bool,

    /// Stores keyed by store ID
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stores: BTreeMap<String, TiKVStore>,

    /// Conditions representing the group state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl TiKVGroupStatus {
    /// Create a status in the given phase
    pub fn with_phase(phase: MemberPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Builder: record a store
    pub fn store(mut self, store: TiKVStore) -> Self {
        self.stores.insert(store.id.clone(), store);
        self
    }

    /// Builder: add or replace a condition of the same type
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }
}
