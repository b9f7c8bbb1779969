//! TidbCluster Custom Resource Definition
//!
//! Only the parts of the cluster spec that the member control client reads
//! are modelled here: the TiDB group and the cluster-wide TLS switch.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Namespace assumed when a cluster object carries none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Specification for a TidbCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "pingcap.com",
    version = "v1alpha1",
    kind = "TidbCluster",
    plural = "tidbclusters",
    shortname = "tc",
    namespaced,
    printcolumn = r#"{"name":"TiDB","type":"integer","jsonPath":".spec.tidb.replicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TidbClusterSpec {
    /// TiDB member group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tidb: Option<TidbSpec>,

    /// TLS between cluster components
    ///
    /// When enabled, members serve their status API over HTTPS and require a
    /// client certificate from the `{cluster}-cluster-client-secret` secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cluster: Option<TlsCluster>,
}

/// TiDB member group specification
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TidbSpec {
    /// Number of TiDB replicas
    #[serde(default)]
    pub replicas: i32,

    /// Container image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Cluster component TLS switch
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct TlsCluster {
    /// Whether components talk to each other over mutual TLS
    #[serde(default)]
    pub enabled: bool,
}

impl TidbCluster {
    /// Returns true if component-to-component TLS is enabled
    pub fn is_tls_cluster_enabled(&self) -> bool {
        self.spec
            .tls_cluster
            .as_ref()
            .is_some_and(|tls| tls.enabled)
    }

    /// URL scheme of the members' status API
    pub fn scheme(&self) -> &'static str {
        if self.is_tls_cluster_enabled() {
            "https"
        } else {
            "http"
        }
    }

    /// Namespace of the cluster, falling back to `default`
    pub fn namespace_or_default(&self) -> String {
        self.namespace()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// Desired TiDB replica count (0 when the TiDB group is absent)
    pub fn tidb_replicas(&self) -> i32 {
        self.spec.tidb.as_ref().map(|t| t.replicas).unwrap_or(0)
    }
}
