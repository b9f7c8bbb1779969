//! Deterministic names derived from a cluster name
//!
//! Every name here is a pure function of its inputs. Pod, service and secret
//! names must agree with what the deployment templates create.

/// Port of the TiDB status HTTP API
pub const TIDB_STATUS_PORT: u16 = 10080;

/// Secret data key holding the client certificate
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret data key holding the client private key
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

/// Secret data key holding the root CA bundle
pub const TLS_CA_KEY: &str = "ca.crt";

/// Name of the TiDB StatefulSet for a cluster
pub fn tidb_member_name(cluster: &str) -> String {
    format!("{}-tidb", cluster)
}

/// Name of the headless peer Service fronting the TiDB members
pub fn tidb_peer_member_name(cluster: &str) -> String {
    format!("{}-tidb-peer", cluster)
}

/// Pod name of one TiDB replica
pub fn tidb_pod_name(cluster: &str, ordinal: i32) -> String {
    format!("{}-{}", tidb_member_name(cluster), ordinal)
}

/// Secret holding the client certificate used to talk to cluster members
pub fn cluster_client_tls_secret_name(cluster: &str) -> String {
    format!("{}-cluster-client-secret", cluster)
}

/// Base URL of one TiDB member's status API
///
/// `{scheme}://{cluster}-tidb-{ordinal}.{cluster}-tidb-peer.{namespace}:10080`
pub fn tidb_member_url(scheme: &str, cluster: &str, ordinal: i32, namespace: &str) -> String {
    format!(
        "{}://{}.{}.{}:{}",
        scheme,
        tidb_pod_name(cluster, ordinal),
        tidb_peer_member_name(cluster),
        namespace,
        TIDB_STATUS_PORT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_member_url_for_plaintext_cluster() {
        assert_eq!(
            tidb_member_url("http", "demo", 1, "default"),
            "http://demo-tidb-1.demo-tidb-peer.default:10080"
        );
    }

    #[test]
    fn test_member_url_for_tls_cluster() {
        assert_eq!(
            tidb_member_url("https", "prod", 0, "tidb"),
            "https://prod-tidb-0.prod-tidb-peer.tidb:10080"
        );
    }

    #[test]
    fn test_member_urls_are_distinct_across_clusters_and_ordinals() {
        let mut seen = HashSet::new();
        for cluster in ["demo", "demo-1", "demo-tidb", "a", "a-1"] {
            for ordinal in 0..12 {
                let url = tidb_member_url("http", cluster, ordinal, "default");
                assert!(seen.insert(url.clone()), "duplicate url {}", url);
            }
        }
    }

    #[test]
    fn test_secret_and_pod_names() {
        assert_eq!(cluster_client_tls_secret_name("demo"), "demo-cluster-client-secret");
        assert_eq!(tidb_pod_name("demo", 2), "demo-tidb-2");
        assert_eq!(tidb_peer_member_name("demo"), "demo-tidb-peer");
    }
}
