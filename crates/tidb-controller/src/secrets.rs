//! Client TLS material for talking to cluster members
//!
//! When a cluster enables component TLS, every member call presents a client
//! certificate read from `{cluster}-cluster-client-secret`. The secret is read
//! on every call so that rotated certificates are picked up immediately.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use tidb_common::crd::TidbCluster;
use tidb_common::naming::{
    cluster_client_tls_secret_name, TLS_CA_KEY, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY,
};
use tidb_common::Error;

/// Read access to Kubernetes Secrets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Get a Secret by namespace and name
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, Error>;
}

/// Secret source backed by the Kubernetes API
pub struct KubeSecretSource {
    client: Client,
}

impl KubeSecretSource {
    /// Create a new source wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretSource for KubeSecretSource {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }
}

/// PEM material for a mutually authenticated member connection
#[derive(Clone, Debug)]
pub struct ClientTlsMaterial {
    /// Namespace the secret was read from
    pub namespace: String,
    /// Name of the secret
    pub secret_name: String,
    /// Client certificate chain (PEM)
    pub cert_pem: Vec<u8>,
    /// Client private key (PEM)
    pub key_pem: Vec<u8>,
    /// Root CA bundle (PEM); absent means nothing is trusted
    pub ca_pem: Option<Vec<u8>>,
}

impl ClientTlsMaterial {
    /// Extract material from a secret, requiring certificate and key
    pub fn from_secret(
        namespace: &str,
        secret_name: &str,
        secret: &Secret,
    ) -> Result<Self, Error> {
        let field = |key: &str| {
            secret
                .data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(|bytes| bytes.0.clone())
        };

        let cert_pem = field(TLS_CERT_KEY)
            .ok_or_else(|| Error::missing_credential(namespace, secret_name, TLS_CERT_KEY))?;
        let key_pem = field(TLS_PRIVATE_KEY_KEY).ok_or_else(|| {
            Error::missing_credential(namespace, secret_name, TLS_PRIVATE_KEY_KEY)
        })?;

        Ok(Self {
            namespace: namespace.to_string(),
            secret_name: secret_name.to_string(),
            cert_pem,
            key_pem,
            ca_pem: field(TLS_CA_KEY),
        })
    }
}

/// Load the client TLS material of a cluster from its client secret
pub async fn load_cluster_client_tls(
    secrets: &dyn SecretSource,
    tc: &TidbCluster,
) -> Result<ClientTlsMaterial, Error> {
    let namespace = tc.namespace_or_default();
    let secret_name = cluster_client_tls_secret_name(&tc.name_any());
    let secret = secrets.get_secret(&namespace, &secret_name).await?;
    ClientTlsMaterial::from_secret(&namespace, &secret_name, &secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;
    use tidb_common::crd::{TidbClusterSpec, TlsCluster};

    fn secret_with(fields: &[(&str, &str)]) -> Secret {
        let data: BTreeMap<String, ByteString> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
            .collect();
        Secret {
            data: Some(data),
            ..Default::default()
        }
    }

    fn tls_cluster() -> TidbCluster {
        let mut tc = TidbCluster::new(
            "demo",
            TidbClusterSpec {
                tidb: None,
                tls_cluster: Some(TlsCluster { enabled: true }),
            },
        );
        tc.metadata.namespace = Some("default".to_string());
        tc
    }

    #[test]
    fn test_complete_secret_yields_material() {
        let secret = secret_with(&[
            (TLS_CERT_KEY, "CERT"),
            (TLS_PRIVATE_KEY_KEY, "KEY"),
            (TLS_CA_KEY, "CA"),
        ]);
        let material = ClientTlsMaterial::from_secret("default", "s", &secret).unwrap();
        assert_eq!(material.cert_pem, b"CERT");
        assert_eq!(material.key_pem, b"KEY");
        assert_eq!(material.ca_pem.as_deref(), Some(&b"CA"[..]));
    }

    #[test]
    fn test_ca_is_optional() {
        let secret = secret_with(&[(TLS_CERT_KEY, "CERT"), (TLS_PRIVATE_KEY_KEY, "KEY")]);
        let material = ClientTlsMaterial::from_secret("default", "s", &secret).unwrap();
        assert!(material.ca_pem.is_none());
    }

    #[test]
    fn test_missing_key_is_missing_credential() {
        let secret = secret_with(&[(TLS_CERT_KEY, "CERT"), (TLS_CA_KEY, "CA")]);
        let err = ClientTlsMaterial::from_secret("default", "s", &secret).unwrap_err();
        match err {
            Error::MissingCredential { field, .. } => assert_eq!(field, TLS_PRIVATE_KEY_KEY),
            other => panic!("expected MissingCredential, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_secret_reports_certificate_first() {
        let err = ClientTlsMaterial::from_secret("default", "s", &Secret::default()).unwrap_err();
        assert!(err.to_string().starts_with("tls.crt does not exist"));
    }

    #[tokio::test]
    async fn test_load_reads_the_cluster_client_secret() {
        let mut secrets = MockSecretSource::new();
        secrets
            .expect_get_secret()
            .withf(|ns, name| {
                ns.to_string() == "default" && name.to_string() == "demo-cluster-client-secret"
            })
            .times(1)
            .returning(|_, _| {
                Ok(secret_with(&[
                    (TLS_CERT_KEY, "CERT"),
                    (TLS_PRIVATE_KEY_KEY, "KEY"),
                ]))
            });

        let material = load_cluster_client_tls(&secrets, &tls_cluster()).await.unwrap();
        assert_eq!(material.secret_name, "demo-cluster-client-secret");
        assert_eq!(material.namespace, "default");
    }

    #[tokio::test]
    async fn test_load_propagates_secret_store_errors() {
        let mut secrets = MockSecretSource::new();
        secrets
            .expect_get_secret()
            .returning(|_, _| Err(Error::internal("secret store unavailable")));

        let err = load_cluster_client_tls(&secrets, &tls_cluster()).await.unwrap_err();
        assert!(err.to_string().contains("secret store unavailable"));
    }
}
