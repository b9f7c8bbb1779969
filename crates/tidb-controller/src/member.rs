//! TiDB member control client
//!
//! Talks to the status API (port 10080) of individual TiDB replicas:
//! liveness, DDL ownership, live settings, and DDL owner resignation.
//!
//! A fresh HTTP client is built for every call. For TLS clusters this means
//! the client secret is re-read each time, so rotated certificates take
//! effect without restarting the controller.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tidb_common::crd::TidbCluster;
use tidb_common::naming::tidb_member_url;
use tidb_common::Error;

use crate::config::ControlConfig;
use crate::http::{build_client, fetch};
use crate::secrets::{load_cluster_client_tls, SecretSource};

/// Ownership information returned by `POST /info`
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DbInfo {
    /// Whether this member currently holds DDL ownership
    #[serde(default)]
    pub is_owner: bool,
}

/// Live configuration returned by `GET /settings`
///
/// The keys the operator reads are typed; everything else TiDB reports is
/// kept verbatim in `extra`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct TidbSettings {
    /// Listen host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Address advertised to other members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,

    /// MySQL protocol port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,

    /// Storage engine (e.g. "tikv")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,

    /// PD endpoints the member was started with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Whether the member takes part in DDL owner election
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_ddl: Option<bool>,

    /// Status server settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusSettings>,

    /// TLS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecuritySettings>,

    /// Every other configuration key
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// `status` section of the TiDB configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct StatusSettings {
    /// Status server listen host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_host: Option<String>,

    /// Status server port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_port: Option<u32>,

    /// Whether the status server is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_status: Option<bool>,
}

/// `security` section of the TiDB configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SecuritySettings {
    /// CA for MySQL clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_ca: Option<String>,

    /// Server certificate for MySQL clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert: Option<String>,

    /// Server key for MySQL clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_key: Option<String>,

    /// CA for component-to-component TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ssl_ca: Option<String>,

    /// Certificate for component-to-component TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ssl_cert: Option<String>,

    /// Key for component-to-component TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ssl_key: Option<String>,
}

/// Result of asking a member to give up DDL ownership
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResignOutcome {
    /// The member was the owner and resigned
    Resigned,
    /// The member was not the owner; nothing to do
    NotOwner,
}

/// Operations against the status API of TiDB members
#[async_trait]
pub trait TidbControl: Send + Sync {
    /// Whether the replica answers `GET /status` with a status below 400
    ///
    /// Never fails: any error, including a broken client configuration,
    /// reads as unhealthy.
    async fn get_health(&self, tc: &TidbCluster, ordinal: i32) -> bool;

    /// DDL ownership of the replica (`POST /info`)
    async fn get_info(&self, tc: &TidbCluster, ordinal: i32) -> Result<DbInfo, Error>;

    /// Live configuration of the replica (`GET /settings`)
    async fn get_settings(&self, tc: &TidbCluster, ordinal: i32) -> Result<TidbSettings, Error>;

    /// Ask the replica to resign DDL ownership (`POST /ddl/owner/resign`)
    async fn resign_ddl_owner(&self, tc: &TidbCluster, ordinal: i32)
        -> Result<ResignOutcome, Error>;
}

/// Base URL of a member's status API
pub fn member_base_url(tc: &TidbCluster, ordinal: i32) -> String {
    tidb_member_url(
        tc.scheme(),
        &tc.name_any(),
        ordinal,
        &tc.namespace_or_default(),
    )
}

/// [`TidbControl`] over HTTP(S)
pub struct DefaultTidbControl {
    secrets: Arc<dyn SecretSource>,
    config: ControlConfig,
    test_url: Option<String>,
}

impl DefaultTidbControl {
    /// Create a control reading client TLS secrets from `secrets`
    pub fn new(secrets: Arc<dyn SecretSource>) -> Self {
        Self {
            secrets,
            config: ControlConfig::default(),
            test_url: None,
        }
    }

    /// Replace the client configuration
    pub fn with_config(mut self, config: ControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Send every call to `url` instead of the member address
    ///
    /// Only meant for tests against a local server.
    pub fn with_test_url(mut self, url: impl Into<String>) -> Self {
        self.test_url = Some(url.into());
        self
    }

    /// Base URL used for a replica, honouring the test override
    pub fn base_url(&self, tc: &TidbCluster, ordinal: i32) -> String {
        match &self.test_url {
            Some(url) => url.clone(),
            None => member_base_url(tc, ordinal),
        }
    }

    async fn http_client(&self, tc: &TidbCluster) -> Result<reqwest::Client, Error> {
        if !tc.is_tls_cluster_enabled() {
            return build_client(&self.config, None);
        }
        let material = load_cluster_client_tls(self.secrets.as_ref(), tc).await?;
        build_client(&self.config, Some(&material))
    }

    async fn call(
        &self,
        tc: &TidbCluster,
        ordinal: i32,
        method: Method,
        path: &str,
    ) -> Result<crate::http::MemberResponse, Error> {
        let client = self.http_client(tc).await?;
        let url = format!("{}{}", self.base_url(tc, ordinal), path);
        fetch(&client, method, &url).await
    }
}

#[async_trait]
impl TidbControl for DefaultTidbControl {
    async fn get_health(&self, tc: &TidbCluster, ordinal: i32) -> bool {
        // A broken client secret also reads as unhealthy
        let client = match self.http_client(tc).await {
            Ok(client) => client,
            Err(e) => {
                warn!(
                    cluster = %tc.name_any(),
                    ordinal,
                    error = %e,
                    "Cannot build member client, reporting replica unhealthy"
                );
                return false;
            }
        };

        let url = format!("{}/status", self.base_url(tc, ordinal));
        match fetch(&client, Method::GET, &url).await {
            Ok(response) if response.is_healthy() => true,
            Ok(response) => {
                debug!(url = %url, code = response.status.as_u16(), "Member status check failed");
                false
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Member unreachable");
                false
            }
        }
    }

    async fn get_info(&self, tc: &TidbCluster, ordinal: i32) -> Result<DbInfo, Error> {
        self.call(tc, ordinal, Method::POST, "/info").await?.json()
    }

    async fn get_settings(&self, tc: &TidbCluster, ordinal: i32) -> Result<TidbSettings, Error> {
        self.call(tc, ordinal, Method::GET, "/settings").await?.json()
    }

    async fn resign_ddl_owner(
        &self,
        tc: &TidbCluster,
        ordinal: i32,
    ) -> Result<ResignOutcome, Error> {
        let response = self
            .call(tc, ordinal, Method::POST, "/ddl/owner/resign")
            .await?;
        match response.ok_or_not_owner() {
            Ok(_) => Ok(ResignOutcome::Resigned),
            Err(Error::NotDdlOwner { url }) => {
                debug!(url = %url, "Member is not the DDL owner, nothing to resign");
                Ok(ResignOutcome::NotOwner)
            }
            Err(e) => Err(e),
        }
    }
}
