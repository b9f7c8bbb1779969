//! HTTP plumbing for member status calls
//!
//! Every call reads the whole response body before returning so the
//! connection is released on every path, error paths included. The
//! [`MemberResponse`] owns the drained body; classification of failures
//! (status errors, "not DDL owner", decode errors) happens here rather than
//! by callers matching on message text.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use tidb_common::Error;

use crate::config::ControlConfig;
use crate::secrets::ClientTlsMaterial;

/// Message TiDB returns when asked to resign DDL ownership it does not hold
pub const NOT_DDL_OWNER_MESSAGE: &str = "This node is not a ddl owner, can't be resigned.";

/// A fully drained member response
#[derive(Debug)]
pub(crate) struct MemberResponse {
    pub(crate) url: String,
    pub(crate) status: StatusCode,
    pub(crate) body: Vec<u8>,
}

impl MemberResponse {
    /// Whether the status is below the client-error range
    pub(crate) fn is_healthy(&self) -> bool {
        self.status.as_u16() < 400
    }

    /// Structured error for a response that was not the expected 200
    pub(crate) fn status_error(&self) -> Error {
        Error::remote_status(self.status.as_u16(), self.url.clone())
    }

    /// Like [`Self::ok`], but a refusal because the member does not own DDL
    /// becomes [`Error::NotDdlOwner`]
    ///
    /// Only meaningful for `/ddl/owner/resign`; other endpoints never carry
    /// that message as a distinct outcome.
    pub(crate) fn ok_or_not_owner(self) -> Result<Self, Error> {
        if self.status != StatusCode::OK
            && String::from_utf8_lossy(&self.body).contains(NOT_DDL_OWNER_MESSAGE)
        {
            return Err(Error::NotDdlOwner { url: self.url });
        }
        self.ok()
    }

    /// Require exactly 200 OK
    pub(crate) fn ok(self) -> Result<Self, Error> {
        if self.status != StatusCode::OK {
            return Err(self.status_error());
        }
        Ok(self)
    }

    /// Require 200 OK and decode the body as JSON
    pub(crate) fn json<T: DeserializeOwned>(self) -> Result<T, Error> {
        let response = self.ok()?;
        serde_json::from_slice(&response.body).map_err(|e| Error::decode(response.url, e))
    }
}

/// Issue a request and drain its body
pub(crate) async fn fetch(client: &Client, method: Method, url: &str) -> Result<MemberResponse, Error> {
    let response = client
        .request(method, url)
        .send()
        .await
        .map_err(|e| Error::transport(url, e))?;
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::transport(url, e))?
        .to_vec();

    Ok(MemberResponse {
        url: url.to_string(),
        status,
        body,
    })
}

/// Build the HTTP client for one call
///
/// Without TLS material this is a plain client with the configured timeout.
/// With it, the client presents the certificate/key pair and trusts only the
/// CA bundle from the secret.
pub(crate) fn build_client(
    config: &ControlConfig,
    tls: Option<&ClientTlsMaterial>,
) -> Result<Client, Error> {
    let builder = Client::builder().timeout(config.http_timeout);

    let Some(material) = tls else {
        return builder
            .build()
            .map_err(|e| Error::internal_with_context("http-client", e.to_string()));
    };

    let tls_error = |msg: String| Error::tls(&material.namespace, &material.secret_name, msg);

    let mut identity_pem = material.cert_pem.clone();
    identity_pem.push(b'\n');
    identity_pem.extend_from_slice(&material.key_pem);
    let identity = reqwest::Identity::from_pem(&identity_pem)
        .map_err(|e| tls_error(format!("invalid client certificate or key: {}", e)))?;

    let mut builder = builder
        .use_rustls_tls()
        .tls_built_in_root_certs(false)
        .identity(identity);

    if let Some(ca_pem) = &material.ca_pem {
        let roots = reqwest::Certificate::from_pem_bundle(ca_pem)
            .map_err(|e| tls_error(format!("invalid CA bundle: {}", e)))?;
        for root in roots {
            builder = builder.add_root_certificate(root);
        }
    }

    builder
        .build()
        .map_err(|e| tls_error(format!("failed to build TLS client: {}", e)))
}
