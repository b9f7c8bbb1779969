//! Error types for the TiDB control plane
//!
//! Errors carry the cluster/member coordinates that produced them (URL,
//! namespace, resource name) so that the caller can log or surface them
//! without re-deriving context.

use thiserror::Error;

/// Main error type for member control and status update operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The member could not be reached (connect failure, timeout, broken body)
    #[error("transport error for {url}: {source}")]
    Transport {
        /// URL that was requested
        url: String,
        /// The underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// The member answered with an unexpected HTTP status
    #[error("error response {code} URL: {url}")]
    RemoteStatus {
        /// HTTP status code returned by the member
        code: u16,
        /// URL that was requested
        url: String,
    },

    /// The member refused a DDL owner operation because it is not the owner
    #[error("member at {url} is not the DDL owner")]
    NotDdlOwner {
        /// URL that was requested
        url: String,
    },

    /// The member answered 200 but the payload did not decode
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// URL that was requested
        url: String,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Client TLS secret is missing a required field
    #[error("{field} does not exist in secret {namespace}/{secret}")]
    MissingCredential {
        /// Namespace of the secret
        namespace: String,
        /// Name of the secret
        secret: String,
        /// The missing data key (e.g. "tls.key")
        field: String,
    },

    /// Client TLS material is present but unusable
    #[error("unable to load certificates from secret {namespace}/{secret}: {message}")]
    Tls {
        /// Namespace of the secret
        namespace: String,
        /// Name of the secret
        secret: String,
        /// Description of what failed
        message: String,
    },

    /// The store rejected a write because the object changed since it was read
    #[error("conflict updating {namespace}/{name}: {message}")]
    WriteConflict {
        /// Namespace of the object
        namespace: String,
        /// Name of the object
        name: String,
        /// Message reported by the store
        message: String,
    },

    /// Re-reading an object from the lister failed
    #[error("error getting updated {namespace}/{name} from lister: {message}")]
    Lookup {
        /// Namespace of the object
        namespace: String,
        /// Name of the object
        name: String,
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "fake", "updater")
        context: String,
    },
}

impl Error {
    /// Create a transport error for the given URL
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    /// Create a remote status error carrying the HTTP code and URL
    pub fn remote_status(code: u16, url: impl Into<String>) -> Self {
        Self::RemoteStatus {
            code,
            url: url.into(),
        }
    }

    /// Create a decode error for the given URL
    pub fn decode(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// Create a missing credential error for a secret field
    pub fn missing_credential(
        namespace: impl Into<String>,
        secret: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::MissingCredential {
            namespace: namespace.into(),
            secret: secret.into(),
            field: field.into(),
        }
    }

    /// Create a TLS material error for a secret
    pub fn tls(
        namespace: impl Into<String>,
        secret: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Tls {
            namespace: namespace.into(),
            secret: secret.into(),
            message: msg.into(),
        }
    }

    /// Create a write conflict error for an object
    pub fn write_conflict(
        namespace: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::WriteConflict {
            namespace: namespace.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a lister lookup error for an object
    pub fn lookup(
        namespace: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Lookup {
            namespace: namespace.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::internal_with_context("unknown", msg)
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error means the object changed underneath the writer
    ///
    /// A raw 409 from the API server counts as well, so callers do not need
    /// to care whether the store already classified it.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::WriteConflict { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 409,
            _ => false,
        }
    }

    /// Check if this error is retryable by a later reconcile pass
    ///
    /// Credential and decode problems need a fix on the other side and are
    /// not worth retrying. Everything network- or store-related is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409
            ),
            Error::Transport { .. } => true,
            Error::RemoteStatus { code, .. } => *code >= 500,
            Error::NotDdlOwner { .. } => false,
            Error::Decode { .. } => false,
            Error::MissingCredential { .. } => false,
            Error::Tls { .. } => false,
            Error::WriteConflict { .. } => true,
            Error::Lookup { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// HTTP status code associated with this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::RemoteStatus { code, .. } => Some(*code),
            Error::Kube {
                source: kube::Error::Api(ae),
            } => Some(ae.code),
            Error::WriteConflict { .. } => Some(409),
            _ => None,
        }
    }
}
