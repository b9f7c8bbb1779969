//! Common types for the TiDB operator control plane: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod naming;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager recorded on writes made by the controller
pub const FIELD_MANAGER: &str = "tidb-controller-manager";
