//! Client configuration

use std::time::Duration;

/// Request timeout for calls to a member's status API
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings shared by every member call
#[derive(Clone, Debug, PartialEq)]
pub struct ControlConfig {
    /// Upper bound on one HTTP round trip, body included
    pub http_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            http_timeout: HTTP_TIMEOUT,
        }
    }
}
