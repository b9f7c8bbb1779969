//! Kubernetes Events for status writes
//!
//! Status writers report the outcome of a write as an Event on the object
//! they wrote, so that `kubectl describe tikvgroup` shows when the status
//! last changed and when a write gave up. Publishing never fails the caller:
//! recorder errors are logged and dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Well-known event reasons
pub mod reasons {
    /// Status write landed
    pub const SUCCESSFUL_UPDATE: &str = "SuccessfulUpdate";
    /// Status write gave up
    pub const FAILED_UPDATE: &str = "FailedUpdate";
}

/// Well-known event actions
pub mod actions {
    /// Writing the status subresource
    pub const UPDATE_STATUS: &str = "UpdateStatus";
}

/// Outcome of a status write, ready to be published
#[derive(Clone, Debug)]
pub struct StatusEvent {
    /// Normal for a landed write, Warning for one that gave up
    pub type_: EventType,
    /// One of [`reasons`]
    pub reason: &'static str,
    /// Human readable description of the change
    pub note: String,
}

impl StatusEvent {
    /// A status write that landed
    pub fn updated(note: impl Into<String>) -> Self {
        Self {
            type_: EventType::Normal,
            reason: reasons::SUCCESSFUL_UPDATE,
            note: note.into(),
        }
    }

    /// A status write that gave up
    pub fn update_failed(note: impl Into<String>) -> Self {
        Self {
            type_: EventType::Warning,
            reason: reasons::FAILED_UPDATE,
            note: note.into(),
        }
    }

    fn into_event(self) -> Event {
        Event {
            type_: self.type_,
            reason: self.reason.to_string(),
            note: Some(self.note),
            action: actions::UPDATE_STATUS.to_string(),
            secondary: None,
        }
    }
}

/// Sink for status write events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Record `event` against the object behind `object`
    async fn publish(&self, object: &ObjectReference, event: StatusEvent);
}

/// Publisher backed by the Kubernetes events API
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, object: &ObjectReference, event: StatusEvent) {
        let reason = event.reason;
        if let Err(e) = self.recorder.publish(&event.into_event(), object).await {
            warn!(
                reason,
                namespace = object.namespace.as_deref().unwrap_or_default(),
                name = object.name.as_deref().unwrap_or_default(),
                error = %e,
                "Failed to publish status event"
            );
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _object: &ObjectReference, _event: StatusEvent) {}
}
