//! Durable request queue abstraction.
//!
//! This module provides:
//!
//! - [`RequestQueue`]: Trait over an at-least-once queue with a DLQ
//! - [`MappingRequest`]: Serializable mapping-request payload
//! - [`InMemoryRequestQueue`]: In-memory queue for testing
//!
//! ## Design Principles
//!
//! - **Backend agnostic**: Same interface for SQS-style services and local
//!   queues
//! - **At-least-once**: A received message is invisible for the visibility
//!   timeout; it is redelivered unless acknowledged
//! - **Failure isolation**: After `max_receive_count` deliveries a message
//!   moves to the dead-letter queue for out-of-band redrive
//!
//! Acknowledgement is explicit; negative acknowledgement is implicit (let
//! the visibility timeout lapse).

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crosswalk_core::keys::{ControlKey, FrameworkKey};

use crate::error::Result;

/// Payload of one mapping request. Message identity is the job ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRequest {
    /// The job this request drives.
    pub job_id: Uuid,
    /// Validated source control key.
    pub source_control_key: ControlKey,
    /// Validated target framework key.
    pub target_framework_key: FrameworkKey,
    /// Optional restriction of candidates to these control IDs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_control_ids: Option<Vec<String>>,
    /// When the request was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl MappingRequest {
    /// Creates a request stamped now.
    #[must_use]
    pub fn new(
        job_id: Uuid,
        source_control_key: ControlKey,
        target_framework_key: FrameworkKey,
        target_control_ids: Option<Vec<String>>,
    ) -> Self {
        Self {
            job_id,
            source_control_key,
            target_framework_key,
            target_control_ids,
            enqueued_at: Utc::now(),
        }
    }
}

/// An opaque per-delivery token used to acknowledge a message.
///
/// Tokens are single-delivery: a token from a lapsed delivery no longer
/// acknowledges the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryToken(pub(crate) String);

impl DeliveryToken {
    /// Returns the token's opaque string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One delivered message.
///
/// The body is the raw serialized payload: consumers validate it
/// themselves so that poison messages can be dropped rather than retried
/// forever.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Token for acknowledging this delivery.
    pub token: DeliveryToken,
    /// Raw message body (JSON-encoded [`MappingRequest`]).
    pub body: String,
    /// How many times this message has been delivered, 1-indexed.
    pub receive_count: u32,
}

impl Delivery {
    /// Parses the body as a [`MappingRequest`].
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the body does not validate; such
    /// messages can never succeed and should be acknowledged and dropped.
    pub fn request(&self) -> Result<MappingRequest> {
        serde_json::from_str(&self.body).map_err(|e| {
            crosswalk_core::Error::serialization(format!("invalid queue message body: {e}")).into()
        })
    }
}

/// Durable, at-least-once request queue with a dead-letter queue.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support concurrent access from many
/// intake handlers and worker instances.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    /// Enqueues a mapping request. Returns after the message is durably
    /// committed, with the queue-assigned message ID.
    async fn enqueue(&self, request: &MappingRequest) -> Result<String>;

    /// Enqueues a raw message body on the main queue. Used by redrive,
    /// which must not reinterpret DLQ payloads.
    async fn enqueue_raw(&self, body: String) -> Result<String>;

    /// Receives up to `max` visible messages from the main queue. Each
    /// delivered message becomes invisible for the visibility timeout.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Permanently deletes a message by its delivery token.
    async fn ack(&self, token: &DeliveryToken) -> Result<()>;

    /// Approximate number of visible messages on the main queue.
    async fn depth(&self) -> Result<usize>;

    /// Approximate number of messages on the dead-letter queue.
    async fn dlq_depth(&self) -> Result<usize>;

    /// Receives up to `max` messages from the dead-letter queue.
    async fn receive_dlq(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Permanently deletes a dead-letter message by its delivery token.
    async fn ack_dlq(&self, token: &DeliveryToken) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> MappingRequest {
        MappingRequest::new(
            Uuid::new_v4(),
            ControlKey::parse("AWS.EC2#1.0#PR.1").unwrap(),
            FrameworkKey::parse("NIST-SP-800-53#R5").unwrap(),
            Some(vec!["AC-1".to_string()]),
        )
    }

    #[test]
    fn request_roundtrips_through_json() {
        let request = sample_request();
        let json = serde_json::to_string(&request).unwrap();
        let back: MappingRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn delivery_rejects_malformed_body() {
        let delivery = Delivery {
            token: DeliveryToken("t-1".to_string()),
            body: "{\"job_id\": \"not-a-uuid\"}".to_string(),
            receive_count: 1,
        };
        assert!(delivery.request().is_err());
    }

    #[test]
    fn delivery_parses_valid_body() {
        let request = sample_request();
        let delivery = Delivery {
            token: DeliveryToken("t-1".to_string()),
            body: serde_json::to_string(&request).unwrap(),
            receive_count: 1,
        };
        assert_eq!(delivery.request().unwrap(), request);
    }
}
