//! In-memory queue implementation for testing.
//!
//! Models the at-least-once envelope faithfully: visibility timeouts,
//! receive counts, dead-letter overflow after `max_receive_count`
//! deliveries, and single-delivery acknowledgement tokens.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, single-process only
//! - Retention windows are not modeled; nothing expires

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Delivery, DeliveryToken, MappingRequest, RequestQueue};
use crate::error::{Error, Result};

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::queue("lock poisoned")
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    receive_count: u32,
    /// Invisible until this instant; `None` means visible now.
    invisible_until: Option<DateTime<Utc>>,
    /// Token of the outstanding delivery, if any.
    outstanding_token: Option<String>,
}

#[derive(Debug, Default)]
struct QueueState {
    main: Vec<StoredMessage>,
    dlq: Vec<StoredMessage>,
    /// token → message_id for outstanding main-queue deliveries.
    tokens: HashMap<String, String>,
    dlq_tokens: HashMap<String, String>,
}

/// In-memory request queue for testing.
#[derive(Debug)]
pub struct InMemoryRequestQueue {
    state: Mutex<QueueState>,
    visibility_timeout: Duration,
    max_receive_count: u32,
}

impl InMemoryRequestQueue {
    /// Creates a queue with the given visibility timeout and receive cap.
    #[must_use]
    pub fn new(visibility_timeout: Duration, max_receive_count: u32) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            visibility_timeout,
            max_receive_count,
        }
    }

    /// Places a raw body directly on the dead-letter queue.
    ///
    /// Test hook for exercising redrive without driving real failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn seed_dlq(&self, body: String) -> Result<()> {
        let mut state = self.state.lock().map_err(poison_err)?;
        state.dlq.push(StoredMessage {
            message_id: Uuid::new_v4().to_string(),
            body,
            receive_count: 0,
            invisible_until: None,
            outstanding_token: None,
        });
        drop(state);
        Ok(())
    }
}

fn is_visible(message: &StoredMessage, now: DateTime<Utc>) -> bool {
    message.invisible_until.map_or(true, |until| until <= now)
}

impl InMemoryRequestQueue {
    fn receive_from(
        &self,
        max: usize,
        from_dlq: bool,
    ) -> Result<Vec<Delivery>> {
        let now = Utc::now();
        let visibility = chrono::Duration::from_std(self.visibility_timeout)
            .map_err(|e| Error::queue(format!("invalid visibility timeout: {e}")))?;
        let mut state = self.state.lock().map_err(poison_err)?;

        // Move exhausted main-queue messages to the DLQ before delivering.
        if !from_dlq {
            let mut kept = Vec::with_capacity(state.main.len());
            let mut moved = Vec::new();
            for message in state.main.drain(..) {
                if is_visible(&message, now) && message.receive_count >= self.max_receive_count {
                    moved.push(StoredMessage {
                        invisible_until: None,
                        outstanding_token: None,
                        ..message
                    });
                } else {
                    kept.push(message);
                }
            }
            state.main = kept;
            state.dlq.extend(moved);
        }

        let mut deliveries = Vec::new();
        let mut issued = Vec::new();
        let queue = if from_dlq {
            &mut state.dlq
        } else {
            &mut state.main
        };
        for message in queue.iter_mut() {
            if deliveries.len() >= max {
                break;
            }
            if !is_visible(message, now) {
                continue;
            }
            let token = Uuid::new_v4().to_string();
            message.receive_count += 1;
            message.invisible_until = Some(now + visibility);
            message.outstanding_token = Some(token.clone());
            deliveries.push(Delivery {
                token: DeliveryToken(token.clone()),
                body: message.body.clone(),
                receive_count: message.receive_count,
            });
            issued.push((token, message.message_id.clone()));
        }
        let tokens = if from_dlq {
            &mut state.dlq_tokens
        } else {
            &mut state.tokens
        };
        for (token, message_id) in issued {
            tokens.insert(token, message_id);
        }
        drop(state);
        Ok(deliveries)
    }

    fn ack_in(&self, token: &DeliveryToken, from_dlq: bool) -> Result<()> {
        let mut state = self.state.lock().map_err(poison_err)?;
        let tokens = if from_dlq {
            &mut state.dlq_tokens
        } else {
            &mut state.tokens
        };
        let Some(message_id) = tokens.remove(&token.0) else {
            drop(state);
            return Err(Error::queue("unknown or expired delivery token"));
        };
        let queue = if from_dlq {
            &mut state.dlq
        } else {
            &mut state.main
        };
        // The token only deletes the message if it is still the outstanding
        // delivery; a lapsed token must not delete a redelivered message.
        queue.retain(|message| {
            message.message_id != message_id
                || message.outstanding_token.as_deref() != Some(token.0.as_str())
        });
        drop(state);
        Ok(())
    }
}

#[async_trait]
impl RequestQueue for InMemoryRequestQueue {
    async fn enqueue(&self, request: &MappingRequest) -> Result<String> {
        let body = serde_json::to_string(request)
            .map_err(|e| Error::queue(format!("failed to encode request: {e}")))?;
        self.enqueue_raw(body).await
    }

    async fn enqueue_raw(&self, body: String) -> Result<String> {
        let message_id = Uuid::new_v4().to_string();
        let mut state = self.state.lock().map_err(poison_err)?;
        state.main.push(StoredMessage {
            message_id: message_id.clone(),
            body,
            receive_count: 0,
            invisible_until: None,
            outstanding_token: None,
        });
        drop(state);
        Ok(message_id)
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        self.receive_from(max, false)
    }

    async fn ack(&self, token: &DeliveryToken) -> Result<()> {
        self.ack_in(token, false)
    }

    async fn depth(&self) -> Result<usize> {
        let now = Utc::now();
        let state = self.state.lock().map_err(poison_err)?;
        Ok(state.main.iter().filter(|m| is_visible(m, now)).count())
    }

    async fn dlq_depth(&self) -> Result<usize> {
        let now = Utc::now();
        let state = self.state.lock().map_err(poison_err)?;
        Ok(state.dlq.iter().filter(|m| is_visible(m, now)).count())
    }

    async fn receive_dlq(&self, max: usize) -> Result<Vec<Delivery>> {
        self.receive_from(max, true)
    }

    async fn ack_dlq(&self, token: &DeliveryToken) -> Result<()> {
        self.ack_in(token, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosswalk_core::keys::{ControlKey, FrameworkKey};

    fn short_visibility_queue() -> InMemoryRequestQueue {
        InMemoryRequestQueue::new(Duration::from_millis(40), 3)
    }

    fn sample_request() -> MappingRequest {
        MappingRequest::new(
            Uuid::new_v4(),
            ControlKey::parse("AWS.EC2#1.0#PR.1").unwrap(),
            FrameworkKey::parse("NIST-SP-800-53#R5").unwrap(),
            None,
        )
    }

    #[tokio::test]
    async fn enqueue_receive_ack_deletes_message() {
        let queue = short_visibility_queue();
        queue.enqueue(&sample_request()).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 1);

        let deliveries = queue.receive(10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].receive_count, 1);
        // In flight: not visible.
        assert_eq!(queue.depth().await.unwrap(), 0);

        queue.ack(&deliveries[0].token).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(queue.receive(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unacked_message_is_redelivered_after_visibility_timeout() {
        let queue = short_visibility_queue();
        queue.enqueue(&sample_request()).await.unwrap();

        let first = queue.receive(10).await.unwrap();
        assert_eq!(first.len(), 1);
        // Invisible while in flight.
        assert!(queue.receive(10).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;
        let second = queue.receive(10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].receive_count, 2);
        assert_eq!(second[0].body, first[0].body);
    }

    #[tokio::test]
    async fn lapsed_token_does_not_delete_redelivered_message() {
        let queue = short_visibility_queue();
        queue.enqueue(&sample_request()).await.unwrap();

        let first = queue.receive(10).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let second = queue.receive(10).await.unwrap();
        assert_eq!(second.len(), 1);

        // The first delivery's token has lapsed; the redelivery survives it.
        let _ = queue.ack(&first[0].token).await;
        queue.ack(&second[0].token).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(queue.receive(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_moves_to_dlq_after_max_receive_count() {
        let queue = short_visibility_queue();
        queue.enqueue(&sample_request()).await.unwrap();

        for expected in 1..=3 {
            let deliveries = queue.receive(10).await.unwrap();
            assert_eq!(deliveries.len(), 1, "delivery {expected}");
            assert_eq!(deliveries[0].receive_count, expected);
            tokio::time::sleep(Duration::from_millis(60)).await;
        }

        // Fourth eligibility: moved to DLQ instead of delivered.
        assert!(queue.receive(10).await.unwrap().is_empty());
        assert_eq!(queue.dlq_depth().await.unwrap(), 1);
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dlq_receive_and_ack() {
        let queue = short_visibility_queue();
        queue.seed_dlq("{\"x\":1}".to_string()).unwrap();
        queue.seed_dlq("{\"x\":2}".to_string()).unwrap();
        assert_eq!(queue.dlq_depth().await.unwrap(), 2);

        let deliveries = queue.receive_dlq(10).await.unwrap();
        assert_eq!(deliveries.len(), 2);
        for delivery in &deliveries {
            queue.ack_dlq(&delivery.token).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(queue.dlq_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn receive_respects_max() {
        let queue = short_visibility_queue();
        for _ in 0..5 {
            queue.enqueue(&sample_request()).await.unwrap();
        }
        let deliveries = queue.receive(2).await.unwrap();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(queue.depth().await.unwrap(), 3);
    }
}
