//! DLQ redrive utility.
//!
//! Moves messages from the dead-letter queue back to the main queue after
//! a human-triggered recovery (typically a bug fix deployment). Invoked
//! out-of-band by an operator, never by the client API.
//!
//! Idempotent on partial failure: each message is sent to the main queue
//! **before** it is deleted from the DLQ. A crash between the two leaves
//! the message in the DLQ to be re-sent on the next redrive; the duplicate
//! is absorbed by the job store's conditional writes.

use serde::Serialize;

use crate::error::Result;
use crate::metrics::FlowMetrics;
use crate::queue::RequestQueue;

/// Hard cap on messages moved per invocation.
pub const MAX_REDRIVE_MESSAGES: usize = 1000;

/// DLQ receive batch size.
const RECEIVE_BATCH: usize = 10;

/// Options for one redrive invocation.
#[derive(Debug, Clone, Copy)]
pub struct RedriveOptions {
    /// Count the DLQ without moving anything.
    pub dry_run: bool,
    /// Maximum messages to move, clamped to [`MAX_REDRIVE_MESSAGES`].
    pub max_messages: usize,
}

impl Default for RedriveOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_messages: 100,
        }
    }
}

/// Summary of one redrive invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RedriveReport {
    /// 200 on full success, 207 on partial failure.
    pub status_code: u16,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Messages moved to the main queue and deleted from the DLQ.
    pub messages_redriven: usize,
    /// Approximate DLQ depth before the invocation.
    pub dlq_message_count_before: usize,
    /// Per-message error descriptions, when any.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Human-readable summary.
    pub message: String,
}

/// Redrives messages from the DLQ to the main queue.
///
/// # Errors
///
/// Returns an error only when the DLQ itself cannot be read; per-message
/// failures are recorded in the report and do not abort the sweep.
pub async fn redrive(queue: &dyn RequestQueue, options: RedriveOptions) -> Result<RedriveReport> {
    let metrics = FlowMetrics::new();
    let max_messages = options.max_messages.min(MAX_REDRIVE_MESSAGES);
    let dlq_message_count_before = queue.dlq_depth().await?;

    tracing::info!(
        max_messages,
        dry_run = options.dry_run,
        dlq_depth = dlq_message_count_before,
        "starting DLQ redrive"
    );

    if options.dry_run {
        return Ok(RedriveReport {
            status_code: 200,
            dry_run: true,
            messages_redriven: 0,
            dlq_message_count_before,
            errors: Vec::new(),
            message: format!(
                "Dry run complete. {dlq_message_count_before} messages in DLQ."
            ),
        });
    }

    if dlq_message_count_before == 0 {
        return Ok(RedriveReport {
            status_code: 200,
            dry_run: false,
            messages_redriven: 0,
            dlq_message_count_before,
            errors: Vec::new(),
            message: "DLQ is empty. Nothing to redrive.".to_string(),
        });
    }

    let mut messages_redriven = 0_usize;
    let mut errors = Vec::new();

    while messages_redriven < max_messages {
        let batch_size = RECEIVE_BATCH.min(max_messages - messages_redriven);
        let deliveries = queue.receive_dlq(batch_size).await?;
        if deliveries.is_empty() {
            break;
        }

        for delivery in deliveries {
            // Send first, delete second: a crash in between duplicates the
            // message, never loses it.
            if let Err(e) = queue.enqueue_raw(delivery.body.clone()).await {
                errors.push(format!("failed to re-enqueue message: {e}"));
                continue;
            }
            if let Err(e) = queue.ack_dlq(&delivery.token).await {
                errors.push(format!("failed to delete DLQ message: {e}"));
                continue;
            }
            messages_redriven += 1;
        }
    }

    metrics.record_redriven(messages_redriven as u64);

    let (status_code, message) = if errors.is_empty() {
        (
            200,
            format!("Successfully redriven {messages_redriven} messages"),
        )
    } else {
        (
            207,
            format!(
                "Redriven {messages_redriven} messages with {} errors",
                errors.len()
            ),
        )
    };
    tracing::info!(messages_redriven, errors = errors.len(), "redrive complete");

    Ok(RedriveReport {
        status_code,
        dry_run: false,
        messages_redriven,
        dlq_message_count_before,
        errors,
        message,
    })
}
