// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Due-Message Dispatcher
//!
//! Background task that delivers scheduled messages once their time arrives.
//!
//! ## Strategy
//!
//! Every `poll_interval` (default 5 s) the dispatcher:
//! 1. Lists all due messages (pending, scheduled at or before now) in
//!    schedule order.
//! 2. Claims each one with a `pending → sending` compare-and-set, so a
//!    message cancelled, deleted or claimed elsewhere in the meantime is
//!    skipped rather than sent.
//! 3. Hands it to the sender under `send_timeout` and records `sent` or
//!    `failed`.
//!
//! A process-local in-flight set keeps a manual sweep (`POST /v1/dispatch`)
//! and the timer sweep from both working on the same id.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown. A sweep
//! that has started always finishes; the token is only checked between
//! sweeps.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::{MessageStatus, ScheduledMessage, SweepReport};
use crate::providers::{MessageSender, SendError, SendReceipt};
use crate::storage::{MessageStore, StorageError, StorageResult};

/// Default interval between sweeps.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound on a single delivery attempt.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Error recorded on messages found in `sending` at startup.
pub const INTERRUPTED_ERROR: &str = "delivery interrupted before confirmation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    pub send_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// What happened to a single due message.
enum Outcome {
    Sent,
    Failed,
    Skipped,
}

pub struct Dispatcher<S> {
    store: Arc<dyn MessageStore>,
    sender: S,
    config: DispatcherConfig,
    in_flight: Mutex<HashSet<String>>,
}

/// Removes its id from the in-flight set when dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = match self.set.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        set.remove(&self.id);
    }
}

impl<S: MessageSender> Dispatcher<S> {
    pub fn new(store: Arc<dyn MessageStore>, sender: S, config: DispatcherConfig) -> Self {
        Self {
            store,
            sender,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(dispatcher.clone().run(shutdown.clone()));
    /// ```
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            send_timeout_secs = self.config.send_timeout.as_secs(),
            sender = self.sender.name(),
            "Message dispatcher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Message dispatcher shutting down");
                return;
            }

            if let Err(e) = self.sweep(Utc::now()).await {
                error!(error = %e, "Dispatcher sweep failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Message dispatcher shutting down");
                    return;
                }
            }
        }
    }

    /// Run one sweep at the current instant.
    pub async fn dispatch_now(&self) -> StorageResult<SweepReport> {
        self.sweep(Utc::now()).await
    }

    /// Deliver every message due at `now`, one after another.
    pub async fn sweep(&self, now: DateTime<Utc>) -> StorageResult<SweepReport> {
        let due = self.store.list_due(now)?;
        let mut report = SweepReport {
            due: due.len(),
            ..SweepReport::default()
        };

        if due.is_empty() {
            return Ok(report);
        }

        debug!(count = due.len(), "Dispatcher: processing due messages");

        for message in &due {
            match self.process(message).await {
                Ok(Outcome::Sent) => report.sent += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        error = %e,
                        "Dispatcher: storage error while delivering"
                    );
                    report.errors += 1;
                }
            }
        }

        info!(
            due = report.due,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            errors = report.errors,
            "Dispatcher sweep finished"
        );
        Ok(report)
    }

    /// Move messages left in `sending` by a previous run to `failed`.
    ///
    /// They are not re-sent; whether the provider received them is unknown.
    pub fn recover_interrupted(&self) -> StorageResult<usize> {
        let stuck = self.store.list_by_status(MessageStatus::Sending)?;
        let mut recovered = 0;

        for message in &stuck {
            match self.store.transition(
                &message.id,
                MessageStatus::Sending,
                MessageStatus::Failed,
                &|m| m.last_error = Some(INTERRUPTED_ERROR.to_string()),
            ) {
                Ok(_) => {
                    warn!(
                        message_id = %message.id,
                        attempt = message.attempts,
                        "Marked interrupted delivery as failed"
                    );
                    recovered += 1;
                }
                Err(StorageError::StatusConflict { .. } | StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(recovered)
    }

    fn enter(&self, id: &str) -> Option<InFlightGuard<'_>> {
        let mut set = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !set.insert(id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: &self.in_flight,
            id: id.to_string(),
        })
    }

    async fn process(&self, message: &ScheduledMessage) -> StorageResult<Outcome> {
        let Some(_guard) = self.enter(&message.id) else {
            debug!(message_id = %message.id, "Already in flight, skipping");
            return Ok(Outcome::Skipped);
        };

        let claimed = match self.store.transition(
            &message.id,
            MessageStatus::Pending,
            MessageStatus::Sending,
            &|m| m.attempts += 1,
        ) {
            Ok(claimed) => claimed,
            Err(StorageError::StatusConflict { actual, .. }) => {
                debug!(message_id = %message.id, status = %actual, "Changed before claim, skipping");
                return Ok(Outcome::Skipped);
            }
            Err(StorageError::NotFound(_)) => {
                debug!(message_id = %message.id, "Deleted before claim, skipping");
                return Ok(Outcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        let started = Instant::now();
        let result = self.deliver(&claimed).await;
        let elapsed = started.elapsed();

        match result {
            Ok(receipt) => {
                self.store.transition(
                    &claimed.id,
                    MessageStatus::Sending,
                    MessageStatus::Sent,
                    &|m| {
                        m.sent_at = Some(Utc::now());
                        m.provider_reference = receipt.provider_reference.clone();
                        m.last_error = None;
                    },
                )?;
                info!(
                    message_id = %claimed.id,
                    attempt = claimed.attempts,
                    ?elapsed,
                    sender = self.sender.name(),
                    "Message sent"
                );
                Ok(Outcome::Sent)
            }
            Err(e) => {
                let reason = e.to_string();
                self.store.transition(
                    &claimed.id,
                    MessageStatus::Sending,
                    MessageStatus::Failed,
                    &|m| m.last_error = Some(reason.clone()),
                )?;
                warn!(
                    message_id = %claimed.id,
                    attempt = claimed.attempts,
                    ?elapsed,
                    error = %e,
                    "Message delivery failed"
                );
                Ok(Outcome::Failed)
            }
        }
    }

    async fn deliver(&self, message: &ScheduledMessage) -> Result<SendReceipt, SendError> {
        match tokio::time::timeout(self.config.send_timeout, self.sender.send(message)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout(self.config.send_timeout)),
        }
    }
}
