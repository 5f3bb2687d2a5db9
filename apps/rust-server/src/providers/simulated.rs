// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider that only pretends to send.

use std::time::Duration;

use tracing::info;

use super::{MessageSender, SendError, SendReceipt};
use crate::models::ScheduledMessage;

/// Logs the message and reports success after `delay`.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSender {
    delay: Duration,
}

impl SimulatedSender {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl MessageSender for SimulatedSender {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn send(&self, message: &ScheduledMessage) -> Result<SendReceipt, SendError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        info!(
            message_id = %message.id,
            recipient = %message.recipient,
            length = message.message.chars().count(),
            "Simulated send"
        );

        Ok(SendReceipt {
            provider_reference: Some(format!("simulated-{}", uuid::Uuid::new_v4())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMessage;
    use chrono::Utc;

    #[tokio::test(start_paused = true)]
    async fn waits_for_configured_delay() {
        let sender = SimulatedSender::new(Duration::from_secs(2));
        let message = ScheduledMessage::new_pending(
            NewMessage {
                recipient: "lee".into(),
                phone_number: None,
                message: "hi".into(),
                scheduled_time: Utc::now(),
            },
            Utc::now(),
        );

        let started = tokio::time::Instant::now();
        let receipt = sender.send(&message).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(receipt
            .provider_reference
            .unwrap()
            .starts_with("simulated-"));
    }
}
