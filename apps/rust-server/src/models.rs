// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data Models
//!
//! The stored [`ScheduledMessage`] record, its [`MessageStatus`] state
//! machine, and the request/response structures used by the REST API.
//! API types derive `Serialize`, `Deserialize` and `ToSchema` for JSON
//! handling and OpenAPI documentation.
//!
//! ## Status State Machine
//!
//! ```text
//!            cancel                 claim               success
//!  cancelled <------ pending ----------------> sending ---------> sent
//!                      ^                          |
//!                      |  retry                   | error / timeout / interrupted
//!                      +------- failed <----------+
//! ```
//!
//! `sent` and `cancelled` are terminal.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::schedule::format_scheduled_time;

// =============================================================================
// Message Status
// =============================================================================

/// Delivery status of a scheduled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Waiting for its scheduled time.
    Pending,
    /// Claimed by the dispatcher, delivery in flight.
    Sending,
    /// Delivered successfully.
    Sent,
    /// Last delivery attempt failed. Can be retried.
    Failed,
    /// Cancelled by the user before delivery.
    Cancelled,
}

impl Default for MessageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 5] = [
        MessageStatus::Pending,
        MessageStatus::Sending,
        MessageStatus::Sent,
        MessageStatus::Failed,
        MessageStatus::Cancelled,
    ];

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Pending, MessageStatus::Sending)
                | (MessageStatus::Pending, MessageStatus::Cancelled)
                | (MessageStatus::Sending, MessageStatus::Sent)
                | (MessageStatus::Sending, MessageStatus::Failed)
                | (MessageStatus::Failed, MessageStatus::Pending)
        )
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Sent | MessageStatus::Cancelled)
    }

    /// Whether a message in this status may be deleted.
    pub fn is_deletable(self) -> bool {
        matches!(
            self,
            MessageStatus::Pending | MessageStatus::Failed | MessageStatus::Cancelled
        )
    }

    /// Wire name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
            MessageStatus::Cancelled => "cancelled",
        }
    }

    /// Human-facing label shown next to each message.
    pub fn label(self) -> &'static str {
        match self {
            MessageStatus::Pending => "대기중",
            MessageStatus::Sending => "발송중",
            MessageStatus::Sent => "발송완료",
            MessageStatus::Failed => "발송실패",
            MessageStatus::Cancelled => "취소됨",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown message status: {s}"))
    }
}

// =============================================================================
// Stored Message
// =============================================================================

/// A message scheduled for delivery, as persisted by the record store.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ScheduledMessage {
    /// Unique message identifier (UUID).
    pub id: String,
    /// Recipient name, phone number or KakaoTalk ID.
    pub recipient: String,
    /// Optional recipient phone number.
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Message text (NFC normalized).
    pub message: String,
    /// When the message becomes due.
    pub scheduled_time: DateTime<Utc>,
    /// Current delivery status.
    #[serde(default)]
    pub status: MessageStatus,
    /// Number of delivery attempts started.
    #[serde(default)]
    pub attempts: u32,
    /// Error reported by the most recent failed attempt.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Identifier returned by the messaging provider on success.
    #[serde(default)]
    pub provider_reference: Option<String>,
    /// When delivery was confirmed.
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// When this record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ScheduledMessage {
    /// Build a new pending message with a fresh id.
    pub fn new_pending(draft: NewMessage, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recipient: draft.recipient,
            phone_number: draft.phone_number,
            message: draft.message,
            scheduled_time: draft.scheduled_time,
            status: MessageStatus::Pending,
            attempts: 0,
            last_error: None,
            provider_reference: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Due means pending and scheduled at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == MessageStatus::Pending && self.scheduled_time <= now
    }
}

/// Validated input for a new message, produced by
/// [`validate_request`](crate::schedule::validate_request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub recipient: String,
    pub phone_number: Option<String>,
    pub message: String,
    pub scheduled_time: DateTime<Utc>,
}

// =============================================================================
// API Requests
// =============================================================================

/// Request to schedule a new message.
///
/// Date and time are submitted separately, as entered, and interpreted in
/// the service's configured UTC offset. Absent fields read as empty so
/// validation can report which one is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CreateMessageRequest {
    /// Recipient name, phone number or KakaoTalk ID.
    pub recipient: String,
    /// Optional phone number (digits and hyphens).
    pub phone_number: Option<String>,
    /// Message text, at most 200 characters.
    pub message: String,
    /// Date in `YYYY-MM-DD` format.
    pub scheduled_date: String,
    /// Time in `HH:MM` or `HH:MM:SS` format.
    pub scheduled_time: String,
}

/// Request to set or clear the KakaoTalk access token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateTokenRequest {
    /// Bearer token. `null` or empty clears the stored token.
    #[serde(default)]
    pub access_token: Option<String>,
}

// =============================================================================
// API Responses
// =============================================================================

/// A scheduled message as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct MessageResponse {
    pub id: String,
    pub recipient: String,
    pub phone_number: Option<String>,
    pub message: String,
    /// Character count of the message text.
    pub message_length: usize,
    pub scheduled_time: DateTime<Utc>,
    /// Scheduled time rendered in the service's offset.
    pub scheduled_time_display: String,
    pub status: MessageStatus,
    /// Human-facing status label.
    pub status_label: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub provider_reference: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageResponse {
    pub fn from_message(message: &ScheduledMessage, offset: FixedOffset) -> Self {
        Self {
            id: message.id.clone(),
            recipient: message.recipient.clone(),
            phone_number: message.phone_number.clone(),
            message: message.message.clone(),
            message_length: message.message.chars().count(),
            scheduled_time: message.scheduled_time,
            scheduled_time_display: format_scheduled_time(message.scheduled_time, offset),
            status: message.status,
            status_label: message.status.label().to_string(),
            attempts: message.attempts,
            last_error: message.last_error.clone(),
            provider_reference: message.provider_reference.clone(),
            sent_at: message.sent_at,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

/// Outcome of one dispatcher sweep.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SweepReport {
    /// Messages found due at the start of the sweep.
    pub due: usize,
    /// Messages delivered.
    pub sent: usize,
    /// Messages whose delivery failed.
    pub failed: usize,
    /// Messages skipped because they were already in flight or changed state.
    pub skipped: usize,
    /// Messages that hit a storage error while being processed.
    pub errors: usize,
}
