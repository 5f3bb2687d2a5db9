// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Message Storage
//!
//! Scheduled messages are kept in a [`MessageStore`]. The only contract with
//! a backend is "create, read, update or delete a record", plus an atomic
//! status [`transition`](MessageStore::transition) that acts as the
//! storage-level guard against processing a message twice.
//!
//! ## Backends
//!
//! - [`LocalMessageStore`]: the whole message list serialized to a JSON
//!   string under one key of a [`LocalStorage`] key/value file.
//! - [`RecordMessageStore`]: one row per message in an embedded redb table.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   local_storage.json   # LocalStorage key/value map
//!   messages.redb        # RecordMessageStore database
//! ```

pub mod local;
pub mod paths;
pub mod records;

use std::io;

use chrono::{DateTime, Utc};

use crate::models::{MessageStatus, ScheduledMessage};

pub use local::{LocalMessageStore, LocalStorage};
pub use paths::StoragePaths;
pub use records::RecordMessageStore;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("message {id} is {actual}, expected {expected}")]
    StatusConflict {
        id: String,
        expected: MessageStatus,
        actual: MessageStatus,
    },

    #[error("cannot move a message from {from} to {to}")]
    InvalidTransition {
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("message {id} is {status} and cannot be deleted")]
    DeleteRejected { id: String, status: MessageStatus },

    #[error("storage lock poisoned")]
    LockPoisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Store Trait
// =============================================================================

/// Record store for scheduled messages.
pub trait MessageStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Insert a new message. Fails with `AlreadyExists` on a duplicate id.
    fn create(&self, message: &ScheduledMessage) -> StorageResult<()>;

    /// Fetch a message by id.
    fn get(&self, id: &str) -> StorageResult<ScheduledMessage>;

    /// Replace an existing message.
    fn update(&self, message: &ScheduledMessage) -> StorageResult<()>;

    /// Remove a message.
    fn delete(&self, id: &str) -> StorageResult<()>;

    /// Remove a message only if `allowed` accepts its current status. The
    /// check and the removal happen in one step, so a concurrent claim
    /// cannot slip in between.
    ///
    /// Fails with `DeleteRejected` when `allowed` returns false.
    fn delete_if(&self, id: &str, allowed: &dyn Fn(MessageStatus) -> bool) -> StorageResult<()>;

    /// All messages, earliest schedule first.
    fn list(&self) -> StorageResult<Vec<ScheduledMessage>>;

    /// Atomically move message `id` from `from` to `to`, applying `mutate`
    /// to the record in the same step.
    ///
    /// Fails with `StatusConflict` when the stored status is not `from`.
    fn transition(
        &self,
        id: &str,
        from: MessageStatus,
        to: MessageStatus,
        mutate: &dyn Fn(&mut ScheduledMessage),
    ) -> StorageResult<ScheduledMessage>;

    /// Verify the backend is reachable.
    fn health_check(&self) -> StorageResult<()>;

    /// Messages due at `now`, earliest schedule first.
    fn list_due(&self, now: DateTime<Utc>) -> StorageResult<Vec<ScheduledMessage>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|message| message.is_due(now))
            .collect())
    }

    /// Messages currently in `status`, earliest schedule first.
    fn list_by_status(&self, status: MessageStatus) -> StorageResult<Vec<ScheduledMessage>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|message| message.status == status)
            .collect())
    }
}

/// Order messages by schedule, then creation time, then id.
pub(crate) fn sort_messages(messages: &mut [ScheduledMessage]) {
    messages.sort_by(|a, b| {
        a.scheduled_time
            .cmp(&b.scheduled_time)
            .then(a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Shared compare-and-set logic for [`MessageStore::transition`].
pub(crate) fn apply_transition(
    message: &mut ScheduledMessage,
    from: MessageStatus,
    to: MessageStatus,
    mutate: &dyn Fn(&mut ScheduledMessage),
) -> StorageResult<()> {
    if !from.can_transition_to(to) {
        return Err(StorageError::InvalidTransition { from, to });
    }
    if message.status != from {
        return Err(StorageError::StatusConflict {
            id: message.id.clone(),
            expected: from,
            actual: message.status,
        });
    }

    message.status = to;
    message.updated_at = Utc::now();
    mutate(message);
    Ok(())
}

/// Shared status check for [`MessageStore::delete_if`].
pub(crate) fn check_delete(
    message: &ScheduledMessage,
    allowed: &dyn Fn(MessageStatus) -> bool,
) -> StorageResult<()> {
    if allowed(message.status) {
        Ok(())
    } else {
        Err(StorageError::DeleteRejected {
            id: message.id.clone(),
            status: message.status,
        })
    }
}

/// Backend-independent behaviour every [`MessageStore`] must show.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::models::NewMessage;
    use chrono::Duration;

    pub fn message_at(offset_minutes: i64) -> ScheduledMessage {
        let now = Utc::now();
        ScheduledMessage::new_pending(
            NewMessage {
                recipient: format!("recipient {offset_minutes}"),
                phone_number: None,
                message: "테스트 메시지".to_string(),
                scheduled_time: now + Duration::minutes(offset_minutes),
            },
            now,
        )
    }

    pub fn crud_round_trip(store: &dyn MessageStore) {
        let message = message_at(10);
        store.create(&message).unwrap();
        assert_eq!(store.get(&message.id).unwrap(), message);

        assert!(matches!(
            store.create(&message),
            Err(StorageError::AlreadyExists(_))
        ));

        let mut edited = message.clone();
        edited.message = "수정됨".to_string();
        store.update(&edited).unwrap();
        assert_eq!(store.get(&message.id).unwrap().message, "수정됨");

        store.delete(&message.id).unwrap();
        assert!(matches!(
            store.get(&message.id),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&message.id),
            Err(StorageError::NotFound(_))
        ));

        let ghost = message_at(5);
        assert!(matches!(
            store.update(&ghost),
            Err(StorageError::NotFound(_))
        ));
    }

    pub fn list_is_ordered_and_due_filters(store: &dyn MessageStore) {
        let later = message_at(30);
        let past = message_at(-5);
        let earlier_past = message_at(-10);
        for message in [&later, &past, &earlier_past] {
            store.create(message).unwrap();
        }

        let ids: Vec<_> = store.list().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![earlier_past.id.clone(), past.id.clone(), later.id.clone()]);

        let due: Vec<_> = store
            .list_due(Utc::now())
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(due, vec![earlier_past.id.clone(), past.id.clone()]);

        store
            .transition(&past.id, MessageStatus::Pending, MessageStatus::Cancelled, &|_| {})
            .unwrap();
        let due = store.list_due(Utc::now()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(
            store.list_by_status(MessageStatus::Cancelled).unwrap()[0].id,
            past.id
        );
    }

    pub fn delete_if_checks_status_in_the_same_step(store: &dyn MessageStore) {
        let in_flight = message_at(-1);
        let cancelled = message_at(5);
        store.create(&in_flight).unwrap();
        store.create(&cancelled).unwrap();
        store
            .transition(&in_flight.id, MessageStatus::Pending, MessageStatus::Sending, &|_| {})
            .unwrap();
        store
            .transition(&cancelled.id, MessageStatus::Pending, MessageStatus::Cancelled, &|_| {})
            .unwrap();

        match store.delete_if(&in_flight.id, &MessageStatus::is_deletable) {
            Err(StorageError::DeleteRejected { status, .. }) => {
                assert_eq!(status, MessageStatus::Sending)
            }
            other => panic!("expected rejected delete, got {other:?}"),
        }
        assert_eq!(store.get(&in_flight.id).unwrap().status, MessageStatus::Sending);

        store
            .delete_if(&cancelled.id, &MessageStatus::is_deletable)
            .unwrap();
        assert!(matches!(
            store.get(&cancelled.id),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_if("missing", &|_| true),
            Err(StorageError::NotFound(_))
        ));
    }

    pub fn transition_is_compare_and_set(store: &dyn MessageStore) {
        let message = message_at(-1);
        store.create(&message).unwrap();

        let claimed = store
            .transition(&message.id, MessageStatus::Pending, MessageStatus::Sending, &|m| {
                m.attempts += 1
            })
            .unwrap();
        assert_eq!(claimed.status, MessageStatus::Sending);
        assert_eq!(claimed.attempts, 1);
        assert_eq!(store.get(&message.id).unwrap(), claimed);

        // A second claim loses the race.
        match store.transition(&message.id, MessageStatus::Pending, MessageStatus::Sending, &|_| {}) {
            Err(StorageError::StatusConflict { actual, .. }) => {
                assert_eq!(actual, MessageStatus::Sending)
            }
            other => panic!("expected status conflict, got {other:?}"),
        }

        // Illegal edges are rejected before touching the record.
        assert!(matches!(
            store.transition(&message.id, MessageStatus::Sending, MessageStatus::Pending, &|_| {}),
            Err(StorageError::InvalidTransition { .. })
        ));
        assert_eq!(store.get(&message.id).unwrap().status, MessageStatus::Sending);

        assert!(matches!(
            store.transition("missing", MessageStatus::Pending, MessageStatus::Sending, &|_| {}),
            Err(StorageError::NotFound(_))
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_transition_sets_status_and_runs_mutation() {
        let mut message = conformance::message_at(0);
        let before = message.updated_at;
        apply_transition(
            &mut message,
            MessageStatus::Pending,
            MessageStatus::Sending,
            &|m| m.attempts = 7,
        )
        .unwrap();
        assert_eq!(message.status, MessageStatus::Sending);
        assert_eq!(message.attempts, 7);
        assert!(message.updated_at >= before);
    }

    #[test]
    fn apply_transition_leaves_record_untouched_on_conflict() {
        let mut message = conformance::message_at(0);
        message.status = MessageStatus::Sent;
        let snapshot = message.clone();
        let result = apply_transition(
            &mut message,
            MessageStatus::Failed,
            MessageStatus::Pending,
            &|m| m.attempts = 99,
        );
        assert!(matches!(result, Err(StorageError::StatusConflict { .. })));
        assert_eq!(message, snapshot);
    }

    #[test]
    fn sort_breaks_ties_by_creation() {
        let mut a = conformance::message_at(1);
        let mut b = a.clone();
        b.id = "b".into();
        a.id = "a".into();
        b.created_at = a.created_at - chrono::Duration::seconds(1);
        let mut list = vec![a.clone(), b.clone()];
        sort_messages(&mut list);
        assert_eq!(list[0].id, "b");
    }
}
