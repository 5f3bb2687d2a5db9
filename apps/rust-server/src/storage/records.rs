// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded record store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `scheduled_messages`: message id → serialized ScheduledMessage (JSON bytes)
//!
//! Each status transition runs inside a single write transaction, so a
//! claim either fully happens or not at all.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{apply_transition, check_delete, sort_messages, MessageStore, StorageError, StorageResult};
use crate::models::{MessageStatus, ScheduledMessage};

/// Primary table: message id → serialized ScheduledMessage (JSON bytes).
const MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("scheduled_messages");

/// Row-per-message store in an embedded database file.
pub struct RecordMessageStore {
    db: Database,
}

impl RecordMessageStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(MESSAGES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    fn not_found(id: &str) -> StorageError {
        StorageError::NotFound(format!("Scheduled message {id}"))
    }
}

impl MessageStore for RecordMessageStore {
    fn backend(&self) -> &'static str {
        "records"
    }

    fn create(&self, message: &ScheduledMessage) -> StorageResult<()> {
        let json = serde_json::to_vec(message)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MESSAGES)?;
            if table.get(message.id.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!(
                    "Scheduled message {}",
                    message.id
                )));
            }
            table.insert(message.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, id: &str) -> StorageResult<ScheduledMessage> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MESSAGES)?;
        match table.get(id)? {
            Some(value) => Ok(serde_json::from_slice(value.value())?),
            None => Err(Self::not_found(id)),
        }
    }

    fn update(&self, message: &ScheduledMessage) -> StorageResult<()> {
        let json = serde_json::to_vec(message)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MESSAGES)?;
            if table.get(message.id.as_str())?.is_none() {
                return Err(Self::not_found(&message.id));
            }
            table.insert(message.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete(&self, id: &str) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MESSAGES)?;
            if table.remove(id)?.is_none() {
                return Err(Self::not_found(id));
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_if(&self, id: &str, allowed: &dyn Fn(MessageStatus) -> bool) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(MESSAGES)?;
            let existing_bytes = {
                let existing = table.get(id)?.ok_or_else(|| Self::not_found(id))?;
                existing.value().to_vec()
            };
            let message: ScheduledMessage = serde_json::from_slice(&existing_bytes)?;
            check_delete(&message, allowed)?;
            table.remove(id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<ScheduledMessage>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MESSAGES)?;

        let mut messages = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            messages.push(serde_json::from_slice::<ScheduledMessage>(value.value())?);
        }
        sort_messages(&mut messages);
        Ok(messages)
    }

    fn transition(
        &self,
        id: &str,
        from: MessageStatus,
        to: MessageStatus,
        mutate: &dyn Fn(&mut ScheduledMessage),
    ) -> StorageResult<ScheduledMessage> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(MESSAGES)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = {
                let existing = table.get(id)?.ok_or_else(|| Self::not_found(id))?;
                existing.value().to_vec()
            };

            let mut message: ScheduledMessage = serde_json::from_slice(&existing_bytes)?;
            apply_transition(&mut message, from, to, mutate)?;

            let json = serde_json::to_vec(&message)?;
            table.insert(id, json.as_slice())?;
            message
        };
        write_txn.commit()?;
        Ok(updated)
    }

    fn health_check(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(MESSAGES)?;
        Ok(())
    }
}
