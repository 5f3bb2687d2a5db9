// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key/value "local storage" and the message store built on it.
//!
//! [`LocalStorage`] is a string→string map persisted as a single JSON file
//! (atomic write via rename). [`LocalMessageStore`] keeps the entire message
//! list as one JSON string under [`MESSAGES_KEY`], so every mutation is a
//! read-modify-write of the whole array under one lock.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{apply_transition, check_delete, sort_messages, MessageStore, StorageError, StorageResult};
use crate::models::{MessageStatus, ScheduledMessage};

/// Key under which the serialized message array is stored.
pub const MESSAGES_KEY: &str = "kakao_scheduled_messages";

/// String key/value store, optionally persisted to a file.
#[derive(Debug, Default)]
pub struct LocalStorage {
    path: Option<PathBuf>,
    items: BTreeMap<String, String>,
}

impl LocalStorage {
    /// Non-persistent storage, lost when dropped.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create) storage backed by the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let items = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            items,
        })
    }

    /// Backing file, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get_item(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    /// Set `key` to `value`. The in-memory map only changes once the file
    /// write has succeeded.
    pub fn set_item(&mut self, key: &str, value: impl Into<String>) -> StorageResult<()> {
        let mut next = self.items.clone();
        next.insert(key.to_string(), value.into());
        self.persist(&next)?;
        self.items = next;
        Ok(())
    }

    pub fn remove_item(&mut self, key: &str) -> StorageResult<()> {
        if !self.items.contains_key(key) {
            return Ok(());
        }
        let mut next = self.items.clone();
        next.remove(key);
        self.persist(&next)?;
        self.items = next;
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, items)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

/// Message store that serializes the whole list into [`LocalStorage`].
#[derive(Debug)]
pub struct LocalMessageStore {
    storage: Mutex<LocalStorage>,
}

impl LocalMessageStore {
    pub fn new(storage: LocalStorage) -> Self {
        Self {
            storage: Mutex::new(storage),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(LocalStorage::in_memory())
    }

    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::new(LocalStorage::open(path)?))
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, LocalStorage>> {
        self.storage.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn load(storage: &LocalStorage) -> StorageResult<Vec<ScheduledMessage>> {
        match storage.get_item(MESSAGES_KEY) {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(storage: &mut LocalStorage, messages: &[ScheduledMessage]) -> StorageResult<()> {
        let json = serde_json::to_string(messages)?;
        storage.set_item(MESSAGES_KEY, json)
    }

    fn not_found(id: &str) -> StorageError {
        StorageError::NotFound(format!("Scheduled message {id}"))
    }
}

impl MessageStore for LocalMessageStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    fn create(&self, message: &ScheduledMessage) -> StorageResult<()> {
        let mut storage = self.lock()?;
        let mut messages = Self::load(&storage)?;
        if messages.iter().any(|m| m.id == message.id) {
            return Err(StorageError::AlreadyExists(format!(
                "Scheduled message {}",
                message.id
            )));
        }
        messages.push(message.clone());
        Self::save(&mut storage, &messages)
    }

    fn get(&self, id: &str) -> StorageResult<ScheduledMessage> {
        let storage = self.lock()?;
        Self::load(&storage)?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Self::not_found(id))
    }

    fn update(&self, message: &ScheduledMessage) -> StorageResult<()> {
        let mut storage = self.lock()?;
        let mut messages = Self::load(&storage)?;
        let slot = messages
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or_else(|| Self::not_found(&message.id))?;
        *slot = message.clone();
        Self::save(&mut storage, &messages)
    }

    fn delete(&self, id: &str) -> StorageResult<()> {
        let mut storage = self.lock()?;
        let mut messages = Self::load(&storage)?;
        let before = messages.len();
        messages.retain(|m| m.id != id);
        if messages.len() == before {
            return Err(Self::not_found(id));
        }
        Self::save(&mut storage, &messages)
    }

    fn delete_if(&self, id: &str, allowed: &dyn Fn(MessageStatus) -> bool) -> StorageResult<()> {
        let mut storage = self.lock()?;
        let mut messages = Self::load(&storage)?;
        let position = messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        check_delete(&messages[position], allowed)?;
        messages.remove(position);
        Self::save(&mut storage, &messages)
    }

    fn list(&self) -> StorageResult<Vec<ScheduledMessage>> {
        let storage = self.lock()?;
        let mut messages = Self::load(&storage)?;
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
        let mut storage = self.lock()?;
        let mut messages = Self::load(&storage)?;
        let slot = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Self::not_found(id))?;

        let mut updated = slot.clone();
        apply_transition(&mut updated, from, to, mutate)?;
        *slot = updated.clone();

        Self::save(&mut storage, &messages)?;
        Ok(updated)
    }

    fn health_check(&self) -> StorageResult<()> {
        let storage = self.lock()?;
        Self::load(&storage)?;
        if let Some(parent) = storage.path().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(StorageError::NotFound(format!(
                    "storage directory {}",
                    parent.display()
                )));
            }
        }
        Ok(())
    }
}
