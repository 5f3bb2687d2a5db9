// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use chrono::FixedOffset;

use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::providers::{Sender, SimulatedSender};
use crate::schedule::default_offset;
use crate::storage::{LocalMessageStore, MessageStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MessageStore>,
    pub dispatcher: Arc<Dispatcher<Sender>>,
    /// Offset used to read submitted dates and render scheduled times.
    pub utc_offset: FixedOffset,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MessageStore>,
        dispatcher: Arc<Dispatcher<Sender>>,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            dispatcher,
            utc_offset,
        }
    }

    /// State around `store` with a simulated sender and default settings.
    pub fn with_store(store: Arc<dyn MessageStore>) -> Self {
        let dispatcher = Dispatcher::new(
            store.clone(),
            Sender::Simulated(SimulatedSender::default()),
            DispatcherConfig::default(),
        );
        Self::new(store, Arc::new(dispatcher), default_offset())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_store(Arc::new(LocalMessageStore::in_memory()))
    }
}
