// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup wiring: turn an [`AppConfig`] into a ready [`AppState`].

use std::sync::Arc;

use tracing::info;

use crate::config::{AppConfig, SenderKind, StorageBackend};
use crate::dispatcher::Dispatcher;
use crate::providers::{KakaoClient, RelayClient, SendError, Sender, SimulatedSender};
use crate::state::AppState;
use crate::storage::{
    LocalMessageStore, MessageStore, RecordMessageStore, StorageError, StoragePaths,
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open message store: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to set up sender: {0}")]
    Sender(#[from] SendError),
}

pub fn open_store(config: &AppConfig) -> Result<Arc<dyn MessageStore>, StorageError> {
    let paths = StoragePaths::new(&config.data_dir);
    let store: Arc<dyn MessageStore> = match config.storage_backend {
        StorageBackend::Local => Arc::new(LocalMessageStore::open(paths.local_storage_file())?),
        StorageBackend::Records => Arc::new(RecordMessageStore::open(&paths.records_db())?),
    };
    info!(
        backend = store.backend(),
        data_dir = %paths.root().display(),
        "Message store opened"
    );
    Ok(store)
}

pub fn build_sender(config: &AppConfig) -> Result<Sender, SendError> {
    let sender = match config.sender {
        SenderKind::Simulated => Sender::Simulated(SimulatedSender::new(config.simulated_send_delay)),
        SenderKind::Kakao => Sender::Kakao(KakaoClient::new(
            &config.kakao_api_base_url,
            &config.kakao_link_url,
            config.kakao_access_token.clone(),
            config.send_timeout,
        )?),
        SenderKind::Relay => Sender::Relay(RelayClient::new(
            &config.relay_base_url,
            config.send_timeout,
        )?),
    };
    Ok(sender)
}

/// Open the store, build the sender and move interrupted deliveries to
/// `failed`.
pub fn build_state(config: &AppConfig) -> Result<AppState, StartupError> {
    let store = open_store(config)?;
    let sender = build_sender(config)?;
    let dispatcher = Dispatcher::new(store.clone(), sender, config.dispatcher());

    let recovered = dispatcher.recover_interrupted()?;
    if recovered > 0 {
        info!(recovered, "Recovered interrupted deliveries");
    }

    Ok(AppState::new(store, Arc::new(dispatcher), config.utc_offset))
}
