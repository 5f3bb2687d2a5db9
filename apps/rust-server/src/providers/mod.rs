// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Messaging providers.
//!
//! The dispatcher only needs "POST text, get 2xx or error", expressed as the
//! [`MessageSender`] trait. [`Sender`] is the runtime choice between the
//! concrete providers.

pub mod kakao;
pub mod relay;
pub mod simulated;

use std::future::Future;
use std::time::Duration;

use crate::models::ScheduledMessage;

pub use kakao::KakaoClient;
pub use relay::RelayClient;
pub use simulated::SimulatedSender;

/// Proof of a successful delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider-side identifier, when the provider returns one.
    pub provider_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("KakaoTalk access token is not configured")]
    MissingToken,

    #[error("access token was rejected: {0}")]
    Unauthorized(String),

    #[error("provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("provider reported failure: {0}")]
    Provider(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("provider response was invalid: {0}")]
    InvalidResponse(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider configuration invalid: {0}")]
    Config(String),
}

/// Something that can deliver a scheduled message.
pub trait MessageSender: Send + Sync {
    /// Short provider name for logs and health output.
    fn name(&self) -> &'static str;

    /// Deliver `message`. Any `Err` marks the attempt as failed.
    fn send(
        &self,
        message: &ScheduledMessage,
    ) -> impl Future<Output = Result<SendReceipt, SendError>> + Send;
}

/// The configured provider.
pub enum Sender {
    Simulated(SimulatedSender),
    Kakao(KakaoClient),
    Relay(RelayClient),
}

impl Sender {
    /// Replace the bearer token used by the Kakao provider.
    ///
    /// Returns `false` when the active provider does not use a token.
    pub fn set_access_token(&self, token: Option<String>) -> bool {
        match self {
            Sender::Kakao(client) => {
                client.set_access_token(token);
                true
            }
            Sender::Simulated(_) | Sender::Relay(_) => false,
        }
    }

    /// Whether a token is configured, or `None` if the provider needs none.
    pub fn has_access_token(&self) -> Option<bool> {
        match self {
            Sender::Kakao(client) => Some(client.has_access_token()),
            Sender::Simulated(_) | Sender::Relay(_) => None,
        }
    }
}

impl MessageSender for Sender {
    fn name(&self) -> &'static str {
        match self {
            Sender::Simulated(sender) => sender.name(),
            Sender::Kakao(client) => client.name(),
            Sender::Relay(client) => client.name(),
        }
    }

    async fn send(&self, message: &ScheduledMessage) -> Result<SendReceipt, SendError> {
        match self {
            Sender::Simulated(sender) => sender.send(message).await,
            Sender::Kakao(client) => client.send(message).await,
            Sender::Relay(client) => client.send(message).await,
        }
    }
}

/// Build the shared HTTP client used by the HTTP providers.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, SendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SendError::Config(format!("failed to build HTTP client: {e}")))
}

/// Local HTTP server standing in for a provider endpoint.
#[cfg(test)]
pub(crate) async fn spawn_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
