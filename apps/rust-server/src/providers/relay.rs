// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay backend that forwards messages to KakaoTalk on our behalf.
//!
//! `POST {base}/kakao/send` with `{"recipient", "message"}`; the relay answers
//! `{"success": bool, "message"?: string, "error"?: string}`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{http_client, MessageSender, SendError, SendReceipt};
use crate::models::ScheduledMessage;

pub const DEFAULT_RELAY_BASE_URL: &str = "http://localhost:3000/api";
const SEND_PATH: &str = "/kakao/send";

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    recipient: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct RelayClient {
    base_url: String,
    timeout: Duration,
    http: Client,
}

impl RelayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SendError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            http: http_client(timeout)?,
        })
    }
}

impl MessageSender for RelayClient {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn send(&self, message: &ScheduledMessage) -> Result<SendReceipt, SendError> {
        debug!(message_id = %message.id, "Forwarding message to relay");

        let response = self
            .http
            .post(format!("{}{}", self.base_url, SEND_PATH))
            .json(&RelayRequest {
                recipient: &message.recipient,
                message: &message.message,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Timeout(self.timeout)
                } else {
                    SendError::Transport(format!("relay request failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let relay: RelayResponse = response
            .json()
            .await
            .map_err(|e| SendError::InvalidResponse(format!("relay invalid JSON: {e}")))?;

        if !relay.success {
            return Err(SendError::Provider(
                relay
                    .error
                    .unwrap_or_else(|| "relay reported failure".to_string()),
            ));
        }

        Ok(SendReceipt {
            provider_reference: relay.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMessage;
    use crate::providers::spawn_stub;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::Utc;
    use serde_json::{json, Value};

    fn message(recipient: &str) -> ScheduledMessage {
        ScheduledMessage::new_pending(
            NewMessage {
                recipient: recipient.into(),
                phone_number: None,
                message: "회의 10분 전입니다".into(),
                scheduled_time: Utc::now(),
            },
            Utc::now(),
        )
    }

    async fn relay_stub(Json(body): Json<Value>) -> (axum::http::StatusCode, Json<Value>) {
        assert_eq!(body["message"], "회의 10분 전입니다");
        match body["recipient"].as_str() {
            Some("nobody") => (
                axum::http::StatusCode::OK,
                Json(json!({"success": false, "error": "unknown recipient"})),
            ),
            Some("crash") => (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false})),
            ),
            _ => (
                axum::http::StatusCode::OK,
                Json(json!({"success": true, "message": "queued"})),
            ),
        }
    }

    async fn client() -> RelayClient {
        let base = spawn_stub(Router::new().route("/api/kakao/send", post(relay_stub))).await;
        RelayClient::new(&format!("{base}/api/"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn success_returns_relay_message_as_reference() {
        let receipt = client().await.send(&message("kim")).await.unwrap();
        assert_eq!(receipt.provider_reference.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn unsuccessful_body_is_provider_error() {
        assert_eq!(
            client().await.send(&message("nobody")).await,
            Err(SendError::Provider("unknown recipient".into()))
        );
    }

    #[tokio::test]
    async fn server_error_is_rejected() {
        let err = client().await.send(&message("crash")).await.unwrap_err();
        assert!(matches!(err, SendError::Rejected { status: 500, .. }));
    }

    #[tokio::test]
    async fn unreachable_relay_is_transport_error() {
        let client = RelayClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.send(&message("kim")).await.unwrap_err();
        assert!(matches!(
            err,
            SendError::Transport(_) | SendError::Timeout(_)
        ));
    }
}
