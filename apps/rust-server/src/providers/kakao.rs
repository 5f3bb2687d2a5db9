// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! KakaoTalk "send to me" memo API.
//!
//! `POST {base}/v2/api/talk/memo/default/send` with a bearer token and a
//! form-encoded `template_object` holding a text template. Kakao answers
//! `{"result_code": 0}` on success.

use std::sync::RwLock;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{http_client, MessageSender, SendError, SendReceipt};
use crate::models::ScheduledMessage;

pub const DEFAULT_API_BASE_URL: &str = "https://kapi.kakao.com";
pub const DEFAULT_LINK_URL: &str = "https://developers.kakao.com";
const MEMO_SEND_PATH: &str = "/v2/api/talk/memo/default/send";
const BUTTON_TITLE: &str = "확인";

#[derive(Debug, Deserialize)]
struct MemoResponse {
    result_code: i64,
}

#[derive(Debug, Deserialize)]
struct KakaoErrorBody {
    msg: Option<String>,
    code: Option<i64>,
}

pub struct KakaoClient {
    api_base_url: String,
    link_url: String,
    access_token: RwLock<Option<String>>,
    timeout: Duration,
    http: Client,
}

impl KakaoClient {
    pub fn new(
        api_base_url: &str,
        link_url: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SendError> {
        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            link_url: link_url.to_string(),
            access_token: RwLock::new(normalize_token(access_token)),
            timeout,
            http: http_client(timeout)?,
        })
    }

    pub fn set_access_token(&self, token: Option<String>) {
        let token = normalize_token(token);
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    pub fn has_access_token(&self) -> bool {
        self.current_token().is_some()
    }

    fn current_token(&self) -> Option<String> {
        match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn template_object(&self, message: &ScheduledMessage) -> Value {
        json!({
            "object_type": "text",
            "text": message.message,
            "link": {
                "web_url": self.link_url,
                "mobile_web_url": self.link_url,
            },
            "button_title": BUTTON_TITLE,
        })
    }
}

impl MessageSender for KakaoClient {
    fn name(&self) -> &'static str {
        "kakao"
    }

    async fn send(&self, message: &ScheduledMessage) -> Result<SendReceipt, SendError> {
        let token = self.current_token().ok_or(SendError::MissingToken)?;
        let template = self.template_object(message).to_string();

        debug!(message_id = %message.id, "Sending KakaoTalk memo");

        let response = self
            .http
            .post(format!("{}{}", self.api_base_url, MEMO_SEND_PATH))
            .bearer_auth(token)
            .form(&[("template_object", template.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Timeout(self.timeout)
                } else {
                    SendError::Transport(format!("memo send failed: {e}"))
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            warn!(message_id = %message.id, "KakaoTalk rejected the access token");
            return Err(SendError::Unauthorized(error_message(&body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let memo: MemoResponse = response
            .json()
            .await
            .map_err(|e| SendError::InvalidResponse(format!("memo send invalid JSON: {e}")))?;

        if memo.result_code != 0 {
            return Err(SendError::Provider(format!(
                "result_code {}",
                memo.result_code
            )));
        }

        Ok(SendReceipt::default())
    }
}

fn normalize_token(token: Option<String>) -> Option<String> {
    token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Pull `msg` out of a Kakao error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<KakaoErrorBody>(body) {
        Ok(KakaoErrorBody {
            msg: Some(msg),
            code,
        }) => match code {
            Some(code) => format!("{msg} (code {code})"),
            None => msg,
        },
        _ => body.to_string(),
    }
}
