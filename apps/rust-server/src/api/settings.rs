// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    error::ApiError, models::UpdateTokenRequest, providers::MessageSender, state::AppState,
};

/// Token state after an update. The token itself is never echoed back.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TokenStatusResponse {
    /// Active sender (`kakao`).
    pub sender: String,
    /// Whether a non-empty token is now configured.
    pub configured: bool,
}

#[utoipa::path(
    put,
    path = "/v1/settings/kakao-token",
    request_body = UpdateTokenRequest,
    tag = "Settings",
    responses(
        (status = 200, body = TokenStatusResponse),
        (status = 400, description = "Active sender does not use an access token")
    )
)]
pub async fn update_kakao_token(
    State(state): State<AppState>,
    Json(request): Json<UpdateTokenRequest>,
) -> Result<Json<TokenStatusResponse>, ApiError> {
    let sender = state.dispatcher.sender();
    if !sender.set_access_token(request.access_token) {
        return Err(ApiError::bad_request(format!(
            "sender '{}' does not use an access token",
            sender.name()
        )));
    }

    let configured = sender.has_access_token().unwrap_or(false);
    info!(configured, "KakaoTalk access token updated");

    Ok(Json(TokenStatusResponse {
        sender: sender.name().to_string(),
        configured,
    }))
}
