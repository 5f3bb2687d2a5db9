// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{error::ApiError, models::SweepReport, state::AppState};

/// Deliver everything that is due right now instead of waiting for the
/// next timer sweep.
#[utoipa::path(
    post,
    path = "/v1/dispatch",
    tag = "Dispatch",
    responses((status = 200, body = SweepReport))
)]
pub async fn dispatch_due(State(state): State<AppState>) -> Result<Json<SweepReport>, ApiError> {
    let report = state.dispatcher.dispatch_now().await?;
    Ok(Json(report))
}
