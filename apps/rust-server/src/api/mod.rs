// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        CreateMessageRequest, MessageResponse, MessageStatus, SweepReport, UpdateTokenRequest,
    },
    state::AppState,
};

pub mod dispatch;
pub mod health;
pub mod messages;
pub mod settings;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/messages",
            get(messages::list_messages).post(messages::create_message),
        )
        .route(
            "/messages/{id}",
            get(messages::get_message).delete(messages::delete_message),
        )
        .route("/messages/{id}/cancel", post(messages::cancel_message))
        .route("/messages/{id}/retry", post(messages::retry_message))
        .route("/dispatch", post(dispatch::dispatch_due))
        .route("/settings/kakao-token", put(settings::update_kakao_token))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        messages::list_messages,
        messages::create_message,
        messages::get_message,
        messages::delete_message,
        messages::cancel_message,
        messages::retry_message,
        dispatch::dispatch_due,
        settings::update_kakao_token,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            MessageResponse,
            MessageStatus,
            CreateMessageRequest,
            UpdateTokenRequest,
            SweepReport,
            settings::TokenStatusResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Messages", description = "Scheduled KakaoTalk messages"),
        (name = "Dispatch", description = "Manual delivery of due messages"),
        (name = "Settings", description = "Sender credentials"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
