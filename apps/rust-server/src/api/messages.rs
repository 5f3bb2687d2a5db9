// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

use crate::{
    error::ApiError,
    models::{CreateMessageRequest, MessageResponse, MessageStatus, ScheduledMessage},
    schedule::validate_request,
    state::AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListMessagesQuery {
    /// Only return messages in this status (`pending`, `sending`, `sent`,
    /// `failed` or `cancelled`).
    pub status: Option<String>,
}

fn respond(state: &AppState, message: &ScheduledMessage) -> Json<MessageResponse> {
    Json(MessageResponse::from_message(message, state.utc_offset))
}

#[utoipa::path(
    get,
    path = "/v1/messages",
    params(ListMessagesQuery),
    tag = "Messages",
    responses(
        (status = 200, body = [MessageResponse]),
        (status = 400, description = "Unknown status filter")
    )
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<ListMessagesQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let messages = match params.status.as_deref().map(str::trim) {
        None | Some("") => state.store.list()?,
        Some(raw) => {
            let status: MessageStatus = raw.parse().map_err(ApiError::bad_request)?;
            state.store.list_by_status(status)?
        }
    };

    Ok(Json(
        messages
            .iter()
            .map(|m| MessageResponse::from_message(m, state.utc_offset))
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/messages",
    request_body = CreateMessageRequest,
    tag = "Messages",
    responses(
        (status = 201, body = MessageResponse),
        (status = 400, description = "Missing or malformed field"),
        (status = 422, description = "Message too long or not scheduled in the future")
    )
)]
pub async fn create_message(
    State(state): State<AppState>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(request) = payload?;
    let now = Utc::now();
    let draft = validate_request(&request, now, state.utc_offset)?;
    let message = ScheduledMessage::new_pending(draft, now);
    state.store.create(&message)?;

    info!(
        message_id = %message.id,
        scheduled_time = %message.scheduled_time,
        "Scheduled message created"
    );

    Ok((StatusCode::CREATED, respond(&state, &message)))
}

#[utoipa::path(
    get,
    path = "/v1/messages/{id}",
    params(("id" = String, Path, description = "Message identifier")),
    tag = "Messages",
    responses(
        (status = 200, body = MessageResponse),
        (status = 404, description = "Message not found")
    )
)]
pub async fn get_message(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state.store.get(&id)?;
    Ok(respond(&state, &message))
}

#[utoipa::path(
    delete,
    path = "/v1/messages/{id}",
    params(("id" = String, Path, description = "Message identifier")),
    tag = "Messages",
    responses(
        (status = 204),
        (status = 404, description = "Message not found"),
        (status = 409, description = "Message is being sent or was already sent")
    )
)]
pub async fn delete_message(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_if(&id, &MessageStatus::is_deletable)?;
    info!(message_id = %id, "Scheduled message deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/messages/{id}/cancel",
    params(("id" = String, Path, description = "Message identifier")),
    tag = "Messages",
    responses(
        (status = 200, body = MessageResponse),
        (status = 404, description = "Message not found"),
        (status = 409, description = "Message is no longer pending")
    )
)]
pub async fn cancel_message(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state.store.transition(
        &id,
        MessageStatus::Pending,
        MessageStatus::Cancelled,
        &|_| {},
    )?;
    info!(message_id = %id, "Scheduled message cancelled");
    Ok(respond(&state, &message))
}

#[utoipa::path(
    post,
    path = "/v1/messages/{id}/retry",
    params(("id" = String, Path, description = "Message identifier")),
    tag = "Messages",
    responses(
        (status = 200, body = MessageResponse),
        (status = 404, description = "Message not found"),
        (status = 409, description = "Message has not failed")
    )
)]
pub async fn retry_message(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state.store.transition(
        &id,
        MessageStatus::Failed,
        MessageStatus::Pending,
        &|m| m.last_error = None,
    )?;
    info!(message_id = %id, attempts = message.attempts, "Failed message re-queued");
    Ok(respond(&state, &message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{conformance::message_at, LocalMessageStore, MessageStore, StorageResult};
    use chrono::{DateTime, Duration, FixedOffset};
    use std::sync::Arc;

    /// Store whose conditional delete loses the race to a dispatcher claim:
    /// the message moves to `sending` right before the delete runs.
    struct ClaimedBeforeDelete(LocalMessageStore);

    impl MessageStore for ClaimedBeforeDelete {
        fn backend(&self) -> &'static str {
            self.0.backend()
        }
        fn create(&self, message: &ScheduledMessage) -> StorageResult<()> {
            self.0.create(message)
        }
        fn get(&self, id: &str) -> StorageResult<ScheduledMessage> {
            self.0.get(id)
        }
        fn update(&self, message: &ScheduledMessage) -> StorageResult<()> {
            self.0.update(message)
        }
        fn delete(&self, id: &str) -> StorageResult<()> {
            self.0.delete(id)
        }
        fn delete_if(&self, id: &str, allowed: &dyn Fn(MessageStatus) -> bool) -> StorageResult<()> {
            self.0
                .transition(id, MessageStatus::Pending, MessageStatus::Sending, &|_| {})?;
            self.0.delete_if(id, allowed)
        }
        fn list(&self) -> StorageResult<Vec<ScheduledMessage>> {
            self.0.list()
        }
        fn list_due(&self, now: DateTime<Utc>) -> StorageResult<Vec<ScheduledMessage>> {
            self.0.list_due(now)
        }
        fn transition(
            &self,
            id: &str,
            from: MessageStatus,
            to: MessageStatus,
            mutate: &dyn Fn(&mut ScheduledMessage),
        ) -> StorageResult<ScheduledMessage> {
            self.0.transition(id, from, to, mutate)
        }
        fn health_check(&self) -> StorageResult<()> {
            self.0.health_check()
        }
    }

    fn future_request() -> CreateMessageRequest {
        let tomorrow = (Utc::now() + Duration::days(1)).with_timezone(&FixedOffset::east_opt(9 * 3600).unwrap());
        CreateMessageRequest {
            recipient: "엄마".into(),
            phone_number: Some("010-1234-5678".into()),
            message: "생일 축하해요!".into(),
            scheduled_date: tomorrow.format("%Y-%m-%d").to_string(),
            scheduled_time: "09:30".into(),
        }
    }

    #[tokio::test]
    async fn create_then_get_and_list() {
        let state = AppState::default();

        let (status, Json(created)) = create_message(State(state.clone()), Ok(Json(future_request())))
            .await
            .expect("message creation succeeds");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.status, MessageStatus::Pending);
        assert_eq!(created.status_label, "대기중");
        assert_eq!(created.message_length, 8);
        assert!(created.scheduled_time_display.ends_with("09:30"));

        let Json(fetched) = get_message(Path(created.id.clone()), State(state.clone()))
            .await
            .expect("message exists");
        assert_eq!(fetched, created);

        let Json(listed) = list_messages(State(state.clone()), Query(ListMessagesQuery::default()))
            .await
            .expect("list succeeds");
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn create_rejects_past_schedule() {
        let state = AppState::default();
        let request = CreateMessageRequest {
            scheduled_date: "2020-01-01".into(),
            ..future_request()
        };
        let err = create_message(State(state.clone()), Ok(Json(request)))
            .await
            .expect_err("past schedule is rejected");
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let state = AppState::default();
        let pending = message_at(5);
        let cancelled = message_at(10);
        state.store.create(&pending).unwrap();
        state.store.create(&cancelled).unwrap();
        state
            .store
            .transition(&cancelled.id, MessageStatus::Pending, MessageStatus::Cancelled, &|_| {})
            .unwrap();

        let Json(listed) = list_messages(
            State(state.clone()),
            Query(ListMessagesQuery {
                status: Some("cancelled".into()),
            }),
        )
        .await
        .expect("filtered list succeeds");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, cancelled.id);
        assert_eq!(listed[0].status_label, "취소됨");

        let err = list_messages(
            State(state),
            Query(ListMessagesQuery {
                status: Some("archived".into()),
            }),
        )
        .await
        .expect_err("unknown status is rejected");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_only_allowed_before_sending() {
        let state = AppState::default();
        let pending = message_at(5);
        let sent = message_at(-5);
        state.store.create(&pending).unwrap();
        state.store.create(&sent).unwrap();
        state
            .store
            .transition(&sent.id, MessageStatus::Pending, MessageStatus::Sending, &|_| {})
            .unwrap();

        let err = delete_message(Path(sent.id.clone()), State(state.clone()))
            .await
            .expect_err("sending message cannot be deleted");
        assert_eq!(err.status, StatusCode::CONFLICT);

        state
            .store
            .transition(&sent.id, MessageStatus::Sending, MessageStatus::Sent, &|_| {})
            .unwrap();
        let err = delete_message(Path(sent.id.clone()), State(state.clone()))
            .await
            .expect_err("sent message cannot be deleted");
        assert_eq!(err.status, StatusCode::CONFLICT);

        let status = delete_message(Path(pending.id.clone()), State(state.clone()))
            .await
            .expect("pending message is deleted");
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = get_message(Path(pending.id), State(state))
            .await
            .expect_err("deleted message is gone");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_loses_to_a_concurrent_claim() {
        let state = AppState::with_store(Arc::new(ClaimedBeforeDelete(LocalMessageStore::in_memory())));
        let message = message_at(-1);
        state.store.create(&message).unwrap();

        let err = delete_message(Path(message.id.clone()), State(state.clone()))
            .await
            .expect_err("claimed message cannot be deleted");
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert!(err.message.contains("sending"));

        let Json(kept) = get_message(Path(message.id), State(state))
            .await
            .expect("claimed message is kept");
        assert_eq!(kept.status, MessageStatus::Sending);
    }

    #[tokio::test]
    async fn cancel_and_retry_follow_the_state_machine() {
        let state = AppState::default();
        let message = message_at(5);
        state.store.create(&message).unwrap();

        let err = retry_message(Path(message.id.clone()), State(state.clone()))
            .await
            .expect_err("pending message cannot be retried");
        assert_eq!(err.status, StatusCode::CONFLICT);

        let Json(cancelled) = cancel_message(Path(message.id.clone()), State(state.clone()))
            .await
            .expect("pending message is cancelled");
        assert_eq!(cancelled.status, MessageStatus::Cancelled);

        let err = cancel_message(Path(message.id.clone()), State(state.clone()))
            .await
            .expect_err("cancelled is terminal");
        assert_eq!(err.status, StatusCode::CONFLICT);

        let failed = message_at(-5);
        state.store.create(&failed).unwrap();
        state
            .store
            .transition(&failed.id, MessageStatus::Pending, MessageStatus::Sending, &|_| {})
            .unwrap();
        state
            .store
            .transition(&failed.id, MessageStatus::Sending, MessageStatus::Failed, &|m| {
                m.last_error = Some("boom".into())
            })
            .unwrap();

        let Json(retried) = retry_message(Path(failed.id.clone()), State(state.clone()))
            .await
            .expect("failed message is re-queued");
        assert_eq!(retried.status, MessageStatus::Pending);
        assert!(retried.last_error.is_none());
    }

    #[tokio::test]
    async fn missing_message_is_not_found() {
        let state = AppState::default();
        for result in [
            get_message(Path("nope".into()), State(state.clone())).await.map(|_| ()),
            cancel_message(Path("nope".into()), State(state.clone())).await.map(|_| ()),
            delete_message(Path("nope".into()), State(state.clone())).await.map(|_| ()),
        ] {
            assert_eq!(result.unwrap_err().status, StatusCode::NOT_FOUND);
        }
    }
}
