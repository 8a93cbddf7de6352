use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use parley_db::StoreError;
use parley_db::models::MessageDetailRow;
use parley_types::api::{
    Claims, CreatedMessage, CreatedMessageResponse, MessageDetailResponse, ReadReceipt,
    ReadReceiptResponse, SendMessageRequest,
};
use parley_types::models::{MessageDetail, UserSummary};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::parse_ts;

/// The sender is always the authenticated identity; the request body only
/// names the recipient. There is no way to spoof `from_username`.
pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.body.trim().is_empty() {
        return Err(ApiError::Validation("message body must not be empty".into()));
    }

    // Run the blocking insert off the async runtime
    let db = state.clone();
    let from = claims.username.clone();
    let row = tokio::task::spawn_blocking(move || {
        db.db.insert_message(&from, &req.to_username, &req.body)
    })
    .await
    .map_err(join_err)?
    .map_err(|err| match err {
        StoreError::ForeignKey => {
            ApiError::NotFound("recipient does not exist".into())
        }
        other => other.into(),
    })?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedMessageResponse {
            message: CreatedMessage {
                id: row.id,
                from_username: row.from_username,
                to_username: row.to_username,
                body: row.body,
                sent_at: parse_ts(&row.sent_at),
            },
        }),
    ))
}

/// Only the two parties of a message may read it.
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageDetailResponse>, ApiError> {
    let row = fetch_message(&state, id).await?;

    if claims.username != row.from_username && claims.username != row.to_username {
        return Err(ApiError::Forbidden("cannot read this message".into()));
    }

    Ok(Json(MessageDetailResponse {
        message: detail_from_row(row),
    }))
}

/// Only the intended recipient may mark a message read. The ownership
/// check runs before the mutating store call.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReadReceiptResponse>, ApiError> {
    let row = fetch_message(&state, id).await?;

    if claims.username != row.to_username {
        return Err(ApiError::Forbidden(
            "only the recipient can mark a message read".into(),
        ));
    }

    let db = state.clone();
    let read_at = tokio::task::spawn_blocking(move || db.db.mark_read(id))
        .await
        .map_err(join_err)??
        .ok_or_else(|| ApiError::NotFound(format!("no such message: {}", id)))?;

    Ok(Json(ReadReceiptResponse {
        message: ReadReceipt {
            id,
            read_at: parse_ts(&read_at),
        },
    }))
}

async fn fetch_message(state: &AppState, id: i64) -> Result<MessageDetailRow, ApiError> {
    let db = state.clone();
    tokio::task::spawn_blocking(move || db.db.get_message(id))
        .await
        .map_err(join_err)??
        .ok_or_else(|| ApiError::NotFound(format!("no such message: {}", id)))
}

fn detail_from_row(row: MessageDetailRow) -> MessageDetail {
    MessageDetail {
        id: row.id,
        body: row.body,
        sent_at: parse_ts(&row.sent_at),
        read_at: row.read_at.as_deref().map(parse_ts),
        from_user: UserSummary {
            username: row.from_username,
            first_name: row.from_first_name,
            last_name: row.from_last_name,
            phone: row.from_phone,
        },
        to_user: UserSummary {
            username: row.to_username,
            first_name: row.to_first_name,
            last_name: row.to_last_name,
            phone: row.to_phone,
        },
    }
}

fn join_err(e: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", e);
    ApiError::Internal(anyhow::anyhow!("task join failed: {}", e))
}
