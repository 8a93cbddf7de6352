use axum::{
    Extension, Json,
    extract::{Path, State},
};

use parley_types::api::{
    Claims, ReceivedMessagesResponse, SentMessagesResponse, UserResponse, UsersResponse,
};
use parley_types::models::{ReceivedMessage, SentMessage, UserProfile, UserSummary};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::parse_ts;

pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<UsersResponse>, ApiError> {
    let users = state
        .db
        .list_users()?
        .into_iter()
        .map(|row| UserSummary {
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
        })
        .collect();

    Ok(Json(UsersResponse { users }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<UserResponse>, ApiError> {
    let row = state
        .db
        .get_user(&username)?
        .ok_or_else(|| ApiError::NotFound(format!("no such user: {}", username)))?;

    Ok(Json(UserResponse {
        user: UserProfile {
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            join_at: parse_ts(&row.join_at),
            last_login_at: parse_ts(&row.last_login_at),
        },
    }))
}

/// Messages this user has sent, each carrying the recipient's profile.
/// Mailboxes are private: only their owner may list them.
pub async fn messages_from(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SentMessagesResponse>, ApiError> {
    ensure_owner(&claims, &username)?;

    let messages = state
        .db
        .messages_from(&username)?
        .into_iter()
        .map(|row| SentMessage {
            id: row.id,
            body: row.body,
            sent_at: parse_ts(&row.sent_at),
            read_at: row.read_at.as_deref().map(parse_ts),
            to_user: UserSummary {
                username: row.counterpart_username,
                first_name: row.counterpart_first_name,
                last_name: row.counterpart_last_name,
                phone: row.counterpart_phone,
            },
        })
        .collect();

    Ok(Json(SentMessagesResponse { messages }))
}

/// Messages this user has received, each carrying the sender's profile.
pub async fn messages_to(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReceivedMessagesResponse>, ApiError> {
    ensure_owner(&claims, &username)?;

    let messages = state
        .db
        .messages_to(&username)?
        .into_iter()
        .map(|row| ReceivedMessage {
            id: row.id,
            body: row.body,
            sent_at: parse_ts(&row.sent_at),
            read_at: row.read_at.as_deref().map(parse_ts),
            from_user: UserSummary {
                username: row.counterpart_username,
                first_name: row.counterpart_first_name,
                last_name: row.counterpart_last_name,
                phone: row.counterpart_phone,
            },
        })
        .collect();

    Ok(Json(ReceivedMessagesResponse { messages }))
}

fn ensure_owner(claims: &Claims, username: &str) -> Result<(), ApiError> {
    if claims.username != username {
        return Err(ApiError::Forbidden(
            "cannot read another user's messages".into(),
        ));
    }
    Ok(())
}
