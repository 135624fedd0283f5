//! Programmatic poll endpoint. Unlike the pages, failures here answer with
//! machine-readable status codes and never redirect; the room page's
//! auto-refresh script consumes this.

use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, auth};

use super::service::{ChatError, ChatService};

#[derive(Deserialize)]
pub(crate) struct PollQuery {
    since: Option<String>,
}

#[debug_handler]
pub(crate) async fn poll_messages(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(room_id): Path<String>,
    Query(PollQuery { since }): Query<PollQuery>,
) -> AppResult<Response> {
    let Some(actor) = auth::current_account(&session, &db_pool).await? else {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Not signed in" })),
        )
            .into_response());
    };
    let service = ChatService::new(db_pool);
    match service
        .poll_messages(&actor, &room_id, since.as_deref())
        .await
    {
        Ok(records) => Ok(Json(records).into_response()),
        Err(ChatError::Forbidden) => Ok((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Access denied" })),
        )
            .into_response()),
        Err(ChatError::NotFound(_)) => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Room not found" })),
        )
            .into_response()),
        Err(ChatError::Db(e)) => Err(e.into()),
        Err(other) => Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": other.to_string() })),
        )
            .into_response()),
    }
}
