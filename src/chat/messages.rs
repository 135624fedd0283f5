//! Append-only message log. Messages are never edited or deleted here;
//! rows only disappear through the room/account delete cascades.

use sqlx::{Executor, Sqlite, SqlitePool};

use super::now_stamp;
use super::service::ChatError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub room_id: String,
    pub sender_id: i64,
    pub message: String,
    pub sent_at: String,
}

/// A message joined with its sender's directory record, as rendered in the
/// room view and the poll payload.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageView {
    pub id: i64,
    pub sender_id: i64,
    pub sender_name: String,
    pub employee_id: String,
    pub message: String,
    pub sent_at: String,
    pub profile_picture: Option<String>,
}

pub(crate) async fn append<'c, E>(
    exec: E,
    room_id: &str,
    sender_id: i64,
    text: &str,
) -> Result<Message, ChatError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let text = text.trim();
    if text.is_empty() {
        return Err(ChatError::Validation("Message text is required.".into()));
    }
    let sent_at = now_stamp();
    let res = sqlx::query(
        "INSERT INTO messages (room_id, sender_id, message, sent_at) VALUES (?, ?, ?, ?)",
    )
    .bind(room_id)
    .bind(sender_id)
    .bind(text)
    .bind(&sent_at)
    .execute(exec)
    .await?;
    Ok(Message {
        id: res.last_insert_rowid(),
        room_id: room_id.to_owned(),
        sender_id,
        message: text.to_owned(),
        sent_at,
    })
}

/// Messages sent strictly after `since`, oldest first. The id tiebreak keeps
/// same-second messages in insertion order.
pub(crate) async fn list_since(
    pool: &SqlitePool,
    room_id: &str,
    since: &str,
) -> Result<Vec<MessageView>, sqlx::Error> {
    sqlx::query_as(
        "SELECT m.id, m.sender_id, a.name AS sender_name, a.employee_id,
                m.message, m.sent_at, a.profile_picture
         FROM messages m
         JOIN accounts a ON a.id = m.sender_id
         WHERE m.room_id = ? AND m.sent_at > ?
         ORDER BY m.sent_at, m.id",
    )
    .bind(room_id)
    .bind(since)
    .fetch_all(pool)
    .await
}
