//! Membership store: the (room, account) relation that gates every read
//! and write in the chat subsystem, plus the per-member last-read marker.

use sqlx::{Executor, Sqlite, SqlitePool};

use super::rooms::{Room, RoomType, is_unique_violation};
use super::service::ChatError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Membership {
    pub room_id: String,
    pub account_id: i64,
    pub last_read_at: Option<String>,
}

pub(crate) async fn is_member<'c, E>(
    exec: E,
    room_id: &str,
    account_id: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    Ok(
        sqlx::query("SELECT 1 FROM memberships WHERE room_id = ? AND account_id = ?")
            .bind(room_id)
            .bind(account_id)
            .fetch_optional(exec)
            .await?
            .is_some(),
    )
}

/// Inserts a membership row. A duplicate pair is a `Conflict`; callers that
/// want idempotent joins check `is_member` first and treat a lost race the
/// same way.
pub(crate) async fn add<'c, E>(
    exec: E,
    room_id: &str,
    account_id: i64,
) -> Result<Membership, ChatError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let res = sqlx::query("INSERT INTO memberships (room_id, account_id) VALUES (?, ?)")
        .bind(room_id)
        .bind(account_id)
        .execute(exec)
        .await;
    match res {
        Ok(_) => Ok(Membership {
            room_id: room_id.to_owned(),
            account_id,
            last_read_at: None,
        }),
        Err(e) if is_unique_violation(&e) => Err(ChatError::Conflict(
            "Already a member of this room.".into(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Idempotent; a no-op for non-members.
pub(crate) async fn touch_last_read(
    pool: &SqlitePool,
    room_id: &str,
    account_id: i64,
    timestamp: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE memberships SET last_read_at = ? WHERE room_id = ? AND account_id = ?")
        .bind(timestamp)
        .bind(room_id)
        .bind(account_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Member accounts of a room, ordered by display name.
pub(crate) async fn roster(
    pool: &SqlitePool,
    room_id: &str,
) -> Result<Vec<crate::accounts::Account>, sqlx::Error> {
    sqlx::query_as(
        "SELECT a.id, a.employee_id, a.name, a.status, a.profile_picture
         FROM accounts a
         JOIN memberships m ON m.account_id = a.id
         WHERE m.room_id = ?
         ORDER BY a.name",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await
}

/// The existing direct room whose membership pair is exactly
/// {account_a, account_b}, if any. Direct rooms always hold two members,
/// so matching both is enough.
pub(crate) async fn find_direct_room<'c, E>(
    exec: E,
    account_a: i64,
    account_b: i64,
) -> Result<Option<Room>, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(
        "SELECT r.uuid, r.name, r.room_type, r.join_code, r.created_by, r.created_at
         FROM rooms r
         JOIN memberships ma ON ma.room_id = r.uuid AND ma.account_id = ?
         JOIN memberships mb ON mb.room_id = r.uuid AND mb.account_id = ?
         WHERE r.room_type = ?
         LIMIT 1",
    )
    .bind(account_a)
    .bind(account_b)
    .bind(RoomType::Direct)
    .fetch_optional(exec)
    .await
}
