//! Room store: persisted chat rooms keyed by uuid, each carrying a short
//! unique join code.

use rand::Rng;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::service::ChatError;
use super::now_stamp;

const JOIN_CODE_LEN: usize = 6;
// No 0/O/1/I/L, the code is meant to be read out loud and retyped.
const JOIN_CODE_CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const JOIN_CODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RoomType {
    General,
    Group,
    Direct,
}

impl RoomType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomType::General => "general",
            RoomType::Group => "group",
            RoomType::Direct => "direct",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Room {
    pub uuid: String,
    pub name: String,
    pub room_type: RoomType,
    pub join_code: String,
    pub created_by: i64,
    pub created_at: String,
}

/// A room plus its membership count, as shown on the dashboard.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomListing {
    #[sqlx(flatten)]
    pub room: Room,
    pub member_count: i64,
}

pub(crate) fn generate_join_code() -> String {
    let mut rng = rand::rng();
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_CHARSET[rng.random_range(0..JOIN_CODE_CHARSET.len())] as char)
        .collect()
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Inserts a room with a freshly generated join code, regenerating on the
/// (unlikely) collision with an existing code.
pub(crate) async fn create(
    conn: &mut SqliteConnection,
    name: &str,
    room_type: RoomType,
    created_by: i64,
) -> Result<Room, ChatError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ChatError::Validation("Room name is required.".into()));
    }
    let uuid = Uuid::now_v7().to_string();
    let created_at = now_stamp();

    for attempt in 1..=JOIN_CODE_ATTEMPTS {
        let join_code = generate_join_code();
        let res = sqlx::query(
            "INSERT INTO rooms (uuid, name, room_type, join_code, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&uuid)
        .bind(name)
        .bind(room_type)
        .bind(&join_code)
        .bind(created_by)
        .bind(&created_at)
        .execute(&mut *conn)
        .await;

        match res {
            Ok(_) => {
                return Ok(Room {
                    uuid,
                    name: name.to_owned(),
                    room_type,
                    join_code,
                    created_by,
                    created_at,
                });
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(attempt, "join code collision, regenerating");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ChatError::Conflict(
        "Could not allocate a unique join code.".into(),
    ))
}

pub(crate) async fn find(
    pool: &SqlitePool,
    room_id: &str,
) -> Result<Option<Room>, sqlx::Error> {
    sqlx::query_as(
        "SELECT uuid, name, room_type, join_code, created_by, created_at
         FROM rooms WHERE uuid = ?",
    )
    .bind(room_id)
    .fetch_optional(pool)
    .await
}

/// Join codes are stored with NOCASE collation, so the lookup is
/// case-insensitive; input is only trimmed here.
pub(crate) async fn find_by_join_code(
    pool: &SqlitePool,
    code: &str,
) -> Result<Option<Room>, sqlx::Error> {
    sqlx::query_as(
        "SELECT uuid, name, room_type, join_code, created_by, created_at
         FROM rooms WHERE join_code = ?",
    )
    .bind(code.trim())
    .fetch_optional(pool)
    .await
}

/// Rooms the account belongs to, newest first.
pub(crate) async fn list_for_account(
    pool: &SqlitePool,
    account_id: i64,
) -> Result<Vec<RoomListing>, sqlx::Error> {
    sqlx::query_as(
        "SELECT r.uuid, r.name, r.room_type, r.join_code, r.created_by, r.created_at,
                (SELECT COUNT(*) FROM memberships mc WHERE mc.room_id = r.uuid) AS member_count
         FROM rooms r
         JOIN memberships m ON m.room_id = r.uuid
         WHERE m.account_id = ?
         ORDER BY r.created_at DESC, r.uuid DESC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
}

/// General rooms the account has not joined yet.
pub(crate) async fn list_public_unjoined(
    pool: &SqlitePool,
    account_id: i64,
) -> Result<Vec<RoomListing>, sqlx::Error> {
    sqlx::query_as(
        "SELECT r.uuid, r.name, r.room_type, r.join_code, r.created_by, r.created_at,
                (SELECT COUNT(*) FROM memberships mc WHERE mc.room_id = r.uuid) AS member_count
         FROM rooms r
         WHERE r.room_type = ?
           AND NOT EXISTS (SELECT 1 FROM memberships m
                           WHERE m.room_id = r.uuid AND m.account_id = ?)
         ORDER BY r.created_at DESC, r.uuid DESC",
    )
    .bind(RoomType::General)
    .bind(account_id)
    .fetch_all(pool)
    .await
}
