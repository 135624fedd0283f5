//! Chat service: orchestrates the room, membership and message stores and
//! enforces the one authorization rule of the subsystem: an account may
//! read or write a room only while it holds a membership row for it.

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::accounts::{self, Account};

use super::members;
use super::messages::{self, Message, MessageView};
use super::rooms::{self, Room, RoomListing, RoomType};
use super::{EPOCH, display_stamp, now_stamp, since_stamp};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("You are not a member of this chat room.")]
    Forbidden,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Everything the room page needs: the room, its full history and the
/// member roster.
#[derive(Debug)]
pub struct RoomView {
    pub room: Room,
    pub messages: Vec<MessageView>,
    pub members: Vec<Account>,
}

/// One element of the poll payload.
#[derive(Debug, Serialize)]
pub struct PollMessage {
    pub id: i64,
    pub sender_name: String,
    pub employee_id: String,
    pub message: String,
    pub sent_at: String,
    pub is_own: bool,
    pub profile_picture: Option<String>,
}

#[derive(Clone)]
pub struct ChatService {
    pool: SqlitePool,
}

impl ChatService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Rooms the actor belongs to, newest first, for the dashboard.
    pub async fn list_rooms(&self, actor: &Account) -> Result<Vec<RoomListing>, ChatError> {
        Ok(rooms::list_for_account(&self.pool, actor.id).await?)
    }

    /// General rooms the actor could still join.
    pub async fn list_joinable(&self, actor: &Account) -> Result<Vec<RoomListing>, ChatError> {
        Ok(rooms::list_public_unjoined(&self.pool, actor.id).await?)
    }

    /// Creates a room and makes the creator its first member. Both writes
    /// share one transaction; a failed membership insert rolls the room back.
    pub async fn create_room(
        &self,
        actor: &Account,
        name: &str,
        room_type: RoomType,
    ) -> Result<Room, ChatError> {
        let mut tx = self.pool.begin().await?;
        let room = rooms::create(&mut tx, name, room_type, actor.id).await?;
        members::add(&mut *tx, &room.uuid, actor.id).await?;
        tx.commit().await?;
        tracing::info!(room = %room.uuid, kind = room.room_type.as_str(), "room created");
        Ok(room)
    }

    /// Resolves a join code and adds the actor as a member. Joining a room
    /// the actor already belongs to is a no-op; the flag reports which case
    /// happened so the caller can phrase its notice.
    pub async fn join_by_code(
        &self,
        actor: &Account,
        code: &str,
    ) -> Result<(Room, bool), ChatError> {
        let Some(room) = rooms::find_by_join_code(&self.pool, code).await? else {
            return Err(ChatError::NotFound("room"));
        };
        if members::is_member(&self.pool, &room.uuid, actor.id).await? {
            return Ok((room, true));
        }
        match members::add(&self.pool, &room.uuid, actor.id).await {
            Ok(_) => Ok((room, false)),
            // Lost a race against a concurrent join; same outcome.
            Err(ChatError::Conflict(_)) => Ok((room, true)),
            Err(e) => Err(e),
        }
    }

    /// Returns the room with full history and roster, and marks the room
    /// read as a side effect. Only call when the actor is actually viewing
    /// the room.
    pub async fn open_room(&self, actor: &Account, room_id: &str) -> Result<RoomView, ChatError> {
        let room = self.authorized_room(actor, room_id).await?;
        let messages = messages::list_since(&self.pool, &room.uuid, EPOCH).await?;
        let members = members::roster(&self.pool, &room.uuid).await?;
        members::touch_last_read(&self.pool, &room.uuid, actor.id, &now_stamp()).await?;
        Ok(RoomView {
            room,
            messages,
            members,
        })
    }

    /// Appends a message. Blank input is silently dropped rather than
    /// rejected, mirroring how the portal treats empty chat submissions.
    pub async fn send_message(
        &self,
        actor: &Account,
        room_id: &str,
        text: &str,
    ) -> Result<Option<Message>, ChatError> {
        let room = self.authorized_room(actor, room_id).await?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let message = messages::append(&self.pool, &room.uuid, actor.id, text).await?;
        Ok(Some(message))
    }

    /// Finds or creates the direct room between the actor and another
    /// account. `(A, B)` and `(B, A)` resolve to the same room.
    pub async fn start_direct_chat(
        &self,
        actor: &Account,
        other_account_id: i64,
    ) -> Result<Room, ChatError> {
        let Some(other) = accounts::find(&self.pool, other_account_id).await? else {
            return Err(ChatError::NotFound("employee"));
        };
        if !other.is_active() {
            return Err(ChatError::Validation(
                "That employee is no longer active.".into(),
            ));
        }
        if other.id == actor.id {
            return Err(ChatError::Validation(
                "You cannot start a chat with yourself.".into(),
            ));
        }

        match self.find_or_create_direct_room(actor, &other).await {
            Ok(room) => Ok(room),
            Err(err) => {
                // A concurrent request for the same pair may have won the
                // write lock; its room counts as "already exists".
                if let Some(room) =
                    members::find_direct_room(&self.pool, actor.id, other.id).await?
                {
                    return Ok(room);
                }
                Err(err)
            }
        }
    }

    /// The pair lookup runs under the write lock (`BEGIN IMMEDIATE`), so
    /// concurrent requests for the same pair serialize here and the loser's
    /// lookup sees the winner's committed room instead of inserting a
    /// duplicate.
    async fn find_or_create_direct_room(
        &self,
        actor: &Account,
        other: &Account,
    ) -> Result<Room, ChatError> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        if let Some(room) = members::find_direct_room(&mut *tx, actor.id, other.id).await? {
            tx.commit().await?;
            return Ok(room);
        }
        let name = format!("{} & {}", actor.name, other.name);
        let room = rooms::create(&mut tx, &name, RoomType::Direct, actor.id).await?;
        members::add(&mut *tx, &room.uuid, actor.id).await?;
        members::add(&mut *tx, &room.uuid, other.id).await?;
        tx.commit().await?;
        Ok(room)
    }

    /// Incremental poll. A missing or malformed `since` means the full
    /// history; a bad timestamp never fails the request.
    pub async fn poll_messages(
        &self,
        actor: &Account,
        room_id: &str,
        since: Option<&str>,
    ) -> Result<Vec<PollMessage>, ChatError> {
        let room = self.authorized_room(actor, room_id).await?;
        let since = since_stamp(since);
        let rows = messages::list_since(&self.pool, &room.uuid, &since).await?;
        Ok(rows
            .into_iter()
            .map(|m| PollMessage {
                id: m.id,
                is_own: m.sender_id == actor.id,
                sender_name: m.sender_name,
                employee_id: m.employee_id,
                message: m.message,
                sent_at: display_stamp(&m.sent_at),
                profile_picture: m.profile_picture,
            })
            .collect())
    }

    async fn authorized_room(&self, actor: &Account, room_id: &str) -> Result<Room, ChatError> {
        let Some(room) = rooms::find(&self.pool, room_id).await? else {
            return Err(ChatError::NotFound("room"));
        };
        if !members::is_member(&self.pool, &room.uuid, actor.id).await? {
            tracing::warn!(room = %room.uuid, account = actor.id, "non-member access refused");
            return Err(ChatError::Forbidden);
        }
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    async fn setup() -> (SqlitePool, ChatService, Account, Account) {
        let pool = testing::pool().await;
        let service = ChatService::new(pool.clone());
        testing::seed_account(&pool, "EMP001", "Alice").await;
        testing::seed_account(&pool, "EMP002", "Bob").await;
        let alice = accounts::find_by_employee_id(&pool, "EMP001")
            .await
            .unwrap()
            .unwrap();
        let bob = accounts::find_by_employee_id(&pool, "EMP002")
            .await
            .unwrap()
            .unwrap();
        (pool, service, alice, bob)
    }

    async fn membership_count(pool: &SqlitePool, room_id: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memberships WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(pool)
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn create_room_makes_the_creator_a_member() {
        let (pool, service, alice, _) = setup().await;
        let room = service
            .create_room(&alice, "Ops", RoomType::Group)
            .await
            .unwrap();
        assert!(!room.join_code.is_empty());
        assert_eq!(membership_count(&pool, &room.uuid).await, 1);

        let listed = service.list_rooms(&alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].room.uuid, room.uuid);
    }

    #[tokio::test]
    async fn create_room_rejects_blank_names_without_side_effects() {
        let (pool, service, alice, _) = setup().await;
        let err = service
            .create_room(&alice, "  ", RoomType::Group)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        let (rooms,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rooms, 0);
    }

    #[tokio::test]
    async fn join_by_code_is_idempotent_and_case_insensitive() {
        let (pool, service, alice, bob) = setup().await;
        let room = service
            .create_room(&alice, "Ops", RoomType::Group)
            .await
            .unwrap();

        let (joined, already) = service
            .join_by_code(&bob, &room.join_code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(joined.uuid, room.uuid);
        assert!(!already);

        let (_, already) = service.join_by_code(&bob, &room.join_code).await.unwrap();
        assert!(already);
        assert_eq!(membership_count(&pool, &room.uuid).await, 2);
    }

    #[tokio::test]
    async fn join_by_code_rejects_unknown_codes() {
        let (_, service, alice, _) = setup().await;
        let err = service.join_by_code(&alice, "NOPE99").await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[tokio::test]
    async fn direct_chat_is_deduplicated_per_pair() {
        let (pool, service, alice, bob) = setup().await;
        let first = service.start_direct_chat(&alice, bob.id).await.unwrap();
        assert_eq!(first.room_type, RoomType::Direct);
        assert_eq!(first.name, "Alice & Bob");
        assert_eq!(membership_count(&pool, &first.uuid).await, 2);

        let again = service.start_direct_chat(&alice, bob.id).await.unwrap();
        assert_eq!(again.uuid, first.uuid);
        let reversed = service.start_direct_chat(&bob, alice.id).await.unwrap();
        assert_eq!(reversed.uuid, first.uuid);

        let (rooms,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rooms, 1);
    }

    #[tokio::test]
    async fn direct_chat_rejects_self_and_inactive_targets() {
        let (pool, service, alice, _) = setup().await;
        let err = service.start_direct_chat(&alice, alice.id).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        let gone =
            testing::seed_account_with_status(&pool, "EMP009", "Gone", "Inactive").await;
        let err = service.start_direct_chat(&alice, gone).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        let err = service.start_direct_chat(&alice, 9999).await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[tokio::test]
    async fn blank_messages_are_silently_dropped() {
        let (_, service, alice, _) = setup().await;
        let room = service
            .create_room(&alice, "Ops", RoomType::Group)
            .await
            .unwrap();

        let sent = service
            .send_message(&alice, &room.uuid, "  \t\n ")
            .await
            .unwrap();
        assert!(sent.is_none());
        let view = service.open_room(&alice, &room.uuid).await.unwrap();
        assert!(view.messages.is_empty());
    }

    #[tokio::test]
    async fn open_room_returns_history_and_touches_last_read() {
        let (pool, service, alice, _) = setup().await;
        let room = service
            .create_room(&alice, "Ops", RoomType::Group)
            .await
            .unwrap();
        service.send_message(&alice, &room.uuid, "one").await.unwrap();
        service.send_message(&alice, &room.uuid, "two").await.unwrap();

        let view = service.open_room(&alice, &room.uuid).await.unwrap();
        assert_eq!(
            view.messages.iter().map(|m| m.message.as_str()).collect::<Vec<_>>(),
            vec!["one", "two"]
        );
        assert_eq!(view.members.len(), 1);
        assert_eq!(view.members[0].name, "Alice");

        let (last_read,): (Option<String>,) = sqlx::query_as(
            "SELECT last_read_at FROM memberships WHERE room_id = ? AND account_id = ?",
        )
        .bind(&room.uuid)
        .bind(alice.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(last_read.is_some());
    }

    #[tokio::test]
    async fn poll_matches_room_history_and_is_strictly_incremental() {
        let (_, service, alice, bob) = setup().await;
        let room = service
            .create_room(&alice, "Ops", RoomType::Group)
            .await
            .unwrap();
        service.join_by_code(&bob, &room.join_code).await.unwrap();
        service.send_message(&alice, &room.uuid, "one").await.unwrap();
        let last = service
            .send_message(&bob, &room.uuid, "two")
            .await
            .unwrap()
            .unwrap();

        let full = service.poll_messages(&bob, &room.uuid, None).await.unwrap();
        let view = service.open_room(&bob, &room.uuid).await.unwrap();
        assert_eq!(
            full.iter().map(|m| m.id).collect::<Vec<_>>(),
            view.messages.iter().map(|m| m.id).collect::<Vec<_>>()
        );
        assert!(!full[0].is_own);
        assert!(full[1].is_own);

        // Malformed timestamps fall back to the full history.
        let lenient = service
            .poll_messages(&bob, &room.uuid, Some("yesterday-ish"))
            .await
            .unwrap();
        assert_eq!(lenient.len(), full.len());

        let after = service
            .poll_messages(&bob, &room.uuid, Some(last.sent_at.as_str()))
            .await
            .unwrap();
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn same_second_messages_are_still_delivered() {
        let (_, service, alice, _) = setup().await;
        let room = service
            .create_room(&alice, "Ops", RoomType::Group)
            .await
            .unwrap();

        // Back-to-back sends land within the same wall-clock second.
        let first = service
            .send_message(&alice, &room.uuid, "first")
            .await
            .unwrap()
            .unwrap();
        let second = service
            .send_message(&alice, &room.uuid, "second")
            .await
            .unwrap()
            .unwrap();

        // Polling from the first message's stored timestamp delivers the
        // second even when both share the same second.
        let delta = service
            .poll_messages(&alice, &room.uuid, Some(first.sent_at.as_str()))
            .await
            .unwrap();
        assert_eq!(delta.iter().map(|m| m.id).collect::<Vec<_>>(), vec![second.id]);

        // Clients echo back the second-resolution payload timestamp; that
        // may re-deliver same-second messages but never drops one.
        let echoed = service
            .poll_messages(&alice, &room.uuid, Some(delta[0].sent_at.as_str()))
            .await
            .unwrap();
        assert!(echoed.iter().any(|m| m.id == second.id));
    }

    #[tokio::test]
    async fn concurrent_direct_chat_requests_share_one_room() {
        let (pool, path) = testing::file_pool("direct-race").await;
        let service = ChatService::new(pool.clone());
        testing::seed_account(&pool, "EMP001", "Alice").await;
        testing::seed_account(&pool, "EMP002", "Bob").await;
        let alice = accounts::find_by_employee_id(&pool, "EMP001")
            .await
            .unwrap()
            .unwrap();
        let bob = accounts::find_by_employee_id(&pool, "EMP002")
            .await
            .unwrap()
            .unwrap();

        let (a, b) = tokio::join!(
            service.start_direct_chat(&alice, bob.id),
            service.start_direct_chat(&bob, alice.id)
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.uuid, b.uuid);

        let (rooms,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rooms, 1);

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn non_members_are_refused_everywhere() {
        let (_, service, alice, bob) = setup().await;
        let room = service
            .create_room(&alice, "Ops", RoomType::Group)
            .await
            .unwrap();

        assert!(matches!(
            service.open_room(&bob, &room.uuid).await.unwrap_err(),
            ChatError::Forbidden
        ));
        assert!(matches!(
            service.send_message(&bob, &room.uuid, "hi").await.unwrap_err(),
            ChatError::Forbidden
        ));
        assert!(matches!(
            service.poll_messages(&bob, &room.uuid, None).await.unwrap_err(),
            ChatError::Forbidden
        ));
        assert!(matches!(
            service.open_room(&alice, "no-such-room").await.unwrap_err(),
            ChatError::NotFound(_)
        ));
    }

    // The end-to-end walk from the subsystem description: create, join by
    // lowercased code, send, poll from epoch.
    #[tokio::test]
    async fn ops_room_scenario() {
        let (_, service, alice, bob) = setup().await;
        let room = service
            .create_room(&alice, "Ops", RoomType::Group)
            .await
            .unwrap();

        let (joined, _) = service
            .join_by_code(&bob, &room.join_code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(joined.uuid, room.uuid);

        service.send_message(&alice, &room.uuid, "hello").await.unwrap();

        let polled = service
            .poll_messages(&bob, &room.uuid, Some("1970-01-01 00:00:00"))
            .await
            .unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled[0].message, "hello");
        assert_eq!(polled[0].sender_name, "Alice");
        assert_eq!(polled[0].employee_id, "EMP001");
        assert!(!polled[0].is_own);
    }
}
