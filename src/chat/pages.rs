//! Interactive chat pages. Every handler resolves the acting account from
//! the session, delegates to the service, and turns expected failures into
//! a flash notice plus a redirect to a safe view.

use axum::{
    Form, debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, accounts, auth, escape, include_res};

use super::display_stamp;
use super::rooms::RoomType;
use super::service::{ChatError, ChatService};

async fn notice_redirect(
    session: &Session,
    notice: impl Into<String>,
    to: &str,
) -> AppResult<Response> {
    auth::flash(session, notice).await?;
    Ok(Redirect::to(to).into_response())
}

/// Expected service failures become a notice on a fallback page; database
/// failures stay errors.
async fn translate(session: &Session, err: ChatError, fallback: &str) -> AppResult<Response> {
    match err {
        ChatError::Db(e) => Err(e.into()),
        other => notice_redirect(session, other.to_string(), fallback).await,
    }
}

#[debug_handler]
pub(crate) async fn dashboard(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let Some(actor) = auth::current_account(&session, &db_pool).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    let service = ChatService::new(db_pool.clone());

    let mut my_rooms = String::new();
    for listing in service.list_rooms(&actor).await? {
        my_rooms += &include_res!(str, "/pages/room_item.html")
            .replace("{id}", &listing.room.uuid)
            .replace("{name}", &escape(&listing.room.name))
            .replace("{type}", listing.room.room_type.as_str())
            .replace("{members}", &listing.member_count.to_string());
    }

    let mut public_rooms = String::new();
    for listing in service.list_joinable(&actor).await? {
        public_rooms += &include_res!(str, "/pages/public_room_item.html")
            .replace("{name}", &escape(&listing.room.name))
            .replace("{members}", &listing.member_count.to_string());
    }

    let mut colleagues = String::new();
    for colleague in accounts::list_active_excluding(&db_pool, actor.id).await? {
        colleagues += &include_res!(str, "/pages/colleague_item.html")
            .replace("{id}", &colleague.id.to_string())
            .replace("{name}", &escape(&colleague.name))
            .replace("{employee_id}", &escape(&colleague.employee_id));
    }

    Ok(Html(
        include_res!(str, "/pages/dashboard.html")
            .replace("{notice}", &escape(&auth::take_notice(&session).await?))
            .replace("{name}", &escape(&actor.name))
            .replace("{my_rooms}", &my_rooms)
            .replace("{public_rooms}", &public_rooms)
            .replace("{colleagues}", &colleagues),
    )
    .into_response())
}

#[derive(Deserialize)]
pub(crate) struct CreateRoomForm {
    room_name: String,
    room_type: Option<RoomType>,
}

#[debug_handler]
pub(crate) async fn create_room_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    if auth::current_account(&session, &db_pool).await?.is_none() {
        return Ok(Redirect::to("/login").into_response());
    }
    Ok(Html(
        include_res!(str, "/pages/create_room.html")
            .replace("{notice}", &escape(&auth::take_notice(&session).await?)),
    )
    .into_response())
}

#[debug_handler]
pub(crate) async fn create_room(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(CreateRoomForm { room_name, room_type }): Form<CreateRoomForm>,
) -> AppResult<Response> {
    let Some(actor) = auth::current_account(&session, &db_pool).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    let service = ChatService::new(db_pool);
    match service
        .create_room(&actor, &room_name, room_type.unwrap_or(RoomType::Group))
        .await
    {
        Ok(room) => {
            auth::flash(
                &session,
                format!(
                    "Chat room \"{}\" created successfully! Join code: {}",
                    room.name, room.join_code
                ),
            )
            .await?;
            Ok(Redirect::to(&format!("/chat/room/{}", room.uuid)).into_response())
        }
        Err(err) => translate(&session, err, "/chat/create").await,
    }
}

#[derive(Deserialize)]
pub(crate) struct JoinRoomForm {
    join_code: String,
}

#[debug_handler]
pub(crate) async fn join_room_page(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    if auth::current_account(&session, &db_pool).await?.is_none() {
        return Ok(Redirect::to("/login").into_response());
    }
    Ok(Html(
        include_res!(str, "/pages/join_room.html")
            .replace("{notice}", &escape(&auth::take_notice(&session).await?)),
    )
    .into_response())
}

#[debug_handler]
pub(crate) async fn join_room(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(JoinRoomForm { join_code }): Form<JoinRoomForm>,
) -> AppResult<Response> {
    let Some(actor) = auth::current_account(&session, &db_pool).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    if join_code.trim().is_empty() {
        return notice_redirect(&session, "Join code is required.", "/chat/join").await;
    }
    let service = ChatService::new(db_pool);
    match service.join_by_code(&actor, &join_code).await {
        Ok((room, already_member)) => {
            let notice = if already_member {
                format!("You are already a member of \"{}\".", room.name)
            } else {
                format!("Successfully joined \"{}\"!", room.name)
            };
            auth::flash(&session, notice).await?;
            Ok(Redirect::to(&format!("/chat/room/{}", room.uuid)).into_response())
        }
        Err(ChatError::NotFound(_)) => {
            notice_redirect(
                &session,
                "Invalid join code. Please check and try again.",
                "/chat/join",
            )
            .await
        }
        Err(err) => translate(&session, err, "/chat/join").await,
    }
}

#[debug_handler]
pub(crate) async fn room(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(room_id): Path<String>,
) -> AppResult<Response> {
    let Some(actor) = auth::current_account(&session, &db_pool).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    let service = ChatService::new(db_pool);
    let view = match service.open_room(&actor, &room_id).await {
        Ok(view) => view,
        Err(err) => return translate(&session, err, "/chat").await,
    };

    let mut messages = String::new();
    for msg in &view.messages {
        messages += &include_res!(str, "/pages/message.html")
            .replace("{sender}", &escape(&msg.sender_name))
            .replace("{employee_id}", &escape(&msg.employee_id))
            .replace("{sent_at}", &display_stamp(&msg.sent_at))
            .replace("{own}", if msg.sender_id == actor.id { "own" } else { "" })
            .replace("{text}", &escape(&msg.message));
    }

    let mut members = String::new();
    for member in &view.members {
        members += &include_res!(str, "/pages/member_item.html")
            .replace("{name}", &escape(&member.name))
            .replace("{employee_id}", &escape(&member.employee_id));
    }

    Ok(Html(
        include_res!(str, "/pages/room.html")
            .replace("{notice}", &escape(&auth::take_notice(&session).await?))
            .replace("{room_id}", &view.room.uuid)
            .replace("{room_name}", &escape(&view.room.name))
            .replace("{join_code}", &view.room.join_code)
            .replace("{messages}", &messages)
            .replace("{members}", &members),
    )
    .into_response())
}

#[derive(Deserialize)]
pub(crate) struct SendMessageForm {
    message: String,
}

#[debug_handler]
pub(crate) async fn send_message(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(room_id): Path<String>,
    Form(SendMessageForm { message }): Form<SendMessageForm>,
) -> AppResult<Response> {
    let Some(actor) = auth::current_account(&session, &db_pool).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    let service = ChatService::new(db_pool);
    match service.send_message(&actor, &room_id, &message).await {
        Ok(_) => Ok(Redirect::to(&format!("/chat/room/{room_id}")).into_response()),
        Err(err) => translate(&session, err, "/chat").await,
    }
}

#[debug_handler]
pub(crate) async fn start_direct_chat(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(account_id): Path<i64>,
) -> AppResult<Response> {
    let Some(actor) = auth::current_account(&session, &db_pool).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    let service = ChatService::new(db_pool);
    match service.start_direct_chat(&actor, account_id).await {
        Ok(room) => Ok(Redirect::to(&format!("/chat/room/{}", room.uuid)).into_response()),
        Err(err) => translate(&session, err, "/chat").await,
    }
}
