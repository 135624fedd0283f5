mod members;
mod messages;
mod pages;
mod poll;
mod rooms;
mod service;

pub use members::Membership;
pub use messages::{Message, MessageView};
pub use rooms::{Room, RoomListing, RoomType};
pub use service::{ChatError, ChatService, PollMessage, RoomView};

use axum::{Router, routing::get, routing::post};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Iso8601;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tower_http::cors::CorsLayer;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::dashboard))
        .route("/create", get(pages::create_room_page).post(pages::create_room))
        .route("/join", get(pages::join_room_page).post(pages::join_room))
        .route("/room/{room_id}", get(pages::room))
        .route("/room/{room_id}/send", post(pages::send_message))
        .route("/direct/{account_id}", get(pages::start_direct_chat))
        .route(
            "/room/{room_id}/messages",
            get(poll::poll_messages).layer(CorsLayer::permissive()),
        )
}

/// Storage timestamp format. Zero-padded UTC with microseconds, so
/// lexicographic comparison in SQL matches chronological order and two
/// messages in the same second still order and filter correctly.
pub(crate) const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");

/// Second-resolution rendering for pages and the poll payload.
pub(crate) const DISPLAY_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

pub const EPOCH: &str = "1970-01-01 00:00:00.000000";

pub(crate) fn now_stamp() -> String {
    OffsetDateTime::now_utc()
        .format(TIMESTAMP_FORMAT)
        .expect("timestamp format is static")
}

/// Truncates a storage stamp to second resolution for display.
pub(crate) fn display_stamp(stamp: &str) -> String {
    match PrimitiveDateTime::parse(stamp, TIMESTAMP_FORMAT) {
        Ok(dt) => dt
            .format(DISPLAY_FORMAT)
            .expect("timestamp format is static"),
        Err(_) => stamp.to_owned(),
    }
}

/// Normalizes a client-supplied `since` value to the storage format.
/// Accepts the storage format, the second-resolution display format clients
/// echo back, or ISO-8601; anything missing or unparseable means "give me
/// everything". A second-resolution value floors to `.000000`, so messages
/// later in that same second are re-delivered rather than lost.
pub(crate) fn since_stamp(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return EPOCH.to_owned();
    };
    let parsed = PrimitiveDateTime::parse(raw, TIMESTAMP_FORMAT)
        .or_else(|_| PrimitiveDateTime::parse(raw, DISPLAY_FORMAT))
        .or_else(|_| {
            OffsetDateTime::parse(raw, &Iso8601::DEFAULT)
                .map(|dt| {
                    let utc = dt.to_offset(UtcOffset::UTC);
                    PrimitiveDateTime::new(utc.date(), utc.time())
                })
        })
        .or_else(|_| PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT));
    match parsed {
        Ok(dt) => dt
            .format(TIMESTAMP_FORMAT)
            .expect("timestamp format is static"),
        Err(_) => EPOCH.to_owned(),
    }
}
