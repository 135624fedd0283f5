pub mod accounts;
pub mod auth;
pub mod chat;
pub mod db;

use axum::{
    Router,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use sqlx::SqlitePool;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
}

/// The full application router with its session layer.
pub fn app(db_pool: SqlitePool) -> Router {
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(30)));

    Router::new()
        .route("/", get(|| async { Redirect::to("/chat") }))
        .merge(auth::router())
        .nest("/chat", chat::router())
        .with_state(AppState { db_pool })
        .layer(session_layer)
}

/// Minimal HTML escaping for user-entered text interpolated into templates.
pub(crate) fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Embeds a file from the crate's `res/` directory at compile time.
#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

pub type AppResult<T> = Result<T, AppError>;

/// Catch-all handler error; anything a `?` can reach becomes a 500.
/// Expected failures (bad input, missing rows, non-members) are mapped to
/// notices or status codes before this fires, see `chat::ChatError`.
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "unhandled error in request handler");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
