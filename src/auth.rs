//! Thin session login. Credential checking belongs to the portal's
//! authentication module; this only binds a session cookie to an account id
//! so handlers can resolve the acting account.

use axum::{
    Form, Router, debug_handler,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, AppState, accounts, accounts::Account, escape, include_res};

pub const ACCOUNT_ID: &str = "account_id";
const NOTICE: &str = "notice";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", get(logout))
}

/// Resolves the acting account from the session. `None` means not logged in
/// (or a stale session pointing at a deleted account) and the caller should
/// redirect to `/login`.
pub async fn current_account(session: &Session, pool: &SqlitePool) -> AppResult<Option<Account>> {
    let Some(account_id) = session.get::<i64>(ACCOUNT_ID).await? else {
        return Ok(None);
    };
    Ok(accounts::find(pool, account_id).await?)
}

/// One-shot notice shown on the next rendered page.
pub async fn flash(session: &Session, notice: impl Into<String>) -> AppResult<()> {
    session.insert(NOTICE, notice.into()).await?;
    Ok(())
}

pub async fn take_notice(session: &Session) -> AppResult<String> {
    Ok(session.remove::<String>(NOTICE).await?.unwrap_or_default())
}

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    employee_id: String,
}

#[debug_handler]
async fn login_page(session: Session) -> AppResult<Response> {
    let notice = take_notice(&session).await?;
    Ok(
        Html(include_res!(str, "/pages/login.html").replace("{notice}", &escape(&notice)))
            .into_response(),
    )
}

#[debug_handler]
async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(LoginForm { employee_id }): Form<LoginForm>,
) -> AppResult<Response> {
    let account = accounts::find_by_employee_id(&db_pool, employee_id.trim()).await?;
    match account {
        Some(account) if account.is_active() => {
            session.insert(ACCOUNT_ID, account.id).await?;
            tracing::info!(account_id = account.id, "login");
            Ok(Redirect::to("/chat").into_response())
        }
        _ => {
            flash(&session, "Unknown or inactive employee ID.").await?;
            Ok(Redirect::to("/login").into_response())
        }
    }
}

#[debug_handler]
async fn logout(session: Session) -> AppResult<Redirect> {
    session.clear().await;
    Ok(Redirect::to("/login"))
}
