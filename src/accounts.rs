//! Read-only view of the account directory. Employee records are owned by
//! the portal's authentication module; the chat side only resolves and
//! lists them.

use sqlx::SqlitePool;

pub const STATUS_ACTIVE: &str = "Active";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub employee_id: String,
    pub name: String,
    pub status: String,
    pub profile_picture: Option<String>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

pub async fn find(pool: &SqlitePool, id: i64) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as("SELECT id, employee_id, name, status, profile_picture FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_employee_id(
    pool: &SqlitePool,
    employee_id: &str,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, employee_id, name, status, profile_picture FROM accounts WHERE employee_id = ?",
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await
}

/// Active colleagues shown on the dashboard as direct-chat targets.
pub async fn list_active_excluding(
    pool: &SqlitePool,
    account_id: i64,
) -> Result<Vec<Account>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, employee_id, name, status, profile_picture FROM accounts
         WHERE status = ? AND id != ? ORDER BY name",
    )
    .bind(STATUS_ACTIVE)
    .bind(account_id)
    .fetch_all(pool)
    .await
}
