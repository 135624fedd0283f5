use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Idempotent schema bootstrap, run once at startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS accounts (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            employee_id     TEXT NOT NULL UNIQUE,
            name            TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'Active',
            profile_picture TEXT
        );
        CREATE TABLE IF NOT EXISTS rooms (
            uuid       TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            room_type  TEXT NOT NULL DEFAULT 'group',
            join_code  TEXT NOT NULL UNIQUE COLLATE NOCASE,
            created_by INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS memberships (
            room_id      TEXT NOT NULL REFERENCES rooms(uuid) ON DELETE CASCADE,
            account_id   INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            last_read_at TEXT,
            PRIMARY KEY (room_id, account_id)
        );
        CREATE TABLE IF NOT EXISTS messages (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            room_id   TEXT NOT NULL REFERENCES rooms(uuid) ON DELETE CASCADE,
            sender_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            message   TEXT NOT NULL,
            sent_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_room_sent ON messages(room_id, sent_at);",
    )
    .execute(pool)
    .await?;
    Ok(())
}
