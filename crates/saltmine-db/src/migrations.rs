use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, quotas, payments)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                      TEXT PRIMARY KEY,
                name                    TEXT NOT NULL,
                email                   TEXT NOT NULL UNIQUE,
                password_hash           TEXT,
                provider                TEXT NOT NULL DEFAULT 'credentials',
                membership_type         TEXT NOT NULL DEFAULT 'FREE',
                membership_expires_at   TEXT,
                is_active               INTEGER NOT NULL DEFAULT 1,
                created_at              TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at              TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- One row per user per UTC day
            CREATE TABLE user_quotas (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id),
                date            TEXT NOT NULL,
                searches_used   INTEGER NOT NULL DEFAULT 0,
                searches_limit  INTEGER NOT NULL,
                messages_used   INTEGER NOT NULL DEFAULT 0,
                messages_limit  INTEGER NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(user_id, date)
            );

            CREATE TABLE payments (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id),
                provider            TEXT NOT NULL,
                provider_order_id   TEXT NOT NULL UNIQUE,
                provider_payment_id TEXT,
                amount              TEXT NOT NULL,
                currency            TEXT NOT NULL,
                plan_id             TEXT NOT NULL,
                status              TEXT NOT NULL,
                metadata            TEXT,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                completed_at        TEXT
            );

            CREATE INDEX idx_payments_user ON payments(user_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (guest usage)");
        conn.execute_batch(
            "
            CREATE TABLE guest_usage (
                guest_id        TEXT NOT NULL,
                date            TEXT NOT NULL,
                searches_used   INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (guest_id, date)
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
