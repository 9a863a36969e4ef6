use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE password_resets (
                token_hash  TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at  TEXT NOT NULL
            );

            CREATE TABLE wishlists (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                event_date  TEXT,
                share_slug  TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_wishlists_owner
                ON wishlists(user_id, created_at);

            CREATE TABLE items (
                id              TEXT PRIMARY KEY,
                wishlist_id     TEXT NOT NULL REFERENCES wishlists(id) ON DELETE CASCADE,
                product_name    TEXT NOT NULL,
                product_url     TEXT NOT NULL DEFAULT '',
                price           TEXT NOT NULL DEFAULT '',
                image_url       TEXT,
                held_by         TEXT,
                held_by_email   TEXT,
                held_until      TEXT,
                is_fulfilled    INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_items_wishlist
                ON items(wishlist_id, created_at);

            CREATE TABLE event_subscribers (
                id           TEXT PRIMARY KEY,
                wishlist_id  TEXT NOT NULL REFERENCES wishlists(id) ON DELETE CASCADE,
                email        TEXT NOT NULL COLLATE NOCASE,
                created_at   TEXT NOT NULL,
                reminded_at  TEXT,
                UNIQUE(wishlist_id, email)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (image uploads)");
        conn.execute_batch(
            "
            CREATE TABLE images (
                name        TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_items_image
                ON items(image_url);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
