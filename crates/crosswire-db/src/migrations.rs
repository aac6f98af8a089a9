use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- One row per shared conversation. Both lookup directions (by thread
        -- id and by chat channel + root ts) are served from this table.
        CREATE TABLE IF NOT EXISTS thread_links (
            thread_id       TEXT PRIMARY KEY,
            chat_channel    TEXT NOT NULL,
            chat_ts         TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(chat_channel, chat_ts)
        );

        -- One row per person. chat_id is NULL until the identity is linked
        -- (explicitly at connect time, by email match, or as a shadow
        -- identity created for a chat-only author).
        CREATE TABLE IF NOT EXISTS identities (
            threads_id      TEXT PRIMARY KEY,
            chat_id         TEXT UNIQUE,
            display_name    TEXT NOT NULL,
            email           TEXT NOT NULL,
            avatar_url      TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Single-row credential record for the connected chat workspace.
        CREATE TABLE IF NOT EXISTS integration (
            id              INTEGER PRIMARY KEY CHECK (id = 1),
            bot_token       TEXT NOT NULL,
            bot_user_id     TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Channel list cached at connect time for the share UI.
        CREATE TABLE IF NOT EXISTS chat_channels (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL
        );

        -- Seed sample identities for the demo login rotation
        INSERT OR IGNORE INTO identities (threads_id, display_name, email, avatar_url) VALUES
            ('maria',  'Maria',  'maria@example.com',  'https://app.example.com/avatars/maria.png'),
            ('sam',    'Sam',    'sam@example.com',    'https://app.example.com/avatars/sam.png'),
            ('khadija','Khadija','khadija@example.com','https://app.example.com/avatars/khadija.png'),
            ('tom',    'Tom',    'tom@example.com',    'https://app.example.com/avatars/tom.png');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
