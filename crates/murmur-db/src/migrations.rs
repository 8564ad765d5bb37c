use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE accounts (
                id              INTEGER PRIMARY KEY,
                username        TEXT NOT NULL,
                domain          TEXT,
                statuses_count  INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(username, domain)
            );

            -- Reblogs never cascade away with their original; removal
            -- destroys them explicitly in the same batch.
            CREATE TABLE statuses (
                id              INTEGER PRIMARY KEY,
                account_id      INTEGER NOT NULL REFERENCES accounts(id),
                visibility      TEXT NOT NULL DEFAULT 'public',
                local           INTEGER NOT NULL DEFAULT 1,
                reblog_of_id    INTEGER REFERENCES statuses(id) ON DELETE SET NULL,
                reblogs_count   INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_statuses_reblog_of ON statuses(reblog_of_id);

            CREATE TABLE mentions (
                status_id   INTEGER NOT NULL REFERENCES statuses(id) ON DELETE CASCADE,
                account_id  INTEGER NOT NULL REFERENCES accounts(id),
                silent      INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (status_id, account_id)
            );

            CREATE TABLE tags (
                id      INTEGER PRIMARY KEY,
                name    TEXT NOT NULL UNIQUE COLLATE NOCASE
            );

            CREATE TABLE statuses_tags (
                status_id   INTEGER NOT NULL REFERENCES statuses(id) ON DELETE CASCADE,
                tag_id      INTEGER NOT NULL REFERENCES tags(id),
                PRIMARY KEY (status_id, tag_id)
            );

            CREATE TABLE media_attachments (
                id          INTEGER PRIMARY KEY,
                status_id   INTEGER NOT NULL REFERENCES statuses(id) ON DELETE CASCADE,
                kind        TEXT NOT NULL DEFAULT 'image'
            );

            CREATE INDEX idx_media_status ON media_attachments(status_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
