//! Database schema for the incremental cache
//!
//! The `cache_entries` layout (key, kind, status, fingerprint, timestamp) is what
//! makes incremental runs work; it must stay readable across releases.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Last-seen state of every page and artifact, keyed by normalized URL
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    fingerprint TEXT,
    validator TEXT,
    artifact_key TEXT,
    size INTEGER,
    last_checked TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_kind ON cache_entries(kind);
CREATE INDEX IF NOT EXISTS idx_cache_entries_checked ON cache_entries(last_checked);

-- Links found on a page during its last walk, replayed while the page is fresh
CREATE TABLE IF NOT EXISTS page_links (
    page_key TEXT NOT NULL,
    role TEXT NOT NULL,
    target TEXT NOT NULL,
    link_text TEXT NOT NULL DEFAULT '',
    signals TEXT NOT NULL DEFAULT '',
    confidence REAL NOT NULL DEFAULT 0,
    verdict TEXT,
    PRIMARY KEY (page_key, role, target)
);

CREATE INDEX IF NOT EXISTS idx_page_links_page ON page_links(page_key);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
