//! SQLite cache implementation

use crate::cache::schema::initialize_schema;
use crate::cache::traits::{CacheError, CacheResult, CacheStore};
use crate::cache::{
    format_timestamp, parse_timestamp, CacheEntry, CacheStats, CacheStatus, EntryKind, LinkRole,
    PageLinkRecord, RunRecord, RunStatus,
};
use crate::classifier::signals::{signals_from_db_string, signals_to_db_string};
use crate::classifier::Verdict;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite cache backend
///
/// One connection behind a mutex; every operation holds the lock only for its own
/// statement (or transaction), which also serializes lookups and records of the
/// same key.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Opens or creates the cache database at `path`
    pub fn new(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> CacheResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<(CacheEntry, String, String, String)> {
    let key: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let status: String = row.get(2)?;
    let last_checked: String = row.get(7)?;
    let size: Option<i64> = row.get(6)?;

    Ok((
        CacheEntry {
            key,
            kind: EntryKind::Page,
            status: CacheStatus::Unknown,
            fingerprint: row.get(3)?,
            validator: row.get(4)?,
            artifact_key: row.get(5)?,
            size: size.map(|s| s.max(0) as u64),
            last_checked: Utc::now(),
        },
        kind,
        status,
        last_checked,
    ))
}

fn decode_entry(raw: (CacheEntry, String, String, String)) -> CacheResult<CacheEntry> {
    let (mut entry, kind, status, last_checked) = raw;
    let corrupt = |message: String| CacheError::Corrupt {
        key: entry.key.clone(),
        message,
    };

    entry.kind =
        EntryKind::from_db_string(&kind).ok_or_else(|| corrupt(format!("unknown kind '{}'", kind)))?;
    entry.status = CacheStatus::from_db_string(&status)
        .ok_or_else(|| corrupt(format!("unknown status '{}'", status)))?;
    entry.last_checked = parse_timestamp(&last_checked)
        .ok_or_else(|| corrupt(format!("bad timestamp '{}'", last_checked)))?;
    Ok(entry)
}

fn upsert_entry(conn: &Connection, entry: &CacheEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cache_entries
             (key, kind, status, fingerprint, validator, artifact_key, size, last_checked)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(key) DO UPDATE SET
             kind = excluded.kind,
             status = excluded.status,
             fingerprint = COALESCE(excluded.fingerprint, cache_entries.fingerprint),
             validator = COALESCE(excluded.validator, cache_entries.validator),
             artifact_key = COALESCE(excluded.artifact_key, cache_entries.artifact_key),
             size = COALESCE(excluded.size, cache_entries.size),
             last_checked = excluded.last_checked",
        params![
            entry.key,
            entry.kind.to_db_string(),
            entry.status.to_db_string(),
            entry.fingerprint,
            entry.validator,
            entry.artifact_key,
            entry.size.map(|s| s as i64),
            format_timestamp(&entry.last_checked),
        ],
    )?;
    Ok(())
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
    })
}

impl CacheStore for SqliteCache {
    // ===== Entries =====

    fn lookup(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT key, kind, status, fingerprint, validator, artifact_key, size, last_checked
                 FROM cache_entries WHERE key = ?1",
                params![key],
                entry_from_row,
            )
            .optional()?;
        drop(conn);

        raw.map(decode_entry).transpose()
    }

    fn record(&self, entry: &CacheEntry) -> CacheResult<()> {
        let conn = self.conn()?;
        upsert_entry(&conn, entry)?;
        Ok(())
    }

    fn touch(&self, key: &str, at: DateTime<Utc>) -> CacheResult<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE cache_entries SET status = ?1, last_checked = ?2 WHERE key = ?3",
            params![CacheStatus::Fresh.to_db_string(), format_timestamp(&at), key],
        )?;
        Ok(updated > 0)
    }

    fn prune(&self, older_than: DateTime<Utc>) -> CacheResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM cache_entries WHERE last_checked < ?1",
            params![format_timestamp(&older_than)],
        )?;
        tx.execute(
            "DELETE FROM page_links WHERE page_key NOT IN (SELECT key FROM cache_entries)",
            [],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    // ===== Page links =====

    fn record_walk(&self, pages: &[(CacheEntry, Vec<PageLinkRecord>)]) -> CacheResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for (entry, links) in pages {
            upsert_entry(&tx, entry)?;
            tx.execute("DELETE FROM page_links WHERE page_key = ?1", params![entry.key])?;

            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO page_links
                     (page_key, role, target, link_text, signals, confidence, verdict)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for link in links {
                stmt.execute(params![
                    entry.key,
                    link.role.to_db_string(),
                    link.target,
                    link.link_text,
                    signals_to_db_string(&link.signals),
                    link.confidence,
                    link.verdict.map(|v| v.to_db_string()),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn page_links(&self, page_key: &str) -> CacheResult<Vec<PageLinkRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT role, target, link_text, signals, confidence, verdict
             FROM page_links WHERE page_key = ?1 ORDER BY rowid",
        )?;

        let rows = stmt.query_map(params![page_key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut links = Vec::new();
        for row in rows {
            let (role, target, link_text, signals, confidence, verdict) = row?;
            let Some(role) = LinkRole::from_db_string(&role) else {
                continue;
            };
            links.push(PageLinkRecord {
                role,
                target,
                link_text,
                signals: signals_from_db_string(&signals),
                confidence,
                verdict: verdict.as_deref().and_then(Verdict::from_db_string),
            });
        }

        Ok(links)
    }

    // ===== Runs =====

    fn create_run(&self, config_hash: &str) -> CacheResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![
                format_timestamp(&Utc::now()),
                config_hash,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(&self, run_id: i64, status: RunStatus) -> CacheResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), format_timestamp(&Utc::now()), run_id],
        )?;
        if updated == 0 {
            return Err(CacheError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> CacheResult<RunRecord> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
            params![run_id],
            run_from_row,
        )
        .optional()?
        .ok_or(CacheError::RunNotFound(run_id))
    }

    // ===== Statistics =====

    fn stats(&self, fresh_since: DateTime<Utc>) -> CacheResult<CacheStats> {
        let conn = self.conn()?;
        let since = format_timestamp(&fresh_since);

        let count = |sql: &str, kind: &str| -> rusqlite::Result<u64> {
            conn.query_row(sql, params![kind, since], |row| row.get::<_, i64>(0))
                .map(|n| n.max(0) as u64)
        };

        let total = "SELECT COUNT(*) FROM cache_entries WHERE kind = ?1 AND ?2 = ?2";
        let fresh = "SELECT COUNT(*) FROM cache_entries
                     WHERE kind = ?1 AND status = 'fresh' AND last_checked >= ?2";

        let recorded_links: i64 =
            conn.query_row("SELECT COUNT(*) FROM page_links", [], |row| row.get(0))?;
        let runs: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;

        Ok(CacheStats {
            pages: count(total, EntryKind::Page.to_db_string())?,
            artifacts: count(total, EntryKind::Artifact.to_db_string())?,
            fresh_pages: count(fresh, EntryKind::Page.to_db_string())?,
            fresh_artifacts: count(fresh, EntryKind::Artifact.to_db_string())?,
            recorded_links: recorded_links.max(0) as u64,
            runs: runs.max(0) as u64,
        })
    }
}
