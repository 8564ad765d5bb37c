use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, params_from_iter};

use murmur_types::models::{Account, AccountId, Status, StatusId};

use crate::Database;
use crate::models::{AccountRow, NewStatus, StatusRow};

/// Upper bound on ids bound into a single `IN (...)` clause.
const IN_CHUNK: usize = 500;

const STATUS_COLUMNS: &str = "s.id, s.visibility, s.local, s.reblog_of_id, \
     a.id, a.username, a.domain, a.statuses_count";

impl Database {
    // -- Accounts --

    pub fn create_account(&self, username: &str, domain: Option<&str>) -> Result<AccountId> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO accounts (username, domain) VALUES (?1, ?2)",
                rusqlite::params![username, domain],
            )?;
            Ok(AccountId(conn.last_insert_rowid()))
        })
    }

    pub fn get_account(&self, id: AccountId) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, domain, statuses_count FROM accounts WHERE id = ?1",
                [id.0],
                |row| {
                    Ok(AccountRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        domain: row.get(2)?,
                        statuses_count: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Statuses --

    /// Insert a status and bump the author's and (for reblogs) the
    /// original's counters.
    pub fn insert_status(&self, new: &NewStatus) -> Result<StatusId> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO statuses (account_id, visibility, local, reblog_of_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    new.account_id.0,
                    new.visibility.as_str(),
                    new.local,
                    new.reblog_of_id.map(|id| id.0),
                ],
            )?;
            let id = tx.last_insert_rowid();

            tx.execute(
                "UPDATE accounts SET statuses_count = statuses_count + 1 WHERE id = ?1",
                [new.account_id.0],
            )?;
            if let Some(original) = new.reblog_of_id {
                tx.execute(
                    "UPDATE statuses SET reblogs_count = reblogs_count + 1 WHERE id = ?1",
                    [original.0],
                )?;
            }

            tx.commit()?;
            Ok(StatusId(id))
        })
    }

    pub fn add_tag(&self, status_id: StatusId, name: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [name])?;
            let tag_id: i64 = tx.query_row("SELECT id FROM tags WHERE name = ?1", [name], |row| row.get(0))?;
            tx.execute(
                "INSERT OR IGNORE INTO statuses_tags (status_id, tag_id) VALUES (?1, ?2)",
                [status_id.0, tag_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Silent mentions address an account without notifying it; only
    /// non-silent ones count as active.
    pub fn add_mention(&self, status_id: StatusId, account_id: AccountId, silent: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO mentions (status_id, account_id, silent) VALUES (?1, ?2, ?3)",
                rusqlite::params![status_id.0, account_id.0, silent],
            )?;
            Ok(())
        })
    }

    pub fn add_media_attachment(&self, status_id: StatusId, kind: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO media_attachments (status_id, kind) VALUES (?1, ?2)",
                rusqlite::params![status_id.0, kind],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn find_status(&self, id: StatusId) -> Result<Option<Status>> {
        Ok(self.find_statuses(&[id])?.into_iter().next())
    }

    /// Load statuses with their authors and media in one pass.
    /// Result follows input order; missing and repeated ids are dropped.
    pub fn find_statuses(&self, ids: &[StatusId]) -> Result<Vec<Status>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let mut by_id: HashMap<StatusId, Status> =
                query_statuses_where(conn, "s.id", ids)?.into_iter().map(|s| (s.id, s)).collect();

            Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
        })
    }

    /// Every reblog of the given statuses, with authors, ordered by id.
    pub fn find_reblogs(&self, ids: &[StatusId]) -> Result<Vec<Status>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let mut reblogs = query_statuses_where(conn, "s.reblog_of_id", ids)?;
            reblogs.sort_by_key(|s| s.id);
            Ok(reblogs)
        })
    }

    pub fn get_reblogs_count(&self, id: StatusId) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT reblogs_count FROM statuses WHERE id = ?1", [id.0], |row| row.get(0))
                .optional()
        })
    }

    /// Batch-fetch non-silent mentions with the mentioned accounts.
    pub fn get_active_mentions(&self, ids: &[StatusId]) -> Result<HashMap<StatusId, Vec<Account>>> {
        let mut out: HashMap<StatusId, Vec<Account>> = HashMap::new();
        if ids.is_empty() {
            return Ok(out);
        }

        self.with_conn(|conn| {
            for chunk in ids.chunks(IN_CHUNK) {
                let sql = format!(
                    "SELECT m.status_id, a.id, a.username, a.domain, a.statuses_count
                     FROM mentions m
                     JOIN accounts a ON a.id = m.account_id
                     WHERE m.silent = 0 AND m.status_id IN ({})
                     ORDER BY m.status_id, a.id",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter().map(|id| id.0)), |row| {
                    Ok((
                        StatusId(row.get(0)?),
                        AccountRow {
                            id: row.get(1)?,
                            username: row.get(2)?,
                            domain: row.get(3)?,
                            statuses_count: row.get(4)?,
                        },
                    ))
                })?;
                for row in rows {
                    let (status_id, account) = row?;
                    out.entry(status_id).or_default().push(account.into_account());
                }
            }
            Ok(out)
        })
    }

    /// Batch-fetch hashtag names as stored (original case).
    pub fn get_tag_names(&self, ids: &[StatusId]) -> Result<HashMap<StatusId, Vec<String>>> {
        let mut out: HashMap<StatusId, Vec<String>> = HashMap::new();
        if ids.is_empty() {
            return Ok(out);
        }

        self.with_conn(|conn| {
            for chunk in ids.chunks(IN_CHUNK) {
                let sql = format!(
                    "SELECT st.status_id, t.name
                     FROM statuses_tags st
                     JOIN tags t ON t.id = st.tag_id
                     WHERE st.status_id IN ({})
                     ORDER BY st.status_id, t.id",
                    placeholders(chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter().map(|id| id.0)), |row| {
                    Ok((StatusId(row.get(0)?), row.get::<_, String>(1)?))
                })?;
                for row in rows {
                    let (status_id, name) = row?;
                    out.entry(status_id).or_default().push(name);
                }
            }
            Ok(out)
        })
    }

    // -- Destruction --

    /// Destroy one status. Returns false if it was already gone.
    pub fn destroy_status(&self, status: &Status) -> Result<bool> {
        Ok(!self.destroy_statuses(std::slice::from_ref(status))?.is_empty())
    }

    /// Destroy statuses in a single transaction: either every row that
    /// still exists is removed, or none is.
    ///
    /// Returns the ids this call actually deleted. A status that another
    /// writer removed first is skipped, so concurrent destroys of the same
    /// row have exactly one winner.
    pub fn destroy_statuses(&self, statuses: &[Status]) -> Result<Vec<StatusId>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut destroyed = Vec::with_capacity(statuses.len());
            for status in statuses {
                if destroy_one(&tx, status)? {
                    destroyed.push(status.id);
                }
            }
            tx.commit()?;
            Ok(destroyed)
        })
    }
}

fn destroy_one(conn: &Connection, status: &Status) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM statuses WHERE id = ?1", [status.id.0])?;
    if deleted == 0 {
        return Ok(false);
    }

    // Batch removals skip counter upkeep
    if !status.mass_destruction {
        conn.execute(
            "UPDATE accounts SET statuses_count = MAX(statuses_count - 1, 0) WHERE id = ?1",
            [status.account.id.0],
        )?;
        if let Some(original) = status.reblog_of_id {
            conn.execute(
                "UPDATE statuses SET reblogs_count = MAX(reblogs_count - 1, 0) WHERE id = ?1",
                [original.0],
            )?;
        }
    }

    Ok(true)
}

/// Load statuses where `column IN ids`, with authors joined and media
/// fetched in a second batched query (no N+1).
fn query_statuses_where(conn: &Connection, column: &str, ids: &[StatusId]) -> Result<Vec<Status>> {
    let mut rows = Vec::new();
    for chunk in ids.chunks(IN_CHUNK) {
        let sql = format!(
            "SELECT {STATUS_COLUMNS}
             FROM statuses s
             JOIN accounts a ON a.id = s.account_id
             WHERE {column} IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let chunk_rows = stmt
            .query_map(params_from_iter(chunk.iter().map(|id| id.0)), map_status_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.extend(chunk_rows);
    }

    let status_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut media = query_media(conn, &status_ids)?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let attachments = media.remove(&row.id).unwrap_or_default();
            row.into_status(attachments)
        })
        .collect())
}

fn map_status_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatusRow> {
    let visibility: String = row.get(1)?;
    let visibility = visibility.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(StatusRow {
        id: row.get(0)?,
        visibility,
        local: row.get(2)?,
        reblog_of_id: row.get(3)?,
        account: AccountRow {
            id: row.get(4)?,
            username: row.get(5)?,
            domain: row.get(6)?,
            statuses_count: row.get(7)?,
        },
    })
}

fn query_media(conn: &Connection, status_ids: &[i64]) -> Result<HashMap<i64, Vec<i64>>> {
    let mut out: HashMap<i64, Vec<i64>> = HashMap::new();
    for chunk in status_ids.chunks(IN_CHUNK) {
        let sql = format!(
            "SELECT status_id, id FROM media_attachments WHERE status_id IN ({}) ORDER BY id",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status_id, media_id) = row?;
            out.entry(status_id).or_default().push(media_id);
        }
    }
    Ok(out)
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
