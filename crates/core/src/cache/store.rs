//! Versioned cache generations.
//!
//! Every deployment writes into its own generation, named by a
//! [`CacheVersion`]. Exactly one generation is current at a time; lookups
//! that don't ask otherwise only see the current one. Entries are replaced
//! wholesale by key, never patched, so concurrent writers for the same key
//! simply leave the last write in place.

use super::connection::CacheDb;
use super::key::RequestKey;
use crate::{Error, now_iso8601};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// Identifier of one cache generation, e.g. `student-portal-v1.2.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct CacheVersion(String);

impl CacheVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Build the `<app-name>-v<semver>` identifier used for deployments.
    pub fn for_build(app_name: &str, semver: &str) -> Self {
        Self(format!("{app_name}-v{semver}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof that a generation exists; required for writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHandle {
    version: CacheVersion,
}

impl CacheHandle {
    pub fn version(&self) -> &CacheVersion {
        &self.version
    }
}

/// Owned snapshot of a response as it was when stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StoredResponse {
    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A stored request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheEntry {
    pub version: CacheVersion,
    pub key: RequestKey,
    pub response: StoredResponse,
    pub stored_at: String,
    pub precached: bool,
}

/// Summary row for one generation.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Generation {
    pub version: CacheVersion,
    pub created_at: String,
    pub is_current: bool,
    pub entries: u64,
}

/// Which generations a lookup may search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchScope {
    #[default]
    Current,
    /// Every generation, current first, then newest entry first.
    All,
}

/// Outcome of [`CacheDb::delete_all_except`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DeleteReport {
    pub deleted: Vec<CacheVersion>,
    pub failed: Vec<(CacheVersion, String)>,
}

struct RawEntry {
    version: String,
    key_hash: String,
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
    stored_at: String,
    precached: bool,
}

impl RawEntry {
    const COLUMNS: &'static str =
        "e.version, e.key_hash, e.method, e.url, e.status, e.headers_json, e.body, e.stored_at, e.precached";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            version: row.get(0)?,
            key_hash: row.get(1)?,
            method: row.get(2)?,
            url: row.get(3)?,
            status: row.get(4)?,
            headers_json: row.get(5)?,
            body: row.get(6)?,
            stored_at: row.get(7)?,
            precached: row.get::<_, i64>(8)? == 1,
        })
    }

    fn into_entry(self) -> Result<CacheEntry, Error> {
        let headers: Vec<(String, String)> = serde_json::from_str(&self.headers_json)
            .map_err(|e| Error::CorruptEntry(format!("{}: {e}", self.url)))?;
        let status = u16::try_from(self.status)
            .map_err(|_| Error::CorruptEntry(format!("{}: status {}", self.url, self.status)))?;

        Ok(CacheEntry {
            version: CacheVersion(self.version),
            key: RequestKey { method: self.method, url: self.url, hash: self.key_hash },
            response: StoredResponse { status, headers, body: self.body },
            stored_at: self.stored_at,
            precached: self.precached,
        })
    }
}

fn upsert_entry(
    conn: &rusqlite::Connection, version: &str, key: &RequestKey, response: &StoredResponse, headers_json: &str,
    stored_at: &str, precached: bool,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO entries (version, key_hash, method, url, status, headers_json, body, stored_at, precached)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(version, key_hash) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at,
            precached = MAX(entries.precached, excluded.precached)",
        params![
            version,
            &key.hash,
            &key.method,
            &key.url,
            response.status as i64,
            headers_json,
            &response.body,
            stored_at,
            precached as i64,
        ],
    )
}

fn encode_headers(response: &StoredResponse) -> Result<String, Error> {
    serde_json::to_string(&response.headers).map_err(|e| Error::InvalidInput(format!("unserializable headers: {e}")))
}

impl CacheDb {
    /// Open (creating if needed) the generation named `version`.
    ///
    /// Opening never changes which generation is current.
    pub async fn open_generation(&self, version: &CacheVersion) -> Result<CacheHandle, Error> {
        let name = version.as_str().to_string();
        let created_at = now_iso8601();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO generations (version, created_at, is_current) VALUES (?1, ?2, 0)",
                    params![name, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheHandle { version: version.clone() })
    }

    /// Handle for an existing generation.
    pub async fn handle(&self, version: &CacheVersion) -> Result<CacheHandle, Error> {
        let name = version.as_str().to_string();
        let exists = self
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM generations WHERE version = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)?;

        if exists {
            Ok(CacheHandle { version: version.clone() })
        } else {
            Err(Error::UnknownGeneration(version.to_string()))
        }
    }

    /// Handle for the current generation, if one has been activated.
    pub async fn current_handle(&self) -> Result<Option<CacheHandle>, Error> {
        Ok(self.current_generation().await?.map(|version| CacheHandle { version }))
    }

    /// Store a snapshot of `response` under `key`, replacing any previous entry.
    pub async fn put(&self, handle: &CacheHandle, key: &RequestKey, response: &StoredResponse) -> Result<(), Error> {
        let version = handle.version.as_str().to_string();
        let key = key.clone();
        let response = response.clone();
        let headers_json = encode_headers(&response)?;
        let stored_at = now_iso8601();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                upsert_entry(conn, &version, &key, &response, &headers_json, &stored_at, false)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Create `version` and store every precached entry in one transaction.
    ///
    /// Either the generation ends up holding all entries or the database is
    /// left exactly as it was.
    pub async fn precache(
        &self, version: &CacheVersion, entries: Vec<(RequestKey, StoredResponse)>,
    ) -> Result<CacheHandle, Error> {
        let name = version.as_str().to_string();
        let encoded = entries
            .into_iter()
            .map(|(key, response)| encode_headers(&response).map(|h| (key, response, h)))
            .collect::<Result<Vec<_>, _>>()?;
        let now = now_iso8601();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO generations (version, created_at, is_current) VALUES (?1, ?2, 0)",
                    params![name, now],
                )?;
                for (key, response, headers_json) in &encoded {
                    upsert_entry(&tx, &name, key, response, headers_json, &now, true)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheHandle { version: version.clone() })
    }

    /// Look up `key`.
    ///
    /// With [`MatchScope::Current`] only the current generation is searched,
    /// so nothing matches before the first activation.
    pub async fn match_request(&self, key: &RequestKey, scope: MatchScope) -> Result<Option<CacheEntry>, Error> {
        let hash = key.hash.clone();
        let sql = match scope {
            MatchScope::Current => format!(
                "SELECT {} FROM entries e JOIN generations g ON g.version = e.version
                WHERE g.is_current = 1 AND e.key_hash = ?1",
                RawEntry::COLUMNS
            ),
            MatchScope::All => format!(
                "SELECT {} FROM entries e JOIN generations g ON g.version = e.version
                WHERE e.key_hash = ?1
                ORDER BY g.is_current DESC, e.stored_at DESC
                LIMIT 1",
                RawEntry::COLUMNS
            ),
        };

        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let raw = conn.query_row(&sql, params![hash], RawEntry::from_row).optional()?;
                Ok(raw)
            })
            .await
            .map_err(Error::from)?;

        raw.map(RawEntry::into_entry).transpose()
    }

    /// Look up `key` in one specific generation.
    pub async fn match_in(&self, handle: &CacheHandle, key: &RequestKey) -> Result<Option<CacheEntry>, Error> {
        let version = handle.version.as_str().to_string();
        let hash = key.hash.clone();
        let sql = format!("SELECT {} FROM entries e WHERE e.version = ?1 AND e.key_hash = ?2", RawEntry::COLUMNS);

        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawEntry>, Error> {
                let raw = conn.query_row(&sql, params![version, hash], RawEntry::from_row).optional()?;
                Ok(raw)
            })
            .await
            .map_err(Error::from)?;

        raw.map(RawEntry::into_entry).transpose()
    }

    /// The version currently serving lookups.
    pub async fn current_generation(&self) -> Result<Option<CacheVersion>, Error> {
        self.conn
            .call(|conn| -> Result<Option<CacheVersion>, Error> {
                let version: Option<String> = conn
                    .query_row("SELECT version FROM generations WHERE is_current = 1 LIMIT 1", [], |row| row.get(0))
                    .optional()?;
                Ok(version.map(CacheVersion))
            })
            .await
            .map_err(Error::from)
    }

    /// Make `version` the only current generation.
    ///
    /// The flag moves in a single statement, so no reader ever sees two
    /// current generations or none.
    pub async fn promote(&self, version: &CacheVersion) -> Result<(), Error> {
        let name = version.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM generations WHERE version = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(Error::UnknownGeneration(name));
                }
                tx.execute(
                    "UPDATE generations SET is_current = CASE WHEN version = ?1 THEN 1 ELSE 0 END",
                    params![name],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Every generation in creation order.
    pub async fn list_generations(&self) -> Result<Vec<Generation>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<Generation>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT g.version, g.created_at, g.is_current, COUNT(e.key_hash)
                    FROM generations g LEFT JOIN entries e ON e.version = g.version
                    GROUP BY g.version
                    ORDER BY g.created_at ASC, g.version ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(Generation {
                        version: CacheVersion(row.get(0)?),
                        created_at: row.get(1)?,
                        is_current: row.get::<_, i64>(2)? == 1,
                        entries: row.get::<_, i64>(3)? as u64,
                    })
                })?;
                let generations = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(generations)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one generation and, by cascade, all of its entries.
    ///
    /// Returns false if the generation did not exist.
    pub async fn delete_generation(&self, version: &CacheVersion) -> Result<bool, Error> {
        let name = version.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM generations WHERE version = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every generation except `keep`.
    ///
    /// Each generation is deleted on its own; a failure is recorded in the
    /// report and the remaining generations are still attempted. `keep` must
    /// exist, so the store is never emptied.
    pub async fn delete_all_except(&self, keep: &CacheVersion) -> Result<DeleteReport, Error> {
        self.handle(keep).await?;

        let mut report = DeleteReport::default();
        for generation in self.list_generations().await? {
            if &generation.version == keep {
                continue;
            }
            match self.delete_generation(&generation.version).await {
                Ok(_) => report.deleted.push(generation.version),
                Err(e) => {
                    tracing::warn!(version = %generation.version, error = %e, "failed to delete stale generation");
                    report.failed.push((generation.version, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Number of entries stored in `version`.
    pub async fn count_entries(&self, version: &CacheVersion) -> Result<u64, Error> {
        let name = version.as_str().to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE version = ?1", params![name], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Evict the oldest runtime entries until at most `max_entries` remain.
    ///
    /// Precached entries don't count towards the limit and are never evicted.
    /// Returns the number of deleted entries.
    pub async fn trim_generation(&self, version: &CacheVersion, max_entries: usize) -> Result<u64, Error> {
        let name = version.as_str().to_string();
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE version = ?1 AND precached = 0",
                    params![name],
                    |row| row.get(0),
                )?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE rowid IN (
                        SELECT rowid FROM entries WHERE version = ?1 AND precached = 0
                        ORDER BY stored_at ASC, rowid ASC LIMIT ?2
                    )",
                    params![name, to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete runtime entries of `version` whose URL starts with `prefix`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_by_prefix(&self, version: &CacheVersion, prefix: &str) -> Result<u64, Error> {
        let name = version.as_str().to_string();
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries
                    WHERE version = ?1 AND precached = 0 AND substr(url, 1, length(?2)) = ?2",
                    params![name, prefix],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
