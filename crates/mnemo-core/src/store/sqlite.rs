//! Metadata store (C3), backed by SQLite.
//!
//! Durable key to record map with scope, tag and content-hash indices, grounded in the
//! teacher's `rusqlite`-based storage layer (connection configuration, permission
//! hardening, migrations-as-SQL-const pattern).

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::Memory;
use crate::scope::ScopeFilter;
use crate::value::Value;

use super::migrations;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("record not found: {0}")]
    NotFound(String),
}

/// A page of records plus a cursor for the next page, ordered by `(created_at desc,
/// id)`.
#[derive(Debug, Clone)]
pub struct Page {
    pub limit: usize,
    pub cursor: Option<(DateTime<Utc>, String)>,
}

impl Page {
    pub fn first(limit: usize) -> Self {
        Page { limit, cursor: None }
    }
}

#[derive(Debug, Clone)]
pub struct PageResult {
    pub items: Vec<Memory>,
    pub next_cursor: Option<(DateTime<Utc>, String)>,
}

/// A partial update applied atomically by [`MetadataStore::update`].
#[derive(Debug, Clone, Default)]
pub struct Patch {
    pub content: Option<String>,
    pub content_hash: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<Option<String>>,
    pub metadata: Option<crate::value::Metadata>,
    pub scope: Option<String>,
    pub has_embedding: Option<bool>,
}

pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::ToSqlConversionFailure(Box::new(e))
            })?;
        }

        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        migrations::apply(&conn)?;

        #[cfg(unix)]
        harden_permissions(path);

        Ok(MetadataStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        migrations::apply(&conn)?;
        Ok(MetadataStore {
            conn: Mutex::new(conn),
        })
    }

    /// Atomic insert of a brand-new record.
    pub fn put(&self, record: &Memory) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memories
                (id, content, scope, tags, category, metadata, content_hash,
                 created_at, updated_at, seq, has_embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id,
                record.content,
                record.scope,
                serde_json::to_string(&record.tags)?,
                record.category,
                serde_json::to_string(&record.metadata)?,
                record.content_hash,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                record.seq,
                record.has_embedding as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Memory>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, content, scope, tags, category, metadata, content_hash,
                        created_at, updated_at, seq, has_embedding
                 FROM memories WHERE id = ?1",
                params![id],
                row_to_memory,
            )
            .optional()?;
        Ok(row)
    }

    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Atomic per-record patch of the fields the caller supplied.
    pub fn update(&self, id: &str, patch: &Patch) -> Result<Memory, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut existing = conn
            .query_row(
                "SELECT id, content, scope, tags, category, metadata, content_hash,
                        created_at, updated_at, seq, has_embedding
                 FROM memories WHERE id = ?1",
                params![id],
                row_to_memory,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(content) = &patch.content {
            existing.content = content.clone();
        }
        if let Some(hash) = &patch.content_hash {
            existing.content_hash = hash.clone();
        }
        if let Some(tags) = &patch.tags {
            existing.tags = tags.clone();
        }
        if let Some(category) = &patch.category {
            existing.category = category.clone();
        }
        if let Some(metadata) = &patch.metadata {
            existing.metadata = metadata.clone();
        }
        if let Some(scope) = &patch.scope {
            existing.scope = scope.clone();
        }
        if let Some(has_embedding) = patch.has_embedding {
            existing.has_embedding = has_embedding;
        }
        existing.updated_at = Utc::now();

        conn.execute(
            "UPDATE memories SET content = ?1, scope = ?2, tags = ?3, category = ?4,
                metadata = ?5, content_hash = ?6, updated_at = ?7, has_embedding = ?8
             WHERE id = ?9",
            params![
                existing.content,
                existing.scope,
                serde_json::to_string(&existing.tags)?,
                existing.category,
                serde_json::to_string(&existing.metadata)?,
                existing.content_hash,
                existing.updated_at.to_rfc3339(),
                existing.has_embedding as i64,
                id,
            ],
        )?;

        Ok(existing)
    }

    pub fn find_by_content_hash(&self, hash: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM memories WHERE content_hash = ?1")?;
        let ids = stmt
            .query_map(params![hash], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn count(&self, scope_filter: &ScopeFilter) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        match scope_filter {
            ScopeFilter::Any => {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
                Ok(n as usize)
            }
            ScopeFilter::Exact(scope) => {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE scope = ?1",
                    params![scope.as_str()],
                    |r| r.get(0),
                )?;
                Ok(n as usize)
            }
            ScopeFilter::Prefix(scope) => {
                let mut stmt = conn.prepare("SELECT scope FROM memories")?;
                let scopes = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(scopes
                    .iter()
                    .filter(|s| crate::scope::is_ancestor(scope.as_str(), s))
                    .count())
            }
        }
    }

    /// Paginate by `(created_at desc, id)` with a stable cursor.
    pub fn find_by_scope(
        &self,
        scope_filter: &ScopeFilter,
        page: &Page,
    ) -> Result<PageResult, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, content, scope, tags, category, metadata, content_hash,
                    created_at, updated_at, seq, has_embedding
             FROM memories
             ORDER BY created_at DESC, id ASC",
        )?;

        let rows = stmt
            .query_map([], row_to_memory)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut matching: Vec<Memory> = rows
            .into_iter()
            .filter(|m| scope_filter.matches(&m.scope))
            .collect();

        if let Some((after_created_at, after_id)) = &page.cursor {
            matching.retain(|m| {
                m.created_at < *after_created_at
                    || (m.created_at == *after_created_at && m.id.as_str() > after_id.as_str())
            });
        }

        let next_cursor = if matching.len() > page.limit {
            matching
                .get(page.limit - 1)
                .map(|m| (m.created_at, m.id.clone()))
        } else {
            None
        };
        matching.truncate(page.limit);

        Ok(PageResult {
            items: matching,
            next_cursor,
        })
    }

    pub fn all_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM memories")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let tags_json: String = row.get(3)?;
    let metadata_json: String = row.get(5)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;

    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let metadata: std::collections::BTreeMap<String, Value> =
        serde_json::from_str(&metadata_json).unwrap_or_default();

    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        scope: row.get(2)?,
        tags,
        category: row.get(4)?,
        metadata,
        content_hash: row.get(6)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        seq: row.get(9)?,
        has_embedding: row.get::<_, i64>(10)? != 0,
    })
}

fn configure_connection(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

#[cfg(unix)]
fn harden_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(parent) = path.parent() {
        let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
    }
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
}
