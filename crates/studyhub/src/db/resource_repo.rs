//! Resource repository. The pipeline only reads resources and updates
//! `rag_content` / `ai_processing_status`; `insert` exists for the CLI and tests.

use chrono::Utc;
use rusqlite::{params, Row};

use super::{format_timestamp, Database, DatabaseError};

/// A raw resource row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRow {
    pub id: String,
    pub title: String,
    pub course_title: Option<String>,
    pub uploader: Option<String>,
    pub file_url: Option<String>,
    pub file_path: Option<String>,
    pub file_type: Option<String>,
    pub rag_content: Option<String>,
    pub ai_processing_status: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ResourceRow {
    /// Builds a bare resource stamped with the current time.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = format_timestamp(Utc::now());
        Self {
            id: id.into(),
            title: title.into(),
            course_title: None,
            uploader: None,
            file_url: None,
            file_path: None,
            file_type: None,
            rag_content: None,
            ai_processing_status: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// The location the pipeline should read from: the local path when
    /// present, else the URL.
    pub fn source_location(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.file_url.as_deref().filter(|u| !u.is_empty()))
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            course_title: row.get("course_title")?,
            uploader: row.get("uploader")?,
            file_url: row.get("file_url")?,
            file_path: row.get("file_path")?,
            file_type: row.get("file_type")?,
            rag_content: row.get("rag_content")?,
            ai_processing_status: row.get("ai_processing_status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// A single hit from [`search_rag_content`].
#[derive(Debug, Clone, PartialEq)]
pub struct RagHit {
    pub resource_id: String,
    pub title: String,
    pub rag_content: String,
}

pub fn insert(db: &Database, resource: &ResourceRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO resources (id, title, course_title, uploader, file_url, file_path,
             file_type, rag_content, ai_processing_status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                resource.id,
                resource.title,
                resource.course_title,
                resource.uploader,
                resource.file_url,
                resource.file_path,
                resource.file_type,
                resource.rag_content,
                resource.ai_processing_status,
                resource.created_at,
                resource.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ResourceRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM resources WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ResourceRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Overwrites `rag_content`. Returns `false` when the resource does not exist.
pub fn set_rag_content(db: &Database, id: &str, content: &str) -> Result<bool, DatabaseError> {
    let now = format_timestamp(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE resources SET rag_content = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, content, now],
        )?;
        Ok(changed > 0)
    })
}

/// Overwrites `ai_processing_status`. Returns `false` when the resource does not exist.
pub fn set_ai_processing_status(
    db: &Database,
    id: &str,
    status: &str,
) -> Result<bool, DatabaseError> {
    let now = format_timestamp(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE resources SET ai_processing_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status, now],
        )?;
        Ok(changed > 0)
    })
}

/// Case-insensitive substring search over `rag_content`, most recently
/// updated resources first.
pub fn search_rag_content(
    db: &Database,
    query: &str,
    limit: usize,
) -> Result<Vec<RagHit>, DatabaseError> {
    let pattern = format!("%{}%", escape_like(query));
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, title, rag_content FROM resources
             WHERE rag_content IS NOT NULL AND rag_content LIKE ?1 ESCAPE '\\'
             ORDER BY updated_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![pattern, limit as i64], |row| {
                Ok(RagHit {
                    resource_id: row.get(0)?,
                    title: row.get(1)?,
                    rag_content: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
