//! Concept repository with lookup-or-create by exact name.

use chrono::Utc;
use rusqlite::{params, Row};

use super::{format_timestamp, Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub ai_summary: Option<String>,
    pub created_at: String,
}

impl ConceptRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            category: row.get("category")?,
            ai_summary: row.get("ai_summary")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn find_by_name(db: &Database, name: &str) -> Result<Option<ConceptRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM concepts WHERE name = ?1")?;
        let mut rows = stmt.query_map(params![name], ConceptRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn insert(db: &Database, concept: &ConceptRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO concepts (id, name, description, category, ai_summary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                concept.id,
                concept.name,
                concept.description,
                concept.category,
                concept.ai_summary,
                concept.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Returns the concept named `name`, creating it if absent.
///
/// A concurrent creator losing the race on the UNIQUE constraint gets the
/// winner's row back. The boolean is `true` when this call created the row.
pub fn find_or_create(db: &Database, name: &str) -> Result<(ConceptRow, bool), DatabaseError> {
    if let Some(existing) = find_by_name(db, name)? {
        return Ok((existing, false));
    }

    let concept = ConceptRow {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: None,
        category: None,
        ai_summary: None,
        created_at: format_timestamp(Utc::now()),
    };

    match insert(db, &concept) {
        Ok(()) => Ok((concept, true)),
        Err(e) if e.is_constraint_violation() => {
            log::debug!("Concept '{}' created concurrently, re-reading", name);
            find_by_name(db, name)?
                .map(|row| (row, false))
                .ok_or_else(|| {
                    DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows)
                })
        }
        Err(e) => Err(e),
    }
}

/// Fills in the descriptive columns of an existing concept. Returns `false`
/// when no concept has that id.
pub fn set_details(
    db: &Database,
    id: &str,
    description: Option<&str>,
    category: Option<&str>,
    ai_summary: Option<&str>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE concepts SET description = ?2, category = ?3, ai_summary = ?4 WHERE id = ?1",
            params![id, description, category, ai_summary],
        )?;
        Ok(changed > 0)
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let n: u64 = conn.query_row("SELECT COUNT(*) FROM concepts", [], |r| r.get(0))?;
        Ok(n)
    })
}
