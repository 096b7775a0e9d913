//! Persistence for the `analysis_jobs` table.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub resource_id: String,
    pub status: String,
    pub progress: u8,
    pub current_stage: Option<String>,
    /// JSON-encoded pipeline results.
    pub results: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            resource_id: row.get("resource_id")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            current_stage: row.get("current_stage")?,
            results: row.get("results")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_row(conn, job))
}

/// Inserts `job` unless its resource already has a job in one of
/// `active_statuses`, in which case the newest such row is returned and
/// nothing is written. Lookup and insert run in one IMMEDIATE transaction,
/// so a second process cannot slip a row in between them.
pub fn insert_unless_active(
    db: &Database,
    job: &JobRow,
    active_statuses: &[&str],
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        if !active_statuses.is_empty() {
            let placeholders = (0..active_statuses.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT * FROM analysis_jobs WHERE resource_id = ?1 AND status IN ({})
                 ORDER BY created_at DESC LIMIT 1",
                placeholders
            );
            let values = std::iter::once(job.resource_id.as_str()).chain(active_statuses.iter().copied());
            let existing = tx
                .query_row(&sql, params_from_iter(values), JobRow::from_row)
                .optional()?;
            if existing.is_some() {
                return Ok(existing);
            }
        }
        insert_row(&tx, job)?;
        tx.commit()?;
        Ok(None)
    })
}

fn insert_row(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO analysis_jobs (id, resource_id, status, progress, current_stage, results,
         error_message, created_at, started_at, completed_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            job.id,
            job.resource_id,
            job.status,
            job.progress,
            job.current_stage,
            job.results,
            job.error_message,
            job.created_at,
            job.started_at,
            job.completed_at,
            job.updated_at,
        ],
    )?;
    Ok(())
}

/// Updates an existing job row. All fields except `id`, `resource_id` and
/// `created_at` are overwritten.
pub fn update(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE analysis_jobs SET status=?2, progress=?3, current_stage=?4, results=?5,
             error_message=?6, started_at=?7, completed_at=?8, updated_at=?9
             WHERE id=?1",
            params![
                job.id,
                job.status,
                job.progress,
                job.current_stage,
                job.results,
                job.error_message,
                job.started_at,
                job.completed_at,
                job.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM analysis_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns the newest job for a resource whose status is one of `statuses`.
pub fn find_latest_for_resource_with_status(
    db: &Database,
    resource_id: &str,
    statuses: &[&str],
) -> Result<Option<JobRow>, DatabaseError> {
    Ok(list_with_status(db, Some(resource_id), statuses, None)?
        .into_iter()
        .next())
}

/// Lists every job for a resource, newest first.
pub fn list_for_resource(db: &Database, resource_id: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM analysis_jobs WHERE resource_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![resource_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists jobs in any of `statuses`, optionally restricted to one resource and
/// to rows last updated strictly before `updated_before`. Newest first.
pub fn list_with_status(
    db: &Database,
    resource_id: Option<&str>,
    statuses: &[&str],
    updated_before: Option<&str>,
) -> Result<Vec<JobRow>, DatabaseError> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    db.with_conn(|conn| {
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        let placeholders: Vec<String> = statuses
            .iter()
            .map(|s| {
                param_values.push(Box::new(s.to_string()));
                format!("?{}", param_values.len())
            })
            .collect();
        let mut conditions = vec![format!("status IN ({})", placeholders.join(", "))];

        if let Some(resource_id) = resource_id {
            param_values.push(Box::new(resource_id.to_string()));
            conditions.push(format!("resource_id = ?{}", param_values.len()));
        }
        if let Some(cutoff) = updated_before {
            param_values.push(Box::new(cutoff.to_string()));
            conditions.push(format!("updated_at < ?{}", param_values.len()));
        }

        let sql = format!(
            "SELECT * FROM analysis_jobs WHERE {} ORDER BY created_at DESC",
            conditions.join(" AND ")
        );
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes jobs in any of `statuses` that completed before `cutoff`.
/// Returns the number of deleted rows.
pub fn delete_completed_before(
    db: &Database,
    statuses: &[&str],
    cutoff: &str,
) -> Result<usize, DatabaseError> {
    let mut deleted = 0;
    for status in statuses {
        deleted += db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM analysis_jobs WHERE status = ?1 AND completed_at IS NOT NULL AND completed_at < ?2",
                params![status, cutoff],
            )?)
        })?;
    }
    Ok(deleted)
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM analysis_jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
