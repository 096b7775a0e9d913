//! Extracted question repository.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A question ready to be inserted. `position` preserves document order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub question_text: String,
    pub question_number: Option<String>,
    pub marks: Option<f64>,
    pub difficulty: String,
    pub ai_analysis: Option<String>,
    pub position: i64,
}

/// A stored question row.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRow {
    pub id: i64,
    pub resource_id: String,
    pub job_id: String,
    pub question_text: String,
    pub question_number: Option<String>,
    pub marks: Option<f64>,
    pub difficulty: String,
    pub ai_analysis: Option<String>,
    pub position: i64,
    pub created_at: String,
}

impl QuestionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            resource_id: row.get("resource_id")?,
            job_id: row.get("job_id")?,
            question_text: row.get("question_text")?,
            question_number: row.get("question_number")?,
            marks: row.get("marks")?,
            difficulty: row.get("difficulty")?,
            ai_analysis: row.get("ai_analysis")?,
            position: row.get("position")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts all questions in a single transaction. Either every row is
/// written or none is.
pub fn insert_batch(
    db: &Database,
    resource_id: &str,
    job_id: &str,
    created_at: &str,
    questions: &[NewQuestion],
) -> Result<usize, DatabaseError> {
    if questions.is_empty() {
        return Ok(0);
    }

    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO extracted_questions (resource_id, job_id, question_text,
                 question_number, marks, difficulty, ai_analysis, position, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for q in questions {
                stmt.execute(params![
                    resource_id,
                    job_id,
                    q.question_text,
                    q.question_number,
                    q.marks,
                    q.difficulty,
                    q.ai_analysis,
                    q.position,
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        log::debug!(
            "Inserted {} questions for resource {}",
            questions.len(),
            resource_id
        );
        Ok(questions.len())
    })
}

/// Lists questions for a resource in document order.
pub fn list_for_resource(
    db: &Database,
    resource_id: &str,
) -> Result<Vec<QuestionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM extracted_questions WHERE resource_id = ?1 ORDER BY job_id, position",
        )?;
        let rows = stmt
            .query_map(params![resource_id], QuestionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn count_for_job(db: &Database, job_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM extracted_questions WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
