//! Schema migrations.
//!
//! Applied versions are recorded in `_migrations`. Each migration runs in
//! its own transaction together with its bookkeeping row, so a failed
//! migration leaves the schema at the previous version.

use chrono::Utc;
use rusqlite::{params, Connection};

use super::error::DatabaseError;
use super::format_timestamp;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
    /// `(table, column)`: skip the SQL when the column is already there.
    skip_if_column: Option<(&'static str, &'static str)>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_resources",
        sql: include_str!("sql/001_create_resources.sql"),
        skip_if_column: None,
    },
    Migration {
        version: 2,
        name: "create_analysis_jobs",
        sql: include_str!("sql/002_create_analysis_jobs.sql"),
        skip_if_column: None,
    },
    Migration {
        version: 3,
        name: "create_extracted_questions",
        sql: include_str!("sql/003_create_extracted_questions.sql"),
        skip_if_column: None,
    },
    Migration {
        version: 4,
        name: "create_concepts",
        sql: include_str!("sql/004_create_concepts.sql"),
        skip_if_column: None,
    },
    Migration {
        version: 5,
        name: "add_analysis_jobs_current_stage",
        sql: include_str!("sql/005_add_current_stage.sql"),
        skip_if_column: Some(("analysis_jobs", "current_stage")),
    },
];

/// Highest version recorded in `_migrations`, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    ensure_ledger(conn)?;
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |r| {
        r.get(0)
    })?;
    Ok(version)
}

/// Applies every pending migration and returns how many were recorded.
pub fn run_all(conn: &Connection) -> Result<usize, DatabaseError> {
    let current = schema_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let skip = match migration.skip_if_column {
            Some((table, column)) => column_exists(conn, table, column)?,
            None => false,
        };

        let tx = conn.unchecked_transaction()?;
        if skip {
            log::info!(
                "Migration v{} ({}) already satisfied, recording only",
                migration.version,
                migration.name
            );
        } else {
            log::info!("Applying migration v{} ({})", migration.version, migration.name);
            tx.execute_batch(migration.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;
        }
        tx.execute(
            "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, format_timestamp(Utc::now())],
        )?;
        tx.commit()?;
        applied += 1;
    }

    Ok(applied)
}

fn ensure_ledger(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    // PRAGMA arguments cannot be bound, so the identifier is checked instead.
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut names = stmt.query_map([], |row| row.get::<_, String>("name"))?;
    names.try_fold(false, |found, name| Ok(found || name? == column))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    fn latest() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    #[test]
    fn test_fresh_database_reaches_latest_version() {
        let conn = fresh();
        assert_eq!(schema_version(&conn).unwrap(), 0);

        assert_eq!(run_all(&conn).unwrap(), MIGRATIONS.len());
        assert_eq!(schema_version(&conn).unwrap(), latest());
    }

    #[test]
    fn test_second_run_applies_nothing() {
        let conn = fresh();
        run_all(&conn).unwrap();
        assert_eq!(run_all(&conn).unwrap(), 0);
    }

    #[test]
    fn test_versions_are_strictly_increasing() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[test]
    fn test_existing_column_is_recorded_without_running() {
        let conn = fresh();
        for m in MIGRATIONS.iter().filter(|m| m.skip_if_column.is_none()) {
            conn.execute_batch(m.sql).unwrap();
        }
        conn.execute_batch("ALTER TABLE analysis_jobs ADD COLUMN current_stage TEXT;")
            .unwrap();
        conn.execute_batch(
            "CREATE TABLE _migrations (version INTEGER PRIMARY KEY, name TEXT NOT NULL, applied_at TEXT NOT NULL);
             INSERT INTO _migrations VALUES (4, 'create_concepts', '2026-01-01T00:00:00.000000Z');",
        )
        .unwrap();

        assert_eq!(run_all(&conn).unwrap(), 1);
        assert!(column_exists(&conn, "analysis_jobs", "current_stage").unwrap());
        assert_eq!(schema_version(&conn).unwrap(), latest());
    }

    #[test]
    fn test_column_exists_rejects_bad_identifiers() {
        let conn = fresh();
        run_all(&conn).unwrap();
        assert!(column_exists(&conn, "resources", "rag_content").unwrap());
        assert!(!column_exists(&conn, "resources", "embedding").unwrap());
        assert!(column_exists(&conn, "resources; DROP TABLE resources", "id").is_err());
    }

    #[test]
    fn test_concept_names_are_unique() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let insert = "INSERT INTO concepts (id, name, created_at) VALUES (?1, 'Graph Theory', '2026-01-01')";
        conn.execute(insert, ["c1"]).unwrap();
        assert!(conn.execute(insert, ["c2"]).is_err());
    }
}
