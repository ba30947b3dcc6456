use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ensure_new, lenient_i64, uuid_column};
use crate::error::{NofError, Result};

/// One execution report from an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub uuid: Uuid,
    pub job_uuid: Uuid,
    pub result: String,
    pub timestamp: i64,
}

/// Input for `result_add`. The executor reports `{uuid, result, timestamp}`
/// where `uuid` is the job; the controller maps that onto `job_uuid`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewResult {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub job_uuid: Option<Uuid>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
}

pub fn create_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS results (
            uuid TEXT PRIMARY KEY,
            job_uuid TEXT NOT NULL,
            result TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS results_job ON results (job_uuid);",
    )?;
    Ok(())
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<TaskResult> {
    Ok(TaskResult {
        uuid: uuid_column(row, "uuid")?,
        job_uuid: uuid_column(row, "job_uuid")?,
        result: row.get("result")?,
        timestamp: row.get("timestamp")?,
    })
}

/// Store a result. Empty output is a valid result; the job need not exist
/// locally since results can outlive their task.
pub fn add(conn: &Connection, new: NewResult) -> Result<TaskResult> {
    let job_uuid = new.job_uuid.ok_or(NofError::MissingField("job_uuid"))?;
    let result = TaskResult {
        uuid: new.uuid.unwrap_or_else(Uuid::new_v4),
        job_uuid,
        result: new.result.unwrap_or_default(),
        timestamp: new
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp()),
    };
    ensure_new(conn, "results", "result", result.uuid)?;
    conn.execute(
        "INSERT INTO results (uuid, job_uuid, result, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![
            result.uuid.to_string(),
            result.job_uuid.to_string(),
            result.result,
            result.timestamp
        ],
    )?;
    Ok(result)
}

pub fn all(conn: &Connection) -> Result<Vec<TaskResult>> {
    let mut stmt =
        conn.prepare("SELECT uuid, job_uuid, result, timestamp FROM results ORDER BY rowid")?;
    let results = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(results)
}

pub fn for_job(conn: &Connection, job_uuid: Uuid) -> Result<Vec<TaskResult>> {
    let mut stmt = conn.prepare(
        "SELECT uuid, job_uuid, result, timestamp FROM results
         WHERE job_uuid = ?1 ORDER BY rowid",
    )?;
    let results = stmt
        .query_map(params![job_uuid.to_string()], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(results)
}

pub fn count(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM results", [], |r| r.get(0))?;
    Ok(n as usize)
}
