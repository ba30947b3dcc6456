use std::net::IpAddr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ensure_new, non_empty, tasks, uuid_column, Deleted};
use crate::error::{NofError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub uuid: Uuid,
    pub hostname: String,
    pub ip: String,
}

/// Input for `host_add`. A `Host` serializes into a valid `NewHost`, so a
/// replayed activity recreates the host under the same uuid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewHost {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default, alias = "name")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

pub fn create_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS hosts (
            uuid TEXT PRIMARY KEY,
            hostname TEXT NOT NULL,
            ip TEXT NOT NULL
        )",
    )?;
    Ok(())
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Host> {
    Ok(Host {
        uuid: uuid_column(row, "uuid")?,
        hostname: row.get("hostname")?,
        ip: row.get("ip")?,
    })
}

pub fn add(conn: &Connection, new: NewHost) -> Result<Host> {
    let hostname = non_empty(new.hostname).ok_or(NofError::MissingField("hostname"))?;
    let ip = non_empty(new.ip).ok_or(NofError::MissingField("ip"))?;
    let ip = ip.trim();
    ip.parse::<IpAddr>().map_err(|e| NofError::InvalidField {
        field: "ip",
        reason: format!("'{ip}': {e}"),
    })?;

    let host = Host {
        uuid: new.uuid.unwrap_or_else(Uuid::new_v4),
        hostname: hostname.trim().to_string(),
        ip: ip.to_string(),
    };
    ensure_new(conn, "hosts", "host", host.uuid)?;
    conn.execute(
        "INSERT INTO hosts (uuid, hostname, ip) VALUES (?1, ?2, ?3)",
        params![host.uuid.to_string(), host.hostname, host.ip],
    )?;
    Ok(host)
}

pub fn get(conn: &Connection, uuid: Uuid) -> Result<Option<Host>> {
    let host = conn
        .query_row(
            "SELECT uuid, hostname, ip FROM hosts WHERE uuid = ?1",
            params![uuid.to_string()],
            from_row,
        )
        .optional()?;
    Ok(host)
}

/// Delete a host and every task bound to it. Deleting an unknown host is a
/// no-op so replays stay idempotent.
pub fn delete(conn: &Connection, uuid: Uuid) -> Result<Deleted> {
    let removed_tasks = tasks::delete_for_host(conn, uuid)?;
    let removed = conn.execute("DELETE FROM hosts WHERE uuid = ?1", params![uuid.to_string()])?;
    tracing::debug!(host = %uuid, removed, removed_tasks, "deleted host");
    Ok(Deleted { uuid })
}

pub fn all(conn: &Connection) -> Result<Vec<Host>> {
    let mut stmt = conn.prepare("SELECT uuid, hostname, ip FROM hosts ORDER BY rowid")?;
    let hosts = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(hosts)
}

pub fn count(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM hosts", [], |r| r.get(0))?;
    Ok(n as usize)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
