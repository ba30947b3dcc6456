use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ensure_new, hosts, tasktemplates, uuid_column, Deleted};
use crate::error::{NofError, Result};

/// "This host should run this template."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub uuid: Uuid,
    pub host_uuid: Uuid,
    pub tasktemplate_uuid: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub host_uuid: Option<Uuid>,
    #[serde(default)]
    pub tasktemplate_uuid: Option<Uuid>,
}

pub fn create_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            uuid TEXT PRIMARY KEY,
            host_uuid TEXT NOT NULL,
            tasktemplate_uuid TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS tasks_host ON tasks (host_uuid);
        CREATE INDEX IF NOT EXISTS tasks_template ON tasks (tasktemplate_uuid);",
    )?;
    Ok(())
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        uuid: uuid_column(row, "uuid")?,
        host_uuid: uuid_column(row, "host_uuid")?,
        tasktemplate_uuid: uuid_column(row, "tasktemplate_uuid")?,
    })
}

/// Bind a host to a template. Both must already exist.
pub fn add(conn: &Connection, new: NewTask) -> Result<Task> {
    let host_uuid = new.host_uuid.ok_or(NofError::MissingField("host_uuid"))?;
    let tasktemplate_uuid = new
        .tasktemplate_uuid
        .ok_or(NofError::MissingField("tasktemplate_uuid"))?;

    if hosts::get(conn, host_uuid)?.is_none() {
        return Err(NofError::HostNotFound(host_uuid));
    }
    if tasktemplates::get(conn, tasktemplate_uuid)?.is_none() {
        return Err(NofError::TaskTemplateNotFound(tasktemplate_uuid));
    }

    let task = Task {
        uuid: new.uuid.unwrap_or_else(Uuid::new_v4),
        host_uuid,
        tasktemplate_uuid,
    };
    ensure_new(conn, "tasks", "task", task.uuid)?;
    conn.execute(
        "INSERT INTO tasks (uuid, host_uuid, tasktemplate_uuid) VALUES (?1, ?2, ?3)",
        params![
            task.uuid.to_string(),
            task.host_uuid.to_string(),
            task.tasktemplate_uuid.to_string()
        ],
    )?;
    Ok(task)
}

pub fn get(conn: &Connection, uuid: Uuid) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT uuid, host_uuid, tasktemplate_uuid FROM tasks WHERE uuid = ?1",
            params![uuid.to_string()],
            from_row,
        )
        .optional()?;
    Ok(task)
}

pub fn delete(conn: &Connection, uuid: Uuid) -> Result<Deleted> {
    conn.execute("DELETE FROM tasks WHERE uuid = ?1", params![uuid.to_string()])?;
    Ok(Deleted { uuid })
}

pub(crate) fn delete_for_host(conn: &Connection, host_uuid: Uuid) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM tasks WHERE host_uuid = ?1",
        params![host_uuid.to_string()],
    )?)
}

pub(crate) fn delete_for_template(conn: &Connection, tasktemplate_uuid: Uuid) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM tasks WHERE tasktemplate_uuid = ?1",
        params![tasktemplate_uuid.to_string()],
    )?)
}

pub fn all(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt =
        conn.prepare("SELECT uuid, host_uuid, tasktemplate_uuid FROM tasks ORDER BY rowid")?;
    let tasks = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

pub fn count(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |r| r.get(0))?;
    Ok(n as usize)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{NewHost, NewTaskTemplate};
    use crate::schema;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("tasks.db")).unwrap();
        schema::setup_all_tables(&db).unwrap();
        (dir, db)
    }

    fn seed(conn: &Connection, hostname: &str) -> Result<(Uuid, Uuid)> {
        let host = hosts::add(
            conn,
            NewHost {
                hostname: Some(hostname.into()),
                ip: Some("127.0.0.1".into()),
                ..Default::default()
            },
        )?;
        let template = tasktemplates::add(
            conn,
            NewTaskTemplate {
                kind: Some("shell".into()),
                cmd: Some("echo hi".into()),
                interval: Some(5),
                ..Default::default()
            },
        )?;
        Ok((host.uuid, template.uuid))
    }

    fn bind(conn: &Connection, host: Uuid, template: Uuid) -> Result<Task> {
        add(
            conn,
            NewTask {
                host_uuid: Some(host),
                tasktemplate_uuid: Some(template),
                ..Default::default()
            },
        )
    }

    #[test]
    fn binding_requires_existing_host_and_template() {
        let (_dir, db) = open_tmp();
        let (host, template) = db.with_connection(|c| seed(c, "h1")).unwrap();

        let err = db
            .with_connection(|c| bind(c, Uuid::new_v4(), template))
            .unwrap_err();
        assert!(matches!(err, NofError::HostNotFound(_)));

        let err = db
            .with_connection(|c| bind(c, host, Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(err, NofError::TaskTemplateNotFound(_)));

        let task = db.with_connection(|c| bind(c, host, template)).unwrap();
        assert_eq!(db.with_connection(|c| get(c, task.uuid)).unwrap(), Some(task));
    }

    #[test]
    fn deleting_a_host_removes_its_tasks() {
        let (_dir, db) = open_tmp();
        let (h1, t) = db.with_connection(|c| seed(c, "h1")).unwrap();
        let (h2, _) = db.with_connection(|c| seed(c, "h2")).unwrap();
        db.with_connection(|c| bind(c, h1, t)).unwrap();
        let keep = db.with_connection(|c| bind(c, h2, t)).unwrap();
        assert_eq!(db.with_connection(count).unwrap(), 2);

        db.with_transaction(|c| hosts::delete(c, h1)).unwrap();

        assert_eq!(db.with_connection(all).unwrap(), vec![keep]);
    }

    #[test]
    fn deleting_a_template_removes_its_tasks() {
        let (_dir, db) = open_tmp();
        let (h, t1) = db.with_connection(|c| seed(c, "h1")).unwrap();
        let (_, t2) = db.with_connection(|c| seed(c, "h2")).unwrap();
        db.with_connection(|c| bind(c, h, t1)).unwrap();
        db.with_connection(|c| bind(c, h, t2)).unwrap();

        db.with_transaction(|c| tasktemplates::delete(c, t1)).unwrap();

        let remaining = db.with_connection(all).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].tasktemplate_uuid, t2);
    }
}
