use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tasktemplates::{self, TemplateKind, TemplateOpts};
use super::uuid_column;
use crate::error::Result;

/// A task materialized with its host and template, as served to executors.
/// `uuid` is the task's uuid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub kind: TemplateKind,
    pub host_uuid: Uuid,
    pub hostname: String,
    pub ip: String,
    pub tasktemplate_uuid: Uuid,
    pub opts: TemplateOpts,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let template = tasktemplates::from_row(row)?;
    Ok(Job {
        uuid: uuid_column(row, "task_uuid")?,
        kind: template.kind,
        host_uuid: uuid_column(row, "host_uuid")?,
        hostname: row.get("hostname")?,
        ip: row.get("ip")?,
        tasktemplate_uuid: template.uuid,
        opts: template.opts,
    })
}

/// Every task whose host and template both still exist, in task order.
pub fn all(conn: &Connection) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare(
        "SELECT t.uuid AS task_uuid, h.uuid AS host_uuid, h.hostname, h.ip,
                tt.uuid AS uuid, tt.type AS type, tt.cmd AS cmd, tt.interval AS interval,
                tt.pattern AS pattern, tt.template AS template
         FROM tasks t
         JOIN hosts h ON h.uuid = t.host_uuid
         JOIN task_templates tt ON tt.uuid = t.tasktemplate_uuid
         ORDER BY t.rowid",
    )?;
    let jobs = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{hosts, tasks, NewHost, NewTask, NewTaskTemplate};
    use crate::schema;
    use tempfile::TempDir;

    #[test]
    fn jobs_carry_template_opts_and_host() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("jobs.db")).unwrap();
        schema::setup_all_tables(&db).unwrap();

        let (task, template) = db
            .with_transaction(|c| {
                let host = hosts::add(
                    c,
                    NewHost {
                        hostname: Some("h1".into()),
                        ip: Some("127.0.0.1".into()),
                        ..Default::default()
                    },
                )?;
                let template = tasktemplates::add(
                    c,
                    NewTaskTemplate {
                        kind: Some("shell".into()),
                        cmd: Some("echo hi".into()),
                        interval: Some(5),
                        pattern: Some("(?<word>\\w+)".into()),
                        template: Some("{word}".into()),
                        ..Default::default()
                    },
                )?;
                let task = tasks::add(
                    c,
                    NewTask {
                        host_uuid: Some(host.uuid),
                        tasktemplate_uuid: Some(template.uuid),
                        ..Default::default()
                    },
                )?;
                Ok((task, template))
            })
            .unwrap();

        let jobs = db.with_connection(all).unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.uuid, task.uuid);
        assert_eq!(job.hostname, "h1");
        assert_eq!(job.kind, TemplateKind::Shell);
        assert_eq!(job.opts, template.opts);

        let json = serde_json::to_value(job).unwrap();
        assert_eq!(json["type"], "shell");
        assert_eq!(json["opts"]["cmd"], "echo hi");
        assert_eq!(json["opts"]["interval"], 5);
    }

    #[test]
    fn no_tasks_means_no_jobs() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("jobs.db")).unwrap();
        schema::setup_all_tables(&db).unwrap();
        assert!(db.with_connection(all).unwrap().is_empty());
    }
}
