use std::fmt;

use regex::RegexBuilder;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ensure_new, lenient_u64, non_empty, tasks, uuid_column, Deleted};
use crate::error::{NofError, Result};

/// Compiled-size ceiling for output patterns. Patterns come from user
/// configuration and are compiled on every executor, which applies the
/// same ceiling in `nof_executor::format::PATTERN_SIZE_LIMIT`.
pub const PATTERN_SIZE_LIMIT: usize = 1 << 20;

// ---------------------------------------------------------------------------
// TemplateKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Runs every `interval` seconds until unbound.
    Shell,
    /// Runs once per appearance in the job list.
    Oneshot,
}

impl TemplateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKind::Shell => "shell",
            TemplateKind::Oneshot => "oneshot",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TemplateKind {
    type Err = NofError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shell" => Ok(TemplateKind::Shell),
            "oneshot" => Ok(TemplateKind::Oneshot),
            other => Err(NofError::InvalidTemplateType(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskTemplate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateOpts {
    pub cmd: String,
    #[serde(
        default,
        deserialize_with = "lenient_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Serialized flat (`{uuid, type, cmd, interval, pattern, template}`) so the
/// stored template doubles as the replay payload of `tasktemplate_add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub uuid: Uuid,
    #[serde(rename = "type")]
    pub kind: TemplateKind,
    #[serde(flatten)]
    pub opts: TemplateOpts,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTaskTemplate {
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub interval: Option<u64>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

impl NewTaskTemplate {
    /// Check required fields and compile the pattern. Nothing invalid is
    /// ever stored.
    pub fn validate(self) -> Result<TaskTemplate> {
        let kind: TemplateKind = non_empty(self.kind)
            .ok_or(NofError::MissingField("type"))?
            .trim()
            .parse()?;
        let cmd = non_empty(self.cmd).ok_or(NofError::MissingField("cmd"))?;

        let interval = match (kind, self.interval) {
            (TemplateKind::Shell, None) => return Err(NofError::MissingField("interval")),
            (TemplateKind::Shell, Some(0)) => {
                return Err(NofError::InvalidField {
                    field: "interval",
                    reason: "must be at least 1 second".into(),
                })
            }
            (_, interval) => interval,
        };

        let pattern = non_empty(self.pattern);
        if let Some(p) = &pattern {
            validate_pattern(p)?;
        }

        Ok(TaskTemplate {
            uuid: self.uuid.unwrap_or_else(Uuid::new_v4),
            kind,
            opts: TemplateOpts {
                cmd,
                interval,
                pattern,
                template: non_empty(self.template),
            },
        })
    }
}

pub fn validate_pattern(pattern: &str) -> Result<()> {
    RegexBuilder::new(pattern)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map(|_| ())
        .map_err(|e| NofError::InvalidPattern(e.to_string()))
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub fn create_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS task_templates (
            uuid TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            cmd TEXT NOT NULL,
            interval INTEGER,
            pattern TEXT,
            template TEXT
        )",
    )?;
    Ok(())
}

pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<TaskTemplate> {
    let kind: String = row.get("type")?;
    let kind = kind.parse::<TemplateKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let interval: Option<i64> = row.get("interval")?;
    Ok(TaskTemplate {
        uuid: uuid_column(row, "uuid")?,
        kind,
        opts: TemplateOpts {
            cmd: row.get("cmd")?,
            interval: interval.map(|i| i.max(0) as u64),
            pattern: row.get("pattern")?,
            template: row.get("template")?,
        },
    })
}

pub fn add(conn: &Connection, new: NewTaskTemplate) -> Result<TaskTemplate> {
    let template = new.validate()?;
    ensure_new(conn, "task_templates", "task template", template.uuid)?;
    conn.execute(
        "INSERT INTO task_templates (uuid, type, cmd, interval, pattern, template)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            template.uuid.to_string(),
            template.kind.as_str(),
            template.opts.cmd,
            template.opts.interval.map(|i| i as i64),
            template.opts.pattern,
            template.opts.template,
        ],
    )?;
    Ok(template)
}

pub fn get(conn: &Connection, uuid: Uuid) -> Result<Option<TaskTemplate>> {
    let template = conn
        .query_row(
            "SELECT uuid, type, cmd, interval, pattern, template
             FROM task_templates WHERE uuid = ?1",
            params![uuid.to_string()],
            from_row,
        )
        .optional()?;
    Ok(template)
}

/// Delete a template and every task bound to it.
pub fn delete(conn: &Connection, uuid: Uuid) -> Result<Deleted> {
    let removed_tasks = tasks::delete_for_template(conn, uuid)?;
    let removed = conn.execute(
        "DELETE FROM task_templates WHERE uuid = ?1",
        params![uuid.to_string()],
    )?;
    tracing::debug!(tasktemplate = %uuid, removed, removed_tasks, "deleted task template");
    Ok(Deleted { uuid })
}

pub fn all(conn: &Connection) -> Result<Vec<TaskTemplate>> {
    let mut stmt = conn.prepare(
        "SELECT uuid, type, cmd, interval, pattern, template
         FROM task_templates ORDER BY rowid",
    )?;
    let templates = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(templates)
}

pub fn count(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM task_templates", [], |r| r.get(0))?;
    Ok(n as usize)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::schema;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("templates.db")).unwrap();
        schema::setup_all_tables(&db).unwrap();
        (dir, db)
    }

    fn shell(cmd: &str, interval: u64) -> NewTaskTemplate {
        NewTaskTemplate {
            kind: Some("shell".into()),
            cmd: Some(cmd.into()),
            interval: Some(interval),
            ..Default::default()
        }
    }

    #[test]
    fn add_and_get_round_trips_opts() {
        let (_dir, db) = open_tmp();
        let t = db
            .with_connection(|c| {
                add(
                    c,
                    NewTaskTemplate {
                        pattern: Some("(?<greeting>Hello)".into()),
                        template: Some("{greeting}".into()),
                        ..shell("echo hi", 5)
                    },
                )
            })
            .unwrap();

        let fetched = db.with_connection(|c| get(c, t.uuid)).unwrap().unwrap();
        assert_eq!(fetched, t);
        assert_eq!(fetched.kind, TemplateKind::Shell);
        assert_eq!(fetched.opts.interval, Some(5));
        assert_eq!(fetched.opts.pattern.as_deref(), Some("(?<greeting>Hello)"));
    }

    #[test]
    fn serializes_flat_and_replays_as_input() {
        let t = shell("echo hi", 5).validate().unwrap();
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["type"], "shell");
        assert_eq!(json["cmd"], "echo hi");
        assert_eq!(json["interval"], 5);
        assert!(json.get("pattern").is_none());

        let replay: NewTaskTemplate = serde_json::from_value(json).unwrap();
        assert_eq!(replay.validate().unwrap(), t);
    }

    #[test]
    fn oneshot_does_not_need_an_interval() {
        let t = NewTaskTemplate {
            kind: Some("oneshot".into()),
            cmd: Some("uptime".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(t.kind, TemplateKind::Oneshot);
        assert_eq!(t.opts.interval, None);
    }

    #[test]
    fn shell_without_interval_is_rejected() {
        let err = NewTaskTemplate {
            kind: Some("shell".into()),
            cmd: Some("uptime".into()),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, NofError::MissingField("interval")));

        let err = shell("uptime", 0).validate().unwrap_err();
        assert!(matches!(err, NofError::InvalidField { field: "interval", .. }));
    }

    #[test]
    fn missing_cmd_is_rejected_and_not_stored() {
        let (_dir, db) = open_tmp();
        let err = db
            .with_connection(|c| {
                add(
                    c,
                    NewTaskTemplate {
                        cmd: Some("   ".into()),
                        ..shell("x", 5)
                    },
                )
            })
            .unwrap_err();
        assert!(matches!(err, NofError::MissingField("cmd")));
        assert_eq!(db.with_connection(count).unwrap(), 0);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = NewTaskTemplate {
            kind: Some("cron".into()),
            ..shell("x", 5)
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, NofError::InvalidTemplateType(t) if t == "cron"));
    }

    #[test]
    fn malformed_pattern_is_rejected_at_creation() {
        let err = NewTaskTemplate {
            pattern: Some("(?<open".into()),
            ..shell("x", 5)
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, NofError::InvalidPattern(_)));
    }

    #[test]
    fn oversized_pattern_is_rejected() {
        let huge = format!("(?:{}){{1000}}", "a{1000}");
        assert!(matches!(
            validate_pattern(&huge),
            Err(NofError::InvalidPattern(_))
        ));
    }

    #[test]
    fn form_style_interval_string_is_accepted() {
        let new: NewTaskTemplate = serde_json::from_value(serde_json::json!({
            "type": "shell",
            "cmd": "echo hi",
            "interval": "30",
        }))
        .unwrap();
        assert_eq!(new.validate().unwrap().opts.interval, Some(30));
    }
}
