//! CRUD entities stored in the tier's SQLite file.
//!
//! Functions take a plain `&Connection` so they compose inside the
//! transaction opened by the activity log; cascading deletes rely on that
//! transaction for atomicity.

pub mod hosts;
pub mod jobs;
pub mod results;
pub mod tasks;
pub mod tasktemplates;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub use hosts::{Host, NewHost};
pub use jobs::Job;
pub use results::{NewResult, TaskResult};
pub use tasks::{NewTask, Task};
pub use tasktemplates::{NewTaskTemplate, TaskTemplate, TemplateKind, TemplateOpts};

/// Returned by every delete; also the replay payload of `*_delete` actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deleted {
    pub uuid: Uuid,
}

pub(crate) fn uuid_column(row: &Row<'_>, column: &str) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(column)?;
    Uuid::parse_str(&raw).map_err(|e| {
        let idx = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

/// Refuse to insert `uuid` into `table` twice. A clash is a conflict the
/// caller can act on, not a storage failure.
pub(crate) fn ensure_new(
    conn: &Connection,
    table: &'static str,
    kind: &'static str,
    uuid: Uuid,
) -> crate::error::Result<()> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE uuid = ?1"),
            params![uuid.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    match found {
        Some(()) => Err(crate::error::NofError::EntityExists { kind, uuid }),
        None => Ok(()),
    }
}

/// Drop blank strings. Form submissions send untouched inputs as "".
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Lenient numbers: form fields arrive as strings, JSON bodies as numbers.
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    Text(String),
}

pub(crate) fn lenient_i64<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(d)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got '{s}'"))),
    }
}

pub(crate) fn lenient_u64<'de, D>(d: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match lenient_i64(d)? {
        None => Ok(None),
        Some(n) => u64::try_from(n)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected a non-negative integer, got {n}"))),
    }
}
