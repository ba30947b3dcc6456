use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{NofError, Result};

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// Every mutation an activity can carry. Unknown tags fail to deserialize,
/// so a peer can never smuggle in an action this node cannot replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    HostAdd,
    HostDelete,
    TasktemplateAdd,
    TasktemplateDelete,
    TaskAdd,
    TaskDelete,
    ResultAdd,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::HostAdd,
        ActionKind::HostDelete,
        ActionKind::TasktemplateAdd,
        ActionKind::TasktemplateDelete,
        ActionKind::TaskAdd,
        ActionKind::TaskDelete,
        ActionKind::ResultAdd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::HostAdd => "host_add",
            ActionKind::HostDelete => "host_delete",
            ActionKind::TasktemplateAdd => "tasktemplate_add",
            ActionKind::TasktemplateDelete => "tasktemplate_delete",
            ActionKind::TaskAdd => "task_add",
            ActionKind::TaskDelete => "task_delete",
            ActionKind::ResultAdd => "result_add",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = NofError;

    fn from_str(s: &str) -> Result<Self> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| NofError::UnknownAction(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which neighbour an activity is travelling towards, or came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Northbound,
    Southbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Northbound => "northbound",
            Direction::Southbound => "southbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// One immutable configuration change. `created_at` and `source_name` are
/// preserved verbatim when the activity is replayed on another tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub uuid: Uuid,
    pub created_at: i64,
    pub action: ActionKind,
    #[serde(default)]
    pub opts: Value,
    #[serde(default)]
    pub source_name: String,
}

impl Activity {
    /// A fresh local activity stamped with the current time.
    pub fn new(action: ActionKind, opts: Value, source_name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            created_at: chrono::Utc::now().timestamp(),
            action,
            opts,
            source_name: source_name.into(),
        }
    }
}
