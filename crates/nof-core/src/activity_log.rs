//! Event-sourced change log with directional staging queues.
//!
//! # Table design
//!
//! ```text
//! activities      seq (insertion order) | uuid UNIQUE | created_at | action | opts (JSON) | source_name
//! activity_queue  direction | activity_uuid | position | lease    UNIQUE(direction, activity_uuid)
//! ```
//!
//! Every recorded activity is appended to `activities` and, unless it
//! arrived from that side or staging is disabled for it, queued once per
//! direction. `position` orders a queue; a failed exchange puts its batch
//! back below the current minimum so the original order survives.
//!
//! A queue is emptied one of two ways. The side that starts an exchange
//! drains its queue and requeues on failure. The side that answers cannot
//! tell whether its reply arrived, so it leases the queue instead: rows stay
//! put, tagged with a lease id, until the peer acknowledges that id on its
//! next exchange. An unacknowledged lease is handed out again under a new id.
//!
//! Applying a handler and recording its activity share one IMMEDIATE
//! transaction, so the model tables and the log never disagree.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::activity::{ActionKind, Activity, Direction};
use crate::db::Database;
use crate::error::{NofError, Result};
use crate::models::uuid_column;
use crate::registry::{ActionHandler, ActionRegistry};

// ---------------------------------------------------------------------------
// Staging / SyncOutcome
// ---------------------------------------------------------------------------

/// Which outbound queues this tier maintains. A tier without a peer on one
/// side disables that side so its queue cannot grow without bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staging {
    pub northbound: bool,
    pub southbound: bool,
}

impl Staging {
    pub const BOTH: Staging = Staging {
        northbound: true,
        southbound: true,
    };

    pub fn enabled(self, direction: Direction) -> bool {
        match direction {
            Direction::Northbound => self.northbound,
            Direction::Southbound => self.southbound,
        }
    }
}

impl Default for Staging {
    fn default() -> Self {
        Self::BOTH
    }
}

/// Tally of one `sync` batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Applied locally and recorded.
    pub applied: usize,
    /// Already known by uuid.
    pub skipped: usize,
    /// Handler refused the replay (validation or missing reference).
    pub rejected: usize,
}

/// A queue snapshot handed to a peer and kept until acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub id: Uuid,
    pub activities: Vec<Activity>,
}

// ---------------------------------------------------------------------------
// Schema helpers
// ---------------------------------------------------------------------------

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS activities (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            action TEXT NOT NULL,
            opts TEXT NOT NULL,
            source_name TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS activity_queue (
            direction TEXT NOT NULL,
            activity_uuid TEXT NOT NULL,
            position INTEGER NOT NULL,
            lease TEXT,
            UNIQUE (direction, activity_uuid)
        );
        CREATE INDEX IF NOT EXISTS activity_queue_order
            ON activity_queue (direction, position);",
    )?;
    Ok(())
}

const SELECT_ACTIVITY: &str = "SELECT a.uuid, a.created_at, a.action, a.opts, a.source_name
     FROM activities a";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    let action: String = row.get("action")?;
    let action = action.parse::<ActionKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let opts: String = row.get("opts")?;
    let opts: Value = serde_json::from_str(&opts).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Activity {
        uuid: uuid_column(row, "uuid")?,
        created_at: row.get("created_at")?,
        action,
        opts,
        source_name: row.get("source_name")?,
    })
}

fn exists(conn: &Connection, uuid: Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM activities WHERE uuid = ?1",
            params![uuid.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn enqueue(conn: &Connection, direction: Direction, uuid: Uuid) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO activity_queue (direction, activity_uuid, position)
         SELECT ?1, ?2, COALESCE(MAX(position), 0) + 1
         FROM activity_queue WHERE direction = ?1",
        params![direction.as_str(), uuid.to_string()],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// ActivityLog
// ---------------------------------------------------------------------------

/// Per-tier activity log. Owned by the node and shared behind an `Arc`;
/// all mutable state lives in the store, serialized by its transactions.
pub struct ActivityLog {
    db: Database,
    source_name: String,
    registry: ActionRegistry,
    staging: Staging,
}

impl ActivityLog {
    /// Open the log on `db`, creating its tables if needed.
    pub fn new(
        db: Database,
        source_name: impl Into<String>,
        registry: ActionRegistry,
        staging: Staging,
    ) -> Result<Self> {
        db.with_connection(create_tables)?;
        Ok(Self {
            db,
            source_name: source_name.into(),
            registry,
            staging,
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn staging(&self) -> Staging {
        self.staging
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Associate `handler` with `kind`. Must happen before activities of
    /// that kind are added or synced.
    pub fn register<F>(&mut self, kind: ActionKind, handler: F)
    where
        F: Fn(&Connection, Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.registry.register(kind, handler);
    }

    fn handler(&self, kind: ActionKind) -> Result<&ActionHandler> {
        self.registry.handler(kind)
    }

    /// Append `activity` and stage it, skipping the side it came from.
    fn insert(&self, conn: &Connection, activity: &Activity, origin: Option<Direction>) -> Result<()> {
        if exists(conn, activity.uuid)? {
            return Err(NofError::DuplicateActivity(activity.uuid));
        }
        conn.execute(
            "INSERT INTO activities (uuid, created_at, action, opts, source_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                activity.uuid.to_string(),
                activity.created_at,
                activity.action.as_str(),
                serde_json::to_string(&activity.opts)?,
                activity.source_name,
            ],
        )?;
        for direction in [Direction::Northbound, Direction::Southbound] {
            if self.staging.enabled(direction) && origin != Some(direction) {
                enqueue(conn, direction, activity.uuid)?;
            }
        }
        tracing::debug!(
            activity = %activity.uuid,
            action = %activity.action,
            source = %activity.source_name,
            origin = origin.map(Direction::as_str).unwrap_or("local"),
            "recorded activity"
        );
        Ok(())
    }

    /// Record a new local activity without running its handler.
    pub fn add(&self, action: ActionKind, opts: Value) -> Result<Uuid> {
        self.handler(action)?;
        let activity = Activity::new(action, opts, self.source_name.as_str());
        self.db
            .with_transaction(|conn| self.insert(conn, &activity, None))?;
        Ok(activity.uuid)
    }

    /// Record an activity that already carries its uuid and timestamp.
    /// A uuid that is already known is a [`NofError::DuplicateActivity`].
    pub fn record(&self, activity: &Activity, origin: Option<Direction>) -> Result<()> {
        self.handler(activity.action)?;
        self.db
            .with_transaction(|conn| self.insert(conn, activity, origin))
    }

    /// Run the handler for `action` and record its result as a new local
    /// activity, atomically. The only write path for local changes.
    pub fn call_action(&self, action: ActionKind, opts: Value) -> Result<(Uuid, Value)> {
        let handler = self.handler(action)?;
        self.db.with_transaction(|conn| {
            let result = handler(conn, opts)?;
            let activity = Activity::new(action, result.clone(), self.source_name.as_str());
            self.insert(conn, &activity, None)?;
            Ok((activity.uuid, result))
        })
    }

    /// Apply a batch received from the peer on the `origin` side.
    ///
    /// Known uuids are skipped. An activity whose handler refuses the replay
    /// (validation, a missing reference, an entity uuid that already exists
    /// here) is logged and dropped so it cannot wedge the link. Storage
    /// failures abort the rest of the batch; every activity applied before
    /// the failure stays committed.
    pub fn sync(&self, batch: Vec<Activity>, origin: Direction) -> Result<SyncOutcome> {
        let mut outcome = SyncOutcome::default();
        for activity in batch {
            let handler = self.handler(activity.action)?;
            let applied = self.db.with_transaction(|conn| {
                if exists(conn, activity.uuid)? {
                    return Ok(false);
                }
                handler(conn, activity.opts.clone())?;
                self.insert(conn, &activity, Some(origin))?;
                Ok(true)
            });
            match applied {
                Ok(true) => outcome.applied += 1,
                Ok(false) => {
                    tracing::debug!(activity = %activity.uuid, "activity already known, skipping");
                    outcome.skipped += 1;
                }
                Err(e) if e.is_storage_failure() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        activity = %activity.uuid,
                        action = %activity.action,
                        source = %activity.source_name,
                        error = %e,
                        "rejected synced activity"
                    );
                    outcome.rejected += 1;
                }
            }
        }
        if outcome.applied + outcome.rejected > 0 {
            tracing::info!(
                %origin,
                applied = outcome.applied,
                skipped = outcome.skipped,
                rejected = outcome.rejected,
                "synced activities"
            );
        }
        Ok(outcome)
    }

    /// Return and clear the `direction` queue in one transaction.
    pub fn drain(&self, direction: Direction) -> Result<Vec<Activity>> {
        self.db.with_transaction(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_ACTIVITY}
                 JOIN activity_queue q ON q.activity_uuid = a.uuid
                 WHERE q.direction = ?1
                 ORDER BY q.position"
            ))?;
            let batch = stmt
                .query_map(params![direction.as_str()], from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            conn.execute(
                "DELETE FROM activity_queue WHERE direction = ?1",
                params![direction.as_str()],
            )?;
            Ok(batch)
        })
    }

    /// Hand out everything queued for `direction` under a fresh lease id,
    /// including rows of an earlier lease that was never acknowledged.
    /// Nothing is removed. `None` when the queue is empty.
    pub fn lease(&self, direction: Direction) -> Result<Option<Lease>> {
        self.db.with_transaction(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_ACTIVITY}
                 JOIN activity_queue q ON q.activity_uuid = a.uuid
                 WHERE q.direction = ?1
                 ORDER BY q.position"
            ))?;
            let activities = stmt
                .query_map(params![direction.as_str()], from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if activities.is_empty() {
                return Ok(None);
            }
            let id = Uuid::new_v4();
            conn.execute(
                "UPDATE activity_queue SET lease = ?2 WHERE direction = ?1",
                params![direction.as_str(), id.to_string()],
            )?;
            Ok(Some(Lease { id, activities }))
        })
    }

    /// Remove the rows handed out under lease `id`. A stale or unknown id
    /// removes nothing. Returns the number of rows removed.
    pub fn ack(&self, direction: Direction, id: Uuid) -> Result<usize> {
        let removed = self.db.with_connection(|conn| {
            Ok(conn.execute(
                "DELETE FROM activity_queue WHERE direction = ?1 AND lease = ?2",
                params![direction.as_str(), id.to_string()],
            )?)
        })?;
        tracing::debug!(%direction, lease = %id, removed, "acknowledged lease");
        Ok(removed)
    }

    pub fn drain_northbound(&self) -> Result<Vec<Activity>> {
        self.drain(Direction::Northbound)
    }

    pub fn drain_southbound(&self) -> Result<Vec<Activity>> {
        self.drain(Direction::Southbound)
    }

    /// Put a drained batch back at the head of the `direction` queue,
    /// ahead of anything staged since, in its original order.
    pub fn requeue(&self, direction: Direction, batch: &[Activity]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.db.with_transaction(|conn| {
            let head: i64 = conn.query_row(
                "SELECT COALESCE(MIN(position), 1) FROM activity_queue WHERE direction = ?1",
                params![direction.as_str()],
                |r| r.get(0),
            )?;
            let start = head - batch.len() as i64;
            for (i, activity) in batch.iter().enumerate() {
                conn.execute(
                    "INSERT OR IGNORE INTO activity_queue (direction, activity_uuid, position)
                     VALUES (?1, ?2, ?3)",
                    params![
                        direction.as_str(),
                        activity.uuid.to_string(),
                        start + i as i64
                    ],
                )?;
            }
            Ok(())
        })?;
        tracing::debug!(%direction, count = batch.len(), "requeued activities");
        Ok(())
    }

    /// Number of activities waiting in the `direction` queue.
    pub fn pending(&self, direction: Direction) -> Result<usize> {
        self.db.with_connection(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM activity_queue WHERE direction = ?1",
                params![direction.as_str()],
                |r| r.get(0),
            )?;
            Ok(n as usize)
        })
    }

    /// Every known activity in the order it was recorded here.
    pub fn all(&self) -> Result<Vec<Activity>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_ACTIVITY} ORDER BY a.seq"))?;
            let activities = stmt
                .query_map([], from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(activities)
        })
    }

    pub fn get(&self, uuid: Uuid) -> Result<Option<Activity>> {
        self.db.with_connection(|conn| {
            let activity = conn
                .query_row(
                    &format!("{SELECT_ACTIVITY} WHERE a.uuid = ?1"),
                    params![uuid.to_string()],
                    from_row,
                )
                .optional()?;
            Ok(activity)
        })
    }

    pub fn len(&self) -> Result<usize> {
        self.db.with_connection(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM activities", [], |r| r.get(0))?;
            Ok(n as usize)
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
