//! Action handlers: `opts -> result` functions keyed by [`ActionKind`].
//!
//! A handler's result is recorded as the activity's `opts`, and every
//! standard handler accepts its own result as input. Replaying an activity on
//! another tier therefore recreates the same rows under the same uuids.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::activity::ActionKind;
use crate::error::{NofError, Result};
use crate::models::{hosts, results, tasks, tasktemplates, Deleted};

pub type ActionHandler = Arc<dyn Fn(&Connection, Value) -> Result<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, ActionHandler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every [`ActionKind`].
    pub fn with_model_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(ActionKind::HostAdd, typed(hosts::add));
        registry.register(ActionKind::HostDelete, typed(delete_host));
        registry.register(ActionKind::TasktemplateAdd, typed(tasktemplates::add));
        registry.register(ActionKind::TasktemplateDelete, typed(delete_tasktemplate));
        registry.register(ActionKind::TaskAdd, typed(tasks::add));
        registry.register(ActionKind::TaskDelete, typed(delete_task));
        registry.register(ActionKind::ResultAdd, typed(results::add));
        registry
    }

    /// Register (or replace) the handler for `kind`.
    pub fn register<F>(&mut self, kind: ActionKind, handler: F)
    where
        F: Fn(&Connection, Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
    }

    pub fn handler(&self, kind: ActionKind) -> Result<&ActionHandler> {
        self.handlers
            .get(&kind)
            .ok_or(NofError::UnregisteredAction(kind))
    }

    pub fn is_registered(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

/// Adapt a typed model function into a JSON handler.
fn typed<I, O, F>(f: F) -> impl Fn(&Connection, Value) -> Result<Value> + Send + Sync + 'static
where
    I: DeserializeOwned + 'static,
    O: Serialize + 'static,
    F: Fn(&Connection, I) -> Result<O> + Send + Sync + 'static,
{
    move |conn: &Connection, opts: Value| {
        let input: I =
            serde_json::from_value(opts).map_err(|e| NofError::InvalidPayload(e.to_string()))?;
        let output = f(conn, input)?;
        Ok(serde_json::to_value(output)?)
    }
}

fn delete_host(conn: &Connection, target: Deleted) -> Result<Deleted> {
    hosts::delete(conn, target.uuid)
}

fn delete_tasktemplate(conn: &Connection, target: Deleted) -> Result<Deleted> {
    tasktemplates::delete(conn, target.uuid)
}

fn delete_task(conn: &Connection, target: Deleted) -> Result<Deleted> {
    tasks::delete(conn, target.uuid)
}
