pub mod activity;
pub mod activity_log;
pub mod db;
pub mod error;
pub mod models;
pub mod registry;
pub mod schema;

pub use activity::{ActionKind, Activity, Direction};
pub use activity_log::{ActivityLog, Lease, Staging, SyncOutcome};
pub use db::Database;
pub use error::{NofError, Result};
pub use registry::ActionRegistry;
