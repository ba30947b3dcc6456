use crate::activity_log;
use crate::db::Database;
use crate::error::Result;
use crate::models::{hosts, results, tasks, tasktemplates};

/// Create every table a tier needs. Idempotent.
pub fn setup_all_tables(db: &Database) -> Result<()> {
    db.with_transaction(|conn| {
        hosts::create_table(conn)?;
        tasktemplates::create_table(conn)?;
        tasks::create_table(conn)?;
        results::create_table(conn)?;
        activity_log::create_tables(conn)?;
        Ok(())
    })
}
