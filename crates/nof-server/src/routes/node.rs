use axum::extract::State;
use axum::Json;
use nof_core::models::{hosts, results, tasks, tasktemplates};
use nof_core::Direction;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::routes::blocking;
use crate::state::AppState;

/// GET /, a plain-text index.
pub async fn index(State(app): State<AppState>) -> String {
    let role = match app.role {
        crate::config::Role::Controller => "Controller",
        crate::config::Role::Dashboard => "Dashboard",
        crate::config::Role::RemoteDashboard => "Remote Dashboard",
    };
    format!("{role} Index")
}

/// GET /info.json
pub async fn info(State(app): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": app.role.name(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /status.json: health plus the outcome of the latest exchange.
pub async fn status(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let log = app.log.clone();
    let (north, south) = blocking(move || {
        Ok((
            log.pending(Direction::Northbound)?,
            log.pending(Direction::Southbound)?,
        ))
    })
    .await?;
    let sync = app.sync.snapshot();
    Ok(Json(json!({
        "health": "ok",
        "status": sync.status,
        "last_synced_at": sync.last_synced_at,
        "last_error": sync.last_error,
        "pending": { "northbound": north, "southbound": south },
    })))
}

/// GET /activities.json: the full log in recorded order.
pub async fn activities(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let log = app.log.clone();
    let all = blocking(move || log.all()).await?;
    Ok(Json(serde_json::to_value(all)?))
}

/// GET /tasktemplates.json
pub async fn list_tasktemplates(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let all = blocking(move || db.with_connection(tasktemplates::all)).await?;
    Ok(Json(serde_json::to_value(all)?))
}

/// GET /hosts.json
pub async fn list_hosts(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let all = blocking(move || db.with_connection(hosts::all)).await?;
    Ok(Json(serde_json::to_value(all)?))
}

/// GET /tasks.json
pub async fn list_tasks(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let all = blocking(move || db.with_connection(tasks::all)).await?;
    Ok(Json(serde_json::to_value(all)?))
}

/// GET /results.json
pub async fn list_results(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let all = blocking(move || db.with_connection(results::all)).await?;
    Ok(Json(serde_json::to_value(all)?))
}

/// Fallback for unmatched paths.
pub async fn not_found() -> AppError {
    AppError::not_found("not found")
}
