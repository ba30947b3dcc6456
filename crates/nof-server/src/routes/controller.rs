use axum::extract::State;
use axum::Json;
use nof_core::models::jobs;
use nof_core::ActionKind;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::routes::{blocking, call_action};
use crate::state::AppState;
use crate::submission::Submission;

/// GET /jobs.json: every task expanded with its host and template.
pub async fn list_jobs(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let db = app.db.clone();
    let all = blocking(move || db.with_connection(jobs::all)).await?;
    Ok(Json(serde_json::to_value(all)?))
}

/// Executor report: `uuid` names the job.
#[derive(Debug, Deserialize)]
struct ReportBody {
    uuid: Uuid,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    timestamp: Option<Value>,
}

/// POST /report: record an execution result and stage it northbound.
pub async fn report(
    State(app): State<AppState>,
    submission: Submission,
) -> Result<Json<Value>, AppError> {
    let body: ReportBody = submission.parse()?;
    let opts = json!({
        "job_uuid": body.uuid,
        "result": body.result.unwrap_or_default(),
        "timestamp": body.timestamp,
    });
    let result = call_action(&app, ActionKind::ResultAdd, opts).await?;
    tracing::debug!(job = %body.uuid, result = %result["uuid"], "stored report");
    Ok(Json(json!({ "status": "ok" })))
}
