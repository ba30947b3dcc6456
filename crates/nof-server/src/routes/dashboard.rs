//! Configuration edits. Each route applies one action through the activity
//! log and answers with the handler result, or redirects to `return_url`.

use axum::extract::State;
use axum::response::Response;
use nof_core::ActionKind;

use crate::error::AppError;
use crate::routes::call_action;
use crate::state::AppState;
use crate::submission::Submission;

async fn apply(app: &AppState, action: ActionKind, submission: Submission) -> Result<Response, AppError> {
    let result = call_action(app, action, submission.fields.clone()).await?;
    Ok(submission.respond(result))
}

/// POST /tasktemplate
pub async fn create_tasktemplate(
    State(app): State<AppState>,
    submission: Submission,
) -> Result<Response, AppError> {
    apply(&app, ActionKind::TasktemplateAdd, submission).await
}

/// POST /tasktemplate/delete
pub async fn delete_tasktemplate(
    State(app): State<AppState>,
    submission: Submission,
) -> Result<Response, AppError> {
    apply(&app, ActionKind::TasktemplateDelete, submission).await
}

/// POST /host
pub async fn create_host(
    State(app): State<AppState>,
    submission: Submission,
) -> Result<Response, AppError> {
    apply(&app, ActionKind::HostAdd, submission).await
}

/// POST /host/delete
pub async fn delete_host(
    State(app): State<AppState>,
    submission: Submission,
) -> Result<Response, AppError> {
    apply(&app, ActionKind::HostDelete, submission).await
}

/// POST /task
pub async fn create_task(
    State(app): State<AppState>,
    submission: Submission,
) -> Result<Response, AppError> {
    apply(&app, ActionKind::TaskAdd, submission).await
}

/// POST /task/delete
pub async fn delete_task(
    State(app): State<AppState>,
    submission: Submission,
) -> Result<Response, AppError> {
    apply(&app, ActionKind::TaskDelete, submission).await
}
