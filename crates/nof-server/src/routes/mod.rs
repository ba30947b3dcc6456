pub mod activities;
pub mod controller;
pub mod dashboard;
pub mod node;

use nof_core::ActionKind;
use serde_json::Value;

use crate::error::AppError;
use crate::state::AppState;

/// Run blocking store work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> nof_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let value = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(value)
}

/// Apply `action` through the activity log and return the handler result.
pub(crate) async fn call_action(
    app: &AppState,
    action: ActionKind,
    opts: Value,
) -> Result<Value, AppError> {
    let log = app.log.clone();
    let (uuid, result) = blocking(move || log.call_action(action, opts)).await?;
    tracing::info!(activity = %uuid, %action, "applied local change");
    Ok(result)
}
