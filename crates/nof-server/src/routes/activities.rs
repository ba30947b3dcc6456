use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use nof_core::{Activity, Direction};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::routes::blocking;
use crate::state::AppState;
use crate::sync::SyncResponse;

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    /// Lease from our previous reply that the caller has applied.
    #[serde(default)]
    pub ack: Option<Uuid>,
}

/// POST /activities/sync: the northbound side of a Sync Exchange.
///
/// Releases the acknowledged lease, applies the caller's batch as coming
/// from the south and answers with this node's southbound queue under a new
/// lease. The queue is only cleared once the caller acknowledges it.
pub async fn sync_activities(
    State(app): State<AppState>,
    params: Result<Query<SyncParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<SyncResponse>, AppError> {
    let Query(params) = params.map_err(|e| AppError::bad_request(e.body_text()))?;
    let batch: Vec<Activity> = if body.iter().all(u8::is_ascii_whitespace) {
        Vec::new()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("invalid activity batch: {e}")))?
    };
    let received = batch.len();

    let log = app.log.clone();
    let result = blocking(move || {
        if let Some(lease) = params.ack {
            log.ack(Direction::Southbound, lease)?;
        }
        let outcome = log.sync(batch, Direction::Southbound)?;
        let lease = log.lease(Direction::Southbound)?;
        Ok((outcome, lease))
    })
    .await;

    let (outcome, lease) = match result {
        Ok(v) => v,
        Err(e) => {
            app.sync.mark_failed(e.0.to_string());
            return Err(e);
        }
    };
    app.sync.mark_synced();

    let (lease, outbound) = match lease {
        Some(l) => (Some(l.id), l.activities),
        None => (None, Vec::new()),
    };
    Ok(Json(SyncResponse {
        status: "ok".into(),
        message: format!(
            "received {received}: {} applied, {} skipped, {} rejected; returning {}",
            outcome.applied,
            outcome.skipped,
            outcome.rejected,
            outbound.len()
        ),
        activities: outbound,
        lease,
    }))
}
