//! Sync Exchange: the push-pull round a tier runs against its northbound
//! neighbour.
//!
//! The caller drains its northbound queue and POSTs it to the peer's
//! `/activities/sync`. The peer applies the batch and answers with its
//! southbound queue under a lease, which the caller then applies and
//! acknowledges (`?ack=<lease>`) on its next request. If the round fails
//! before the peer answers, the drained batch goes back to the head of the
//! queue; replays of anything the peer did apply are skipped by uuid. A
//! reply lost on the way back leaves the lease unacknowledged, so the peer
//! sends the same activities again.

use std::time::Duration;

use anyhow::Context;
use nof_core::{Activity, Direction, SyncOutcome};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Peer;
use crate::state::AppState;

pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Body returned by `POST /activities/sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
    /// Acknowledge with `?ack=` on the next exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<Uuid>,
}

/// What one successful exchange moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeReport {
    pub sent: usize,
    pub received: SyncOutcome,
}

pub fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(EXCHANGE_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> nof_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f)
        .await
        .context("task join error")??)
}

async fn post_batch(
    client: &reqwest::Client,
    peer: &Peer,
    batch: &[Activity],
    ack: Option<Uuid>,
) -> anyhow::Result<SyncResponse> {
    let url = match ack {
        Some(lease) => format!("{}?ack={lease}", peer.sync_url()),
        None => peer.sync_url(),
    };
    let response = client
        .post(url)
        .json(batch)
        .send()
        .await
        .with_context(|| format!("{peer} unreachable"))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{peer} answered {status}: {body}");
    }
    response
        .json::<SyncResponse>()
        .await
        .with_context(|| format!("{peer} sent an unreadable sync response"))
}

/// Run one Sync Exchange against `peer`.
pub async fn exchange_once(
    state: &AppState,
    client: &reqwest::Client,
    peer: &Peer,
) -> anyhow::Result<ExchangeReport> {
    let log = state.log.clone();
    let outbound = blocking(move || log.drain_northbound()).await?;

    let ack = state.sync.lease_to_ack();
    let response = match post_batch(client, peer, &outbound, ack).await {
        Ok(response) => response,
        Err(e) => {
            let log = state.log.clone();
            let count = outbound.len();
            blocking(move || log.requeue(Direction::Northbound, &outbound)).await?;
            state.sync.mark_failed(e.to_string());
            return Err(e.context(format!("sync exchange failed, {count} activities requeued")));
        }
    };

    let sent = outbound.len();
    let log = state.log.clone();
    let inbound = response.activities;
    let received = match blocking(move || log.sync(inbound, Direction::Northbound)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            state.sync.mark_failed(e.to_string());
            return Err(e.context(format!("failed to apply activities from {peer}")));
        }
    };

    state.sync.set_lease_to_ack(response.lease);
    state.sync.mark_synced();
    if sent > 0 || received.applied > 0 {
        tracing::info!(
            %peer,
            sent,
            applied = received.applied,
            skipped = received.skipped,
            rejected = received.rejected,
            "sync exchange complete"
        );
    } else {
        tracing::debug!(%peer, "sync exchange complete, nothing to move");
    }
    Ok(ExchangeReport { sent, received })
}

/// Run the Sync Exchange every `interval` until `shutdown` fires. A failed
/// round is logged and retried at the next tick.
pub async fn run_sync_loop(
    state: AppState,
    peer: Peer,
    interval: Duration,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let client = http_client()?;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(%peer, interval_secs = interval.as_secs(), "starting sync loop");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if let Err(e) = exchange_once(&state, &client, &peer).await {
            tracing::warn!(%peer, "{e:#}");
        }
    }
    tracing::info!(%peer, "sync loop stopped");
    Ok(())
}
