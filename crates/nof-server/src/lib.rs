pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod submission;
pub mod sync;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::{NodeConfig, Role};
use crate::state::AppState;

/// Build the router for `state.role`: the common node routes plus the
/// controller or dashboard extras. Used by `Node` and by tests.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(routes::node::index))
        .route("/info.json", get(routes::node::info))
        .route("/status.json", get(routes::node::status))
        .route("/activities.json", get(routes::node::activities))
        .route("/activities/sync", post(routes::activities::sync_activities))
        .route("/tasktemplates.json", get(routes::node::list_tasktemplates))
        .route("/hosts.json", get(routes::node::list_hosts))
        .route("/tasks.json", get(routes::node::list_tasks))
        .route("/results.json", get(routes::node::list_results));

    router = match state.role {
        Role::Controller => router
            .route("/jobs.json", get(routes::controller::list_jobs))
            .route("/report", post(routes::controller::report)),
        Role::Dashboard | Role::RemoteDashboard => router
            .route("/tasktemplate", post(routes::dashboard::create_tasktemplate))
            .route(
                "/tasktemplate/delete",
                post(routes::dashboard::delete_tasktemplate),
            )
            .route("/host", post(routes::dashboard::create_host))
            .route("/host/delete", post(routes::dashboard::delete_host))
            .route("/task", post(routes::dashboard::create_task))
            .route("/task/delete", post(routes::dashboard::delete_task)),
    };

    router
        .fallback(routes::node::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// One running tier: HTTP surface plus, when a northbound peer is
/// configured, the background Sync Exchange loop.
pub struct Node {
    config: NodeConfig,
    state: AppState,
}

impl Node {
    /// Open the tier's store. Blocking.
    pub fn open(config: NodeConfig) -> anyhow::Result<Self> {
        let state = AppState::open(&config)
            .with_context(|| format!("failed to open {}", config.db_path.display()))?;
        Ok(Self { config, state })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve on a pre-bound listener until `shutdown` is cancelled.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        let role = self.config.role;
        tracing::info!(%role, "listening on http://{addr}");

        let sync_task = self.config.northbound.clone().map(|peer| {
            tokio::spawn(sync::run_sync_loop(
                self.state.clone(),
                peer,
                self.config.sync_interval,
                shutdown.child_token(),
            ))
        });
        if sync_task.is_none() {
            tracing::info!(%role, "no northbound peer, sync loop disabled");
        }

        let app = build_router(self.state.clone());
        let token = shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;

        // Stop the sync loop even if the server exited on its own.
        shutdown.cancel();
        if let Some(task) = sync_task {
            task.await.context("sync loop panicked")??;
        }
        served?;
        tracing::info!(%role, "shut down");
        Ok(())
    }
}

/// Bind `config`'s listen address and run the tier until `shutdown`.
pub async fn serve(config: NodeConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr()))?;
    let node = tokio::task::spawn_blocking(move || Node::open(config))
        .await
        .context("task join error")??;
    node.run(listener, shutdown).await
}
