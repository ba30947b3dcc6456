use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use nof_core::db::DEFAULT_POOL_SIZE;
use nof_server::config::{NodeConfig, Peer, Role};
use tokio_util::sync::CancellationToken;

/// Options every tier shares.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Seconds between Sync Exchanges with the northbound peer
    #[arg(long, env = "NOF_SYNC_INTERVAL", default_value_t = 5)]
    pub sync_interval: u64,

    /// Number of pooled database connections
    #[arg(long, env = "NOF_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Do not sync with a northbound peer
    #[arg(long)]
    pub standalone: bool,
}

#[derive(Args, Debug)]
pub struct ControllerArgs {
    /// Listen host
    #[arg(long, env = "CONTROLLER_HOST", default_value = "localhost")]
    pub host: String,

    /// Listen port
    #[arg(long, env = "CONTROLLER_PORT", default_value_t = 8070)]
    pub port: u16,

    /// Dashboard host to sync with
    #[arg(long, env = "DASHBOARD_HOST", default_value = "localhost")]
    pub dashboard_host: String,

    /// Dashboard port to sync with
    #[arg(long, env = "DASHBOARD_PORT", default_value_t = 8080)]
    pub dashboard_port: u16,

    /// Database file (default ~/.nof/CTRL.db)
    #[arg(long, env = "NOF_CTRL_DB_FILE")]
    pub db_file: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct DashboardArgs {
    /// Listen host
    #[arg(long, env = "DASHBOARD_HOST", default_value = "localhost")]
    pub host: String,

    /// Listen port
    #[arg(long, env = "DASHBOARD_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Remote dashboard host to sync with
    #[arg(long, env = "REMOTEDASHBOARD_HOST", default_value = "localhost")]
    pub remote_host: String,

    /// Remote dashboard port to sync with
    #[arg(long, env = "REMOTEDASHBOARD_PORT", default_value_t = 8090)]
    pub remote_port: u16,

    /// Database file (default ~/.nof/DASH.db)
    #[arg(long, env = "NOF_DASH_DB_FILE")]
    pub db_file: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct RemoteDashboardArgs {
    /// Listen host
    #[arg(long, env = "REMOTEDASHBOARD_HOST", default_value = "localhost")]
    pub host: String,

    /// Listen port
    #[arg(long, env = "REMOTEDASHBOARD_PORT", default_value_t = 8090)]
    pub port: u16,

    /// Database file (default ~/.nof/RASH.db)
    #[arg(long, env = "NOF_RASH_DB_FILE")]
    pub db_file: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

fn build(
    role: Role,
    host: String,
    port: u16,
    peer: Option<Peer>,
    db_file: Option<PathBuf>,
    common: CommonArgs,
) -> NodeConfig {
    let mut config = NodeConfig::new(role);
    config.host = host;
    config.port = port;
    config.northbound = if common.standalone { None } else { peer };
    config.sync_interval = Duration::from_secs(common.sync_interval.max(1));
    config.pool_size = common.pool_size;
    if let Some(path) = db_file {
        config.db_path = path;
    }
    config
}

impl ControllerArgs {
    pub fn into_config(self) -> NodeConfig {
        let peer = Peer::new(self.dashboard_host, self.dashboard_port);
        build(Role::Controller, self.host, self.port, Some(peer), self.db_file, self.common)
    }
}

impl DashboardArgs {
    pub fn into_config(self) -> NodeConfig {
        let peer = Peer::new(self.remote_host, self.remote_port);
        build(Role::Dashboard, self.host, self.port, Some(peer), self.db_file, self.common)
    }
}

impl RemoteDashboardArgs {
    pub fn into_config(self) -> NodeConfig {
        build(Role::RemoteDashboard, self.host, self.port, None, self.db_file, self.common)
    }
}

pub fn run(config: NodeConfig) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let shutdown = CancellationToken::new();
        super::cancel_on_ctrl_c(shutdown.clone());
        nof_server::serve(config, shutdown).await
    })
}
