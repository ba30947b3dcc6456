use std::time::Duration;

use clap::Args;
use nof_executor::scheduler::{DEFAULT_CONTROLLER_URL, DEFAULT_POLL_INTERVAL};
use nof_executor::{ExecutorConfig, Scheduler};
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct ExecutorArgs {
    /// Base URL of the controller
    #[arg(long, env = "CONTROLLER_URL", default_value = DEFAULT_CONTROLLER_URL)]
    pub controller_url: String,

    /// Seconds between job list polls
    #[arg(long, env = "EXECUTOR_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub interval: u64,
}

impl ExecutorArgs {
    pub fn into_config(self) -> ExecutorConfig {
        ExecutorConfig {
            controller_url: self.controller_url,
            interval: Duration::from_secs(self.interval.max(1)),
        }
    }
}

pub fn run(config: ExecutorConfig) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let scheduler = Scheduler::from_config(&config)?;
        let shutdown = CancellationToken::new();
        super::cancel_on_ctrl_c(shutdown.clone());
        scheduler.run(config.interval, shutdown).await;
        Ok::<_, anyhow::Error>(())
    })
}
