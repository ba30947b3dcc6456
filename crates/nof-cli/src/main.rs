mod cmd;

use clap::{ArgAction, Parser, Subcommand};
use cmd::executor::ExecutorArgs;
use cmd::node::{ControllerArgs, DashboardArgs, RemoteDashboardArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "nof",
    about = "Distribute shell commands across hosts through controller and dashboard tiers",
    version,
    propagate_version = true
)]
struct Cli {
    /// Increase log verbosity (-vv warn, -vvv info, -vvvv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Verbosity level as a number, same scale as -v
    #[arg(long, global = true, env = "NOF_VERBOSE", hide = true)]
    verbosity: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller: serves jobs to executors and collects reports
    Controller(ControllerArgs),

    /// Run the local dashboard
    Dashboard(DashboardArgs),

    /// Run the remote dashboard
    RemoteDashboard(RemoteDashboardArgs),

    /// Run the executor against a controller
    Executor(ExecutorArgs),
}

/// 0-1 error, 2 warn, 3 info, 4+ debug.
fn level_for(verbosity: u8) -> tracing::Level {
    match verbosity {
        0 | 1 => tracing::Level::ERROR,
        2 => tracing::Level::WARN,
        3 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    }
}

/// `RUST_LOG` wins when set; otherwise the verbosity flag picks the level.
fn env_filter(verbosity: u8, rust_log: Option<&str>) -> EnvFilter {
    let fallback = || EnvFilter::default().add_directive(level_for(verbosity).into());
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(spec) => EnvFilter::try_new(spec).unwrap_or_else(|e| {
            eprintln!("ignoring RUST_LOG: {e}");
            fallback()
        }),
        None => fallback(),
    }
}

fn main() {
    let cli = Cli::parse();

    let verbosity = cli.verbose.max(cli.verbosity.unwrap_or(0));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(
            verbosity,
            std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(),
        ))
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Controller(args) => cmd::node::run(args.into_config()),
        Commands::Dashboard(args) => cmd::node::run(args.into_config()),
        Commands::RemoteDashboard(args) => cmd::node::run(args.into_config()),
        Commands::Executor(args) => cmd::executor::run(args.into_config()),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_ladder() {
        assert_eq!(level_for(0), tracing::Level::ERROR);
        assert_eq!(level_for(1), tracing::Level::ERROR);
        assert_eq!(level_for(2), tracing::Level::WARN);
        assert_eq!(level_for(3), tracing::Level::INFO);
        assert_eq!(level_for(9), tracing::Level::DEBUG);
    }

    #[test]
    fn rust_log_replaces_the_verbosity_level() {
        let filter = env_filter(0, Some("nof_server=debug"));
        assert_eq!(filter.to_string(), "nof_server=debug");
    }

    #[test]
    fn verbosity_applies_without_rust_log() {
        assert_eq!(env_filter(3, None).to_string(), "info");
        assert_eq!(env_filter(4, Some("  ")).to_string(), "debug");
    }

    #[test]
    fn unparsable_rust_log_falls_back_to_verbosity() {
        assert_eq!(env_filter(2, Some("nof_server=loud")).to_string(), "warn");
    }

    #[test]
    fn repeated_v_counts() {
        let cli = Cli::try_parse_from(["nof", "-vvv", "executor"]).unwrap();
        assert_eq!(cli.verbose, 3);
    }
}
