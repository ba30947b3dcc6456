pub mod client;
pub mod error;
pub mod format;
pub mod job;
pub mod scheduler;
pub mod worker;

pub use client::ControllerClient;
pub use error::{ExecutorError, Result};
pub use format::OutputFormatter;
pub use job::{Job, JobKind, JobOpts, Report};
pub use scheduler::{ExecutorConfig, ReconcileReport, Scheduler};
