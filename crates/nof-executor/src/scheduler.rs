//! Reconciles running workers against the controller's job list.
//!
//! Worker lifecycle per job uuid: `absent -> running -> stopped/absent`.
//! A shell job gets a long-lived worker the first time it appears and is
//! cancelled when it disappears. A oneshot job runs once per appearance: its
//! uuid is remembered while it stays listed and forgotten when it leaves, so
//! a reappearance fires it again. No state survives a restart; the next poll
//! rebuilds it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::ControllerClient;
use crate::error::Result;
use crate::job::{Job, JobKind};
use crate::worker;

pub const DEFAULT_CONTROLLER_URL: &str = "http://localhost:8070";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub controller_url: String,
    pub interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            controller_url: DEFAULT_CONTROLLER_URL.to_string(),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

struct WorkerHandle {
    instance: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<Uuid>,
    pub stopped: Vec<Uuid>,
    pub fired: Vec<Uuid>,
    pub skipped: Vec<Uuid>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
            && self.stopped.is_empty()
            && self.fired.is_empty()
            && self.skipped.is_empty()
    }
}

pub struct Scheduler {
    client: ControllerClient,
    workers: Mutex<HashMap<Uuid, WorkerHandle>>,
    fired: Mutex<HashSet<Uuid>>,
    next_instance: AtomicU64,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(client: ControllerClient) -> Self {
        Self {
            client,
            workers: Mutex::new(HashMap::new()),
            fired: Mutex::new(HashSet::new()),
            next_instance: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Result<Self> {
        Ok(Self::new(ControllerClient::new(&config.controller_url)?))
    }

    pub fn client(&self) -> &ControllerClient {
        &self.client
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<Uuid, WorkerHandle>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fired(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.fired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Uuids of live shell workers, sorted.
    pub fn running(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .workers()
            .iter()
            .filter(|(_, w)| !w.task.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Instance id of the live worker for `job`. Changes only when the
    /// worker is restarted.
    pub fn worker_instance(&self, job: Uuid) -> Option<u64> {
        self.workers()
            .get(&job)
            .filter(|w| !w.task.is_finished())
            .map(|w| w.instance)
    }

    /// Diff `jobs` against the running set: stop workers whose job is gone,
    /// start workers for new jobs, leave the rest untouched. Must be called
    /// inside a tokio runtime.
    pub fn reconcile(&self, jobs: &[Job]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let listed: HashSet<Uuid> = jobs.iter().map(|j| j.uuid).collect();

        let mut workers = self.workers();
        let gone: Vec<Uuid> = workers
            .iter()
            .filter(|(id, w)| !listed.contains(id) || w.task.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for id in gone {
            if let Some(w) = workers.remove(&id) {
                w.cancel.cancel();
                if listed.contains(&id) {
                    tracing::warn!(job = %id, "worker exited on its own, restarting");
                } else {
                    tracing::info!(job = %id, "job removed, stopping worker");
                    report.stopped.push(id);
                }
            }
        }

        let mut fired = self.fired();
        fired.retain(|id| listed.contains(id));

        for job in jobs {
            match job.job_kind() {
                Some(JobKind::Shell) => {
                    if workers.contains_key(&job.uuid) {
                        continue;
                    }
                    let interval = match job.opts.interval {
                        Some(secs) if secs > 0 && !job.opts.cmd.trim().is_empty() => {
                            Duration::from_secs(secs)
                        }
                        _ => {
                            tracing::warn!(job = %job.uuid, "shell job without command or interval, skipping");
                            report.skipped.push(job.uuid);
                            continue;
                        }
                    };
                    let cancel = self.shutdown.child_token();
                    let task = tokio::spawn(worker::run_shell(
                        self.client.clone(),
                        job.clone(),
                        interval,
                        cancel.clone(),
                    ));
                    let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);
                    workers.insert(
                        job.uuid,
                        WorkerHandle {
                            instance,
                            cancel,
                            task,
                        },
                    );
                    report.started.push(job.uuid);
                }
                Some(JobKind::Oneshot) => {
                    if job.opts.cmd.trim().is_empty() {
                        if fired.insert(job.uuid) {
                            tracing::warn!(job = %job.uuid, "oneshot job without command, skipping");
                            report.skipped.push(job.uuid);
                        }
                        continue;
                    }
                    if fired.insert(job.uuid) {
                        tokio::spawn(worker::run_oneshot(
                            self.client.clone(),
                            job.clone(),
                            self.shutdown.child_token(),
                        ));
                        report.fired.push(job.uuid);
                    }
                }
                None => {
                    tracing::warn!(job = %job.uuid, kind = %job.kind, "unknown job type, skipping");
                    report.skipped.push(job.uuid);
                }
            }
        }

        if !report.started.is_empty() || !report.stopped.is_empty() || !report.fired.is_empty() {
            tracing::info!(
                started = report.started.len(),
                stopped = report.stopped.len(),
                fired = report.fired.len(),
                running = workers.len(),
                "reconciled jobs"
            );
        }
        report
    }

    /// Fetch the job list and reconcile. On a fetch error the running set
    /// is left as is.
    pub async fn poll_once(&self) -> Result<ReconcileReport> {
        let jobs = self.client.fetch_jobs().await?;
        Ok(self.reconcile(&jobs))
    }

    /// Poll every `interval` until `shutdown` fires, then stop all workers.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        tracing::info!(
            controller = %self.client.base_url(),
            interval_secs = interval.as_secs(),
            "executor started"
        );
        loop {
            if let Err(e) = self.poll_once().await {
                tracing::warn!(error = %e, "could not fetch jobs from controller");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        self.stop_all().await;
        tracing::info!("executor stopped");
    }

    /// Cancel every worker and wait for the shell workers to finish. The
    /// scheduler starts nothing afterwards.
    pub async fn stop_all(&self) {
        self.shutdown.cancel();
        let handles: Vec<(Uuid, WorkerHandle)> = self.workers().drain().collect();
        for (id, w) in handles {
            if let Err(e) = w.task.await {
                tracing::warn!(job = %id, error = %e, "worker ended abnormally");
            }
        }
    }
}
