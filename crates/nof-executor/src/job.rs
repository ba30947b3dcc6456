use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Execution mode named by a job's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Run every `interval` seconds until the job disappears.
    Shell,
    /// Run once per appearance in the job list.
    Oneshot,
}

/// Job as served by the controller's `/jobs.json`. `type` stays a plain
/// string so one unknown type does not fail the whole poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub uuid: Uuid,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub opts: JobOpts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOpts {
    #[serde(default)]
    pub cmd: String,
    #[serde(default, deserialize_with = "interval_secs")]
    pub interval: Option<u64>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

fn interval_secs<'de, D>(d: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl Job {
    pub fn job_kind(&self) -> Option<JobKind> {
        match self.kind.as_str() {
            "shell" => Some(JobKind::Shell),
            "oneshot" => Some(JobKind::Oneshot),
            _ => None,
        }
    }
}

/// Body posted to the controller's `/report`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub uuid: Uuid,
    pub result: String,
    pub timestamp: i64,
}

impl Report {
    pub fn now(job: Uuid, result: String) -> Self {
        Self {
            uuid: job,
            result,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Decode a job list entry by entry, dropping entries that are not jobs.
pub fn decode_jobs(raw: Vec<Value>) -> Vec<Job> {
    raw.into_iter()
        .filter_map(|entry| match serde_json::from_value::<Job>(entry) {
            Ok(job) => Some(job),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed job");
                None
            }
        })
        .collect()
}
