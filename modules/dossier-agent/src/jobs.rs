//! In-memory registry of investigation jobs with time-based eviction.

use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_JOB_CAPACITY: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub subject: String,
    pub status: JobStatus,
    pub logs: Vec<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Jobs keyed by id. Entries expire `ttl` after their last write; the
/// registry holds at most `capacity` jobs.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Cache<Uuid, JobRecord>,
}

impl JobRegistry {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        let jobs = Cache::builder().max_capacity(capacity).time_to_live(ttl).build();
        Self { jobs }
    }

    pub fn create(&self, subject: &str) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.jobs.insert(
            id,
            JobRecord {
                id,
                subject: subject.to_string(),
                status: JobStatus::Queued,
                logs: Vec::new(),
                result: None,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        debug!(job_id = %id, subject, "Job created");
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<JobRecord> {
        self.jobs.get(id)
    }

    pub fn set_status(&self, id: &Uuid, status: JobStatus) -> bool {
        self.update(id, |job| job.status = status)
    }

    pub fn append_log(&self, id: &Uuid, line: impl Into<String>) -> bool {
        let line = line.into();
        self.update(id, |job| job.logs.push(line))
    }

    pub fn complete(&self, id: &Uuid, result: serde_json::Value) -> bool {
        self.update(id, |job| {
            job.status = JobStatus::Completed;
            job.result = Some(result);
        })
    }

    pub fn fail(&self, id: &Uuid, error: impl Into<String>) -> bool {
        let error = error.into();
        self.update(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        })
    }

    /// Apply `change` to a live job atomically with respect to other updates
    /// of the same id. `false` when the job is unknown or has expired.
    fn update(&self, id: &Uuid, change: impl FnOnce(&mut JobRecord)) -> bool {
        let outcome = self.jobs.entry_by_ref(id).and_compute_with(|current| match current {
            Some(entry) => {
                let mut job = entry.into_value();
                change(&mut job);
                job.updated_at = Utc::now();
                Op::Put(job)
            }
            None => Op::Nop,
        });
        matches!(outcome, CompResult::ReplacedWith(_))
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_JOB_TTL, DEFAULT_JOB_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_lifecycle_is_recorded() {
        let registry = JobRegistry::default();
        let id = registry.create("Acme");
        assert_eq!(registry.get(&id).unwrap().status, JobStatus::Queued);

        assert!(registry.set_status(&id, JobStatus::Running));
        assert!(registry.append_log(&id, "pass 1 started"));
        assert!(registry.complete(&id, json!({"subject": "Acme"})));

        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.logs, vec!["pass 1 started"]);
        assert_eq!(job.result.unwrap()["subject"], "Acme");
        assert!(job.updated_at >= job.created_at);
    }

    #[test]
    fn failures_keep_the_error() {
        let registry = JobRegistry::default();
        let id = registry.create("Acme");
        registry.fail(&id, "Contract violation: no subject");
        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("Contract violation: no subject"));
    }

    #[test]
    fn unknown_jobs_are_not_updated() {
        let registry = JobRegistry::default();
        let id = Uuid::new_v4();
        assert!(!registry.set_status(&id, JobStatus::Running));
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn concurrent_updates_to_one_job_are_all_kept() {
        let registry = JobRegistry::default();
        let id = registry.create("Acme");

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let registry = &registry;
                scope.spawn(move || {
                    for step in 0..50 {
                        assert!(registry.append_log(&id, format!("worker {worker} step {step}")));
                    }
                });
            }
        });
        registry.complete(&id, json!({"subject": "Acme"}));

        let job = registry.get(&id).unwrap();
        assert_eq!(job.logs.len(), 400);
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.logs.contains(&"worker 7 step 49".to_string()));
    }

    #[test]
    fn expired_jobs_disappear() {
        let registry = JobRegistry::new(Duration::from_millis(20), 10);
        let id = registry.create("Acme");
        std::thread::sleep(Duration::from_millis(60));
        assert!(registry.get(&id).is_none());
        assert!(!registry.append_log(&id, "late"));
    }
}
