//! In-memory job registry.
//!
//! Every mutation is applied under a single write guard, so pollers reading
//! through [`JobStore::get`] only ever see whole snapshots.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{ErrorDetail, JobRecord, JobState};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown job id: {0}")]
    NotFound(String),

    #[error("job {job_id} is already {}", .status.as_str())]
    AlreadyTerminal { job_id: String, status: JobState },
}

/// A single state-machine step applied to a job.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    /// Moves the job to `processing`; progress never decreases and stays
    /// below 100 until the job is done.
    Progress { progress: u8, message: String },
    Done {
        message: String,
        result_location: String,
    },
    Failed {
        message: String,
        error: ErrorDetail,
        diagnostic: Option<String>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> JobRecord {
        let record = JobRecord::new(Uuid::new_v4().to_string(), Utc::now());
        let mut jobs = self.jobs.write().await;
        jobs.insert(record.job_id.clone(), record.clone());
        record
    }

    pub async fn get(&self, job_id: &str) -> Result<JobRecord, StoreError> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    pub async fn update(&self, job_id: &str, update: JobUpdate) -> Result<JobRecord, StoreError> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return Err(StoreError::NotFound(job_id.to_string()));
        };

        if job.status.is_terminal() {
            return Err(StoreError::AlreadyTerminal {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }

        match update {
            JobUpdate::Progress { progress, message } => {
                job.status = JobState::Processing;
                job.progress = progress.min(99).max(job.progress);
                job.message = Some(message);
            }
            JobUpdate::Done {
                message,
                result_location,
            } => {
                job.status = JobState::Done;
                job.progress = 100;
                job.message = Some(message);
                job.result_location = Some(result_location);
                job.error_detail = None;
                job.diagnostic = None;
            }
            JobUpdate::Failed {
                message,
                error,
                diagnostic,
            } => {
                job.status = JobState::Error;
                job.message = Some(message);
                job.error_detail = Some(error);
                job.diagnostic = diagnostic;
                job.result_location = None;
            }
        }
        job.updated_at = Utc::now();

        Ok(job.clone())
    }

    /// Drops a job that never made it onto the work queue.
    pub async fn remove(&self, job_id: &str) -> Option<JobRecord> {
        let mut jobs = self.jobs.write().await;
        jobs.remove(job_id)
    }

    /// Evicts terminal records last touched before `cutoff`.
    pub async fn evict_terminal_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.updated_at < cutoff));
        before - jobs.len()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
