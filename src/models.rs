use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionCue {
    pub word: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAcceptedResponse {
    pub job_id: String,
    pub status: JobState,
    pub progress: u8,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: String,
    pub status: JobState,
    pub progress: u8,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Authoritative job snapshot held by the job store.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: JobState,
    pub progress: u8,
    pub message: Option<String>,
    pub result_location: Option<String>,
    pub error_detail: Option<ErrorDetail>,
    /// Operator-only diagnostic (e.g. encoder stderr); never serialized.
    pub diagnostic: Option<String>,
}

impl JobRecord {
    pub fn new(job_id: String, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            created_at: now,
            updated_at: now,
            status: JobState::Pending,
            progress: 0,
            message: Some("Waiting to start".to_string()),
            result_location: None,
            error_detail: None,
            diagnostic: None,
        }
    }

    pub fn to_response(&self) -> JobResponse {
        JobResponse {
            job_id: self.job_id.clone(),
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            result_location: self.result_location.clone(),
            error_detail: self.error_detail.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
