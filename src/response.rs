use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::job_store::{JobRecord, JobStatus};

/// 202 body returned when a job is queued.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

impl JobResponse {
    pub fn queued(job_id: String, message: &str) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&JobRecord> for JobStatusResponse {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            progress: job.progress,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobResultResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRecord> for JobResultResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            result: job.result,
            error_message: job.error_message,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_lowercase() {
        let body = JobResponse::queued("abc".to_string(), "job accepted");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["job_id"], "abc");
    }
}
