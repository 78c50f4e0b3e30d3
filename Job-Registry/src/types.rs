use serde::{Deserialize, Serialize};

/// Job status lifecycle: Running -> Completed/Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// One generation run as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    /// `sheet` or `text`.
    pub input_mode: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    /// Item produced by the run, when it completed.
    pub post_id: Option<String>,
    pub error: Option<String>,
    /// First characters of the submitted text, for text runs.
    pub text_preview: Option<String>,
}

impl JobRecord {
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [JobStatus::Running, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("cancelled"), None);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = JobRecord {
            id: "job-1".into(),
            status: JobStatus::Running,
            input_mode: "text".into(),
            started_at: "2025-01-01T00:00:00+00:00".into(),
            completed_at: None,
            post_id: None,
            error: None,
            text_preview: Some("hello".into()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["inputMode"], "text");
        assert_eq!(json["textPreview"], "hello");
        assert!(record.is_running());
    }
}
