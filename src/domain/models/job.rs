use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::models::ParseEnumError;

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(ParseEnumError(format!("unknown job status: {}", other))),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = ParseEnumError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A durable named job. `attempts` counts claims, so a handler observing a
/// job sees attempt numbers starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub execute_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        name: &str,
        payload: serde_json::Value,
        priority: i32,
        execute_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            payload,
            priority,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            status: JobStatus::Pending,
            last_error: None,
            execute_at,
            created_at: now,
            updated_at: now,
        }
    }
}
