use serde::{Deserialize, Serialize};

/// Run-level result of one matching pass.
///
/// Always returned for partial failures; per-row problems land in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// `None` when there was nothing to match
    #[serde(rename = "matchBatchId")]
    pub match_batch_id: Option<String>,
    #[serde(rename = "applicantsConsidered")]
    pub applicants_considered: usize,
    /// Considered applicants whose processed flag was set
    #[serde(rename = "applicantsMarked")]
    pub applicants_marked: usize,
    #[serde(rename = "applicantsRejected")]
    pub applicants_rejected: usize,
    #[serde(rename = "applicantsDeferred")]
    pub applicants_deferred: usize,
    /// One per eligible pairing written, duplicates included
    #[serde(rename = "matchesCreated")]
    pub matches_created: usize,
    #[serde(rename = "matchesFailed")]
    pub matches_failed: usize,
    pub errors: Vec<String>,
}

impl BatchReport {
    pub fn is_noop(&self) -> bool {
        self.match_batch_id.is_none()
    }
}

/// Result of ingesting one upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    #[serde(rename = "batchId")]
    pub batch_id: String,
    #[serde(rename = "applicantsAdded")]
    pub applicants_added: usize,
    #[serde(rename = "applicantsFailed")]
    pub applicants_failed: usize,
    pub errors: Vec<String>,
}

/// Payload sent to the downstream workflow once a batch completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNotification {
    #[serde(rename = "batchId")]
    pub batch_id: String,
    #[serde(rename = "userCount")]
    pub user_count: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "manualTrigger")]
    pub manual_trigger: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthResponse {
    /// Build the report from a database check; a failed check still answers
    pub fn from_check<E: std::fmt::Display>(database: Result<(), E>) -> Self {
        let (status, database) = match database {
            Ok(()) => ("healthy", "connected".to_string()),
            Err(e) => ("degraded", format!("error: {}", e)),
        };

        Self {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_reports_unreachable_database() {
        let down = HealthResponse::from_check(Err("connection refused"));
        assert_eq!(down.status, "degraded");
        assert_eq!(down.database, "error: connection refused");

        let up = HealthResponse::from_check::<String>(Ok(()));
        assert_eq!(up.status, "healthy");
        assert_eq!(up.database, "connected");
    }
}
