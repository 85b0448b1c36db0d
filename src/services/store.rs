use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::models::{Applicant, BatchNotification, MatchKey, MatchRecord, ProductRule};
use crate::services::webhook::{BatchNotifier, NotifyError};

/// Unprocessed applicants pulled per run when no ingestion batch is named
pub const DEFAULT_UNSCOPED_LIMIT: usize = 100;

/// Errors raised by persistence collaborators
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected: {0}")]
    Rejected(String),
}

/// Which unprocessed applicants a run should pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicantScope {
    /// Every unprocessed applicant of one ingestion batch
    Batch(String),
    /// Up to `limit` unprocessed applicants from any batch
    Unscoped { limit: usize },
}

impl Default for ApplicantScope {
    fn default() -> Self {
        ApplicantScope::Unscoped {
            limit: DEFAULT_UNSCOPED_LIMIT,
        }
    }
}

/// Result of a conditional match insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same (applicant, product, match batch) already existed
    Duplicate,
}

#[async_trait]
pub trait ApplicantSource: Send + Sync {
    async fn unprocessed(&self, scope: &ApplicantScope) -> Result<Vec<Applicant>, StoreError>;

    /// Most recently ingested batch, if any
    async fn latest_batch_id(&self) -> Result<Option<String>, StoreError>;

    async fn batch_size(&self, batch_id: &str) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn active_rules(&self) -> Result<Vec<ProductRule>, StoreError>;
}

/// When an applicant's processed flag is set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedPolicy {
    /// Always, even if some match inserts failed
    #[default]
    Always,
    /// Only when every match insert for the applicant succeeded
    OnSuccess,
}

impl ProcessedPolicy {
    pub fn should_mark(&self, failed_inserts: usize) -> bool {
        match self {
            ProcessedPolicy::Always => true,
            ProcessedPolicy::OnSuccess => failed_inserts == 0,
        }
    }
}

/// What a sink applied for one applicant
#[derive(Debug)]
pub struct RecordedApplicant {
    /// One entry per record, in input order
    pub inserts: Vec<Result<InsertOutcome, StoreError>>,
    pub processed: bool,
}

impl RecordedApplicant {
    pub fn failed(&self) -> usize {
        self.inserts.iter().filter(|r| r.is_err()).count()
    }
}

/// Write side of a matching run.
///
/// `record_applicant` applies one applicant's match records and processed
/// flag as a unit: inserts are insert-if-absent keyed by `MatchKey`, a failed
/// insert is isolated from its siblings, and an `Err` means nothing was kept.
#[async_trait]
pub trait MatchSink: Send + Sync {
    async fn record_applicant(
        &self,
        applicant_id: &str,
        records: &[MatchRecord],
        policy: ProcessedPolicy,
    ) -> Result<RecordedApplicant, StoreError>;

    /// Take a malformed applicant out of the pending set, keeping the reason
    async fn quarantine(&self, applicant_id: &str, reason: &str) -> Result<(), StoreError>;
}

/// Ingestion side: upserting an applicant resets its processed flag
#[async_trait]
pub trait ApplicantStore: Send + Sync {
    async fn upsert_applicants(&self, applicants: &[Applicant]) -> Result<usize, StoreError>;
}

/// Everything the batch matcher needs from storage
pub trait MatchStore: ApplicantSource + RuleSource + MatchSink {}

impl<T> MatchStore for T where T: ApplicantSource + RuleSource + MatchSink {}

#[derive(Debug, Default)]
struct MemoryState {
    applicants: Vec<Applicant>,
    rules: Vec<ProductRule>,
    matches: BTreeMap<MatchKey, MatchRecord>,
    failing_products: HashSet<String>,
    failing_marks: HashSet<String>,
    rejections: BTreeMap<String, String>,
    notifications: Vec<BatchNotification>,
}

/// In-process store implementing every collaborator port.
///
/// Applicants keep ingestion order. Faults can be injected per product
/// (match inserts) or per applicant (processed-flag writes).
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(applicants: Vec<Applicant>, rules: Vec<ProductRule>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                applicants,
                rules,
                ..MemoryState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_rules(&self, rules: Vec<ProductRule>) {
        self.state().rules = rules;
    }

    /// Make every match insert for `product_id` fail
    pub fn fail_inserts_for(&self, product_id: &str) {
        self.state().failing_products.insert(product_id.to_string());
    }

    /// Make the processed-flag write for `applicant_id` fail
    pub fn fail_mark_for(&self, applicant_id: &str) {
        self.state().failing_marks.insert(applicant_id.to_string());
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.failing_products.clear();
        state.failing_marks.clear();
    }

    pub fn applicant(&self, applicant_id: &str) -> Option<Applicant> {
        self.state()
            .applicants
            .iter()
            .find(|a| a.applicant_id == applicant_id)
            .cloned()
    }

    /// All stored match records in key order
    pub fn matches(&self) -> Vec<MatchRecord> {
        self.state().matches.values().cloned().collect()
    }

    /// Quarantine reason recorded for an applicant, if any
    pub fn rejection(&self, applicant_id: &str) -> Option<String> {
        self.state().rejections.get(applicant_id).cloned()
    }

    pub fn notifications(&self) -> Vec<BatchNotification> {
        self.state().notifications.clone()
    }
}

#[async_trait]
impl ApplicantSource for MemoryStore {
    async fn unprocessed(&self, scope: &ApplicantScope) -> Result<Vec<Applicant>, StoreError> {
        let state = self.state();
        let pending = state.applicants.iter().filter(|a| !a.processed);

        let selected = match scope {
            ApplicantScope::Batch(batch_id) => pending
                .filter(|a| &a.batch_id == batch_id)
                .cloned()
                .collect(),
            ApplicantScope::Unscoped { limit } => pending.take(*limit).cloned().collect(),
        };
        Ok(selected)
    }

    async fn latest_batch_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.state().applicants.last().map(|a| a.batch_id.clone()))
    }

    async fn batch_size(&self, batch_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .state()
            .applicants
            .iter()
            .filter(|a| a.batch_id == batch_id)
            .count())
    }
}

#[async_trait]
impl RuleSource for MemoryStore {
    async fn active_rules(&self) -> Result<Vec<ProductRule>, StoreError> {
        Ok(self
            .state()
            .rules
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MatchSink for MemoryStore {
    async fn record_applicant(
        &self,
        applicant_id: &str,
        records: &[MatchRecord],
        policy: ProcessedPolicy,
    ) -> Result<RecordedApplicant, StoreError> {
        let mut state = self.state();

        let inserts: Vec<Result<InsertOutcome, StoreError>> = records
            .iter()
            .map(|record| {
                if state.failing_products.contains(&record.product_id) {
                    Err(StoreError::Rejected(format!(
                        "insert refused for product {}",
                        record.product_id
                    )))
                } else if state.matches.contains_key(&record.key()) {
                    Ok(InsertOutcome::Duplicate)
                } else {
                    Ok(InsertOutcome::Inserted)
                }
            })
            .collect();

        let failed = inserts.iter().filter(|r| r.is_err()).count();
        let processed = policy.should_mark(failed);

        // Checked before anything is written so a failed unit leaves no trace.
        if processed && state.failing_marks.contains(applicant_id) {
            return Err(StoreError::Unavailable(format!(
                "cannot update applicant {}",
                applicant_id
            )));
        }

        for (record, result) in records.iter().zip(&inserts) {
            if let Ok(InsertOutcome::Inserted) = result {
                state.matches.insert(record.key(), record.clone());
            }
        }
        if processed {
            for applicant in state.applicants.iter_mut().filter(|a| a.applicant_id == applicant_id) {
                applicant.processed = true;
            }
        }

        Ok(RecordedApplicant { inserts, processed })
    }

    async fn quarantine(&self, applicant_id: &str, reason: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failing_marks.contains(applicant_id) {
            return Err(StoreError::Unavailable(format!(
                "cannot update applicant {}",
                applicant_id
            )));
        }

        for applicant in state.applicants.iter_mut().filter(|a| a.applicant_id == applicant_id) {
            applicant.processed = true;
        }
        state
            .rejections
            .insert(applicant_id.to_string(), reason.to_string());
        Ok(())
    }
}

#[async_trait]
impl ApplicantStore for MemoryStore {
    async fn upsert_applicants(&self, applicants: &[Applicant]) -> Result<usize, StoreError> {
        let mut state = self.state();
        for incoming in applicants {
            let mut fresh = incoming.clone();
            fresh.processed = false;
            state.rejections.remove(&fresh.applicant_id);

            let existing = state
                .applicants
                .iter()
                .position(|a| a.applicant_id == fresh.applicant_id);
            match existing {
                Some(idx) => {
                    // Re-ingestion moves the applicant to the newest position.
                    state.applicants.remove(idx);
                    state.applicants.push(fresh);
                }
                None => state.applicants.push(fresh),
            }
        }
        Ok(applicants.len())
    }
}

#[async_trait]
impl BatchNotifier for MemoryStore {
    async fn batch_completed(&self, notification: &BatchNotification) -> Result<(), NotifyError> {
        self.state().notifications.push(notification.clone());
        Ok(())
    }
}
