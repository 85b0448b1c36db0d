use chrono::{DateTime, Utc};
use futures::{future, stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::core::{
    catalog::RuleCatalog,
    filters::eligible_products,
    scoring::calculate_match_score,
};
use crate::models::{Applicant, BatchNotification, BatchReport, MatchRecord, MatchType, ScoringRules, ShapeError};
use crate::services::store::{ApplicantScope, InsertOutcome, MatchStore, ProcessedPolicy, StoreError};
use crate::services::webhook::BatchNotifier;

/// Failures that abort a whole run
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("failed to load applicants: {0}")]
    Applicants(#[source] StoreError),

    #[error("failed to load product rules: {0}")]
    Rules(#[source] StoreError),
}

/// Tunables for a matching run
#[derive(Debug, Clone)]
pub struct MatcherOptions {
    pub scoring: ScoringRules,
    /// Maximum number of per-row error messages kept in the report
    pub error_cap: usize,
    /// Applicants processed concurrently; 1 means strictly sequential
    pub concurrency: usize,
    /// Stop scheduling new applicants once this much time has passed
    pub time_budget: Option<Duration>,
    pub processed_policy: ProcessedPolicy,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            scoring: ScoringRules::default(),
            error_cap: 10,
            concurrency: 1,
            time_budget: None,
            processed_policy: ProcessedPolicy::Always,
        }
    }
}

/// Outcome of one applicant's unit of work
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicantOutcome {
    Completed {
        created: usize,
        failed: usize,
        processed: bool,
        errors: Vec<String>,
    },
    Rejected(ShapeError),
}

/// Generate a fresh match-batch identifier, e.g. `MATCH_20240101_093000_1a2b3c4d`
pub fn new_match_batch_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("MATCH_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Build the match records for one applicant without touching storage.
///
/// Records follow catalog order and carry `match_batch_id` and `now`.
pub fn plan_applicant(
    applicant: &Applicant,
    catalog: &RuleCatalog,
    scoring: &ScoringRules,
    match_batch_id: &str,
    now: DateTime<Utc>,
) -> Vec<MatchRecord> {
    eligible_products(applicant, catalog)
        .into_iter()
        .map(|entry| {
            let scored = calculate_match_score(applicant, &entry.rule, scoring);
            MatchRecord {
                applicant_id: applicant.applicant_id.clone(),
                product_id: entry.rule.product_id.clone(),
                match_batch_id: match_batch_id.to_string(),
                score: scored.score,
                reason: scored.reason,
                match_type: MatchType::Auto,
                created_at: now,
            }
        })
        .collect()
}

/// Batch orchestrator - runs filter and scorer over unprocessed applicants
///
/// # Per-applicant states
/// 1. unprocessed
/// 2. eligibility-filtered
/// 3. scored-and-recorded
/// 4. processed
///
/// Each applicant is an isolated unit of work: a failed write is recorded in
/// the report and never aborts sibling applicants.
pub struct BatchMatcher<S> {
    store: Arc<S>,
    notifier: Arc<dyn BatchNotifier>,
    options: MatcherOptions,
}

impl<S> BatchMatcher<S>
where
    S: MatchStore + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<dyn BatchNotifier>, options: MatcherOptions) -> Self {
        Self {
            store,
            notifier,
            options,
        }
    }

    pub fn options(&self) -> &MatcherOptions {
        &self.options
    }

    /// Run one matching pass under a freshly generated match-batch id
    pub async fn run(&self, scope: ApplicantScope) -> Result<BatchReport, MatchError> {
        let match_batch_id = new_match_batch_id(Utc::now());
        self.run_with_batch_id(scope, &match_batch_id).await
    }

    /// Run one matching pass under a caller-supplied match-batch id.
    ///
    /// Re-running with the same id never duplicates a record; duplicates are
    /// discarded by the sink but still counted in `matches_created`.
    pub async fn run_with_batch_id(
        &self,
        scope: ApplicantScope,
        match_batch_id: &str,
    ) -> Result<BatchReport, MatchError> {
        let applicants = self
            .store
            .unprocessed(&scope)
            .await
            .map_err(MatchError::Applicants)?;

        if applicants.is_empty() {
            tracing::info!("No unprocessed applicants found for {:?}", scope);
            return Ok(BatchReport::default());
        }

        let rules = self.store.active_rules().await.map_err(MatchError::Rules)?;
        let (catalog, rejected_rules) = RuleCatalog::build(rules);

        tracing::info!(
            "Matching {} applicants against {} active products (match batch {})",
            applicants.len(),
            catalog.len(),
            match_batch_id
        );

        let mut report = BatchReport {
            match_batch_id: Some(match_batch_id.to_string()),
            ..BatchReport::default()
        };
        for rule_error in rejected_rules {
            push_capped(&mut report.errors, rule_error.to_string(), self.options.error_cap);
        }

        let total = applicants.len();
        let deadline = self.options.time_budget.map(|budget| Instant::now() + budget);
        let now = Utc::now();
        let catalog = &catalog;

        let outcomes: Vec<ApplicantOutcome> = stream::iter(applicants)
            .take_while(move |_| future::ready(deadline.map_or(true, |d| Instant::now() < d)))
            .map(|applicant| self.process_applicant(applicant, catalog, match_batch_id, now))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        report.applicants_deferred = total - outcomes.len();
        if report.applicants_deferred > 0 {
            tracing::warn!(
                "Time budget exhausted, {} applicants left for a later run",
                report.applicants_deferred
            );
        }

        for outcome in outcomes {
            match outcome {
                ApplicantOutcome::Completed {
                    created,
                    failed,
                    processed,
                    errors,
                } => {
                    report.applicants_considered += 1;
                    if processed {
                        report.applicants_marked += 1;
                    }
                    report.matches_created += created;
                    report.matches_failed += failed;
                    for message in errors {
                        push_capped(&mut report.errors, message, self.options.error_cap);
                    }
                }
                ApplicantOutcome::Rejected(e) => {
                    report.applicants_rejected += 1;
                    push_capped(&mut report.errors, e.to_string(), self.options.error_cap);
                }
            }
        }

        tracing::info!(
            "Match batch {} done: {} considered, {} marked, {} created, {} failed, {} rejected",
            match_batch_id,
            report.applicants_considered,
            report.applicants_marked,
            report.matches_created,
            report.matches_failed,
            report.applicants_rejected
        );

        if report.applicants_considered > 0 {
            self.notify(match_batch_id, report.applicants_considered).await;
        }

        Ok(report)
    }

    /// Filter, score, record and mark one applicant
    pub async fn process_applicant(
        &self,
        applicant: Applicant,
        catalog: &RuleCatalog,
        match_batch_id: &str,
        now: DateTime<Utc>,
    ) -> ApplicantOutcome {
        if let Err(e) = applicant.check_shape() {
            tracing::warn!("Excluding applicant: {}", e);
            // Leaves the pending set until the row is re-ingested.
            if let Err(store_err) = self
                .store
                .quarantine(&applicant.applicant_id, &e.to_string())
                .await
            {
                tracing::error!(
                    "Failed to quarantine applicant {}: {}",
                    applicant.applicant_id,
                    store_err
                );
            }
            return ApplicantOutcome::Rejected(e);
        }

        let records = plan_applicant(&applicant, catalog, &self.options.scoring, match_batch_id, now);
        tracing::debug!(
            "Applicant {} eligible for {} products",
            applicant.applicant_id,
            records.len()
        );

        let recorded = match self
            .store
            .record_applicant(&applicant.applicant_id, &records, self.options.processed_policy)
            .await
        {
            Ok(recorded) => recorded,
            Err(e) => {
                // Nothing of this applicant was kept; it stays pending.
                tracing::error!(
                    "Failed to record applicant {}: {}",
                    applicant.applicant_id,
                    e
                );
                return ApplicantOutcome::Completed {
                    created: 0,
                    failed: records.len(),
                    processed: false,
                    errors: vec![format!("applicant {}: {}", applicant.applicant_id, e)],
                };
            }
        };

        let mut created = 0;
        let mut failed = 0;
        let mut errors = Vec::new();

        for (record, result) in records.iter().zip(recorded.inserts) {
            match result {
                Ok(InsertOutcome::Inserted) => created += 1,
                Ok(InsertOutcome::Duplicate) => {
                    tracing::debug!(
                        "Match {} -> {} already recorded in {}",
                        record.applicant_id,
                        record.product_id,
                        record.match_batch_id
                    );
                    created += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to record match {} -> {}: {}",
                        record.applicant_id,
                        record.product_id,
                        e
                    );
                    failed += 1;
                    errors.push(format!(
                        "applicant {} product {}: {}",
                        record.applicant_id, record.product_id, e
                    ));
                }
            }
        }

        if !recorded.processed {
            tracing::warn!(
                "Leaving applicant {} unprocessed after {} failed writes",
                applicant.applicant_id,
                failed
            );
        }

        ApplicantOutcome::Completed {
            created,
            failed,
            processed: recorded.processed,
            errors,
        }
    }

    async fn notify(&self, match_batch_id: &str, user_count: usize) {
        let notification = BatchNotification {
            batch_id: match_batch_id.to_string(),
            user_count,
            timestamp: Utc::now(),
            manual_trigger: false,
        };

        if let Err(e) = self.notifier.batch_completed(&notification).await {
            tracing::warn!("Batch {} matched but notification failed: {}", match_batch_id, e);
        }
    }
}

fn push_capped(errors: &mut Vec<String>, message: String, cap: usize) {
    if errors.len() < cap {
        errors.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmploymentStatus, ProductRule};
    use crate::services::store::MemoryStore;
    use crate::services::webhook::NoopNotifier;

    fn create_applicant(id: &str, credit_score: i32, income: f64) -> Applicant {
        Applicant {
            applicant_id: id.to_string(),
            email: format!("{}@example.com", id),
            monthly_income: income,
            credit_score,
            employment_status: EmploymentStatus::Salaried,
            age: 28,
            processed: false,
            batch_id: "B1".to_string(),
        }
    }

    fn create_rule(id: &str, min_credit: i32) -> ProductRule {
        ProductRule {
            product_id: id.to_string(),
            product_name: format!("Loan {}", id),
            provider_name: "Test Bank".to_string(),
            min_monthly_income: 30000.0,
            min_credit_score: min_credit,
            max_credit_score: 900,
            min_age: 21,
            max_age: 60,
            required_employment_status: None,
            is_active: true,
        }
    }

    fn matcher(store: Arc<MemoryStore>, options: MatcherOptions) -> BatchMatcher<MemoryStore> {
        BatchMatcher::new(store, Arc::new(NoopNotifier), options)
    }

    #[test]
    fn test_match_batch_id_format() {
        let now = DateTime::parse_from_rfc3339("2024-03-05T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = new_match_batch_id(now);

        assert!(id.starts_with("MATCH_20240305_093000_"));
        assert_eq!(id.len(), "MATCH_20240305_093000_".len() + 8);
    }

    #[test]
    fn test_plan_applicant() {
        let (catalog, _) = RuleCatalog::build(vec![create_rule("P1", 700), create_rule("P2", 780)]);
        let applicant = create_applicant("A1", 750, 50000.0);

        let records = plan_applicant(&applicant, &catalog, &ScoringRules::default(), "M1", Utc::now());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].product_id, "P1");
        assert_eq!(records[0].score, 100);
        assert_eq!(records[0].match_type, MatchType::Auto);
    }

    #[tokio::test]
    async fn test_noop_when_nothing_pending() {
        let store = Arc::new(MemoryStore::new(vec![], vec![create_rule("P1", 700)]));
        let report = matcher(store, MatcherOptions::default())
            .run(ApplicantScope::default())
            .await
            .unwrap();

        assert!(report.is_noop());
        assert_eq!(report.matches_created, 0);
    }

    #[tokio::test]
    async fn test_on_success_policy_leaves_failed_applicant_pending() {
        let store = Arc::new(MemoryStore::new(
            vec![create_applicant("A1", 750, 50000.0)],
            vec![create_rule("P1", 700)],
        ));
        store.fail_inserts_for("P1");

        let options = MatcherOptions {
            processed_policy: ProcessedPolicy::OnSuccess,
            ..MatcherOptions::default()
        };
        let report = matcher(store.clone(), options)
            .run(ApplicantScope::default())
            .await
            .unwrap();

        assert_eq!(report.matches_failed, 1);
        assert!(!store.applicant("A1").unwrap().processed);
    }

    #[tokio::test]
    async fn test_zero_time_budget_defers_everyone() {
        let store = Arc::new(MemoryStore::new(
            vec![create_applicant("A1", 750, 50000.0), create_applicant("A2", 720, 40000.0)],
            vec![create_rule("P1", 700)],
        ));
        let options = MatcherOptions {
            time_budget: Some(Duration::ZERO),
            ..MatcherOptions::default()
        };

        let report = matcher(store.clone(), options)
            .run(ApplicantScope::default())
            .await
            .unwrap();

        assert_eq!(report.applicants_deferred, 2);
        assert_eq!(report.applicants_considered, 0);
        assert!(!store.applicant("A1").unwrap().processed);
    }
}
