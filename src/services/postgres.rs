use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Acquire, PgPool, Row};
use std::time::Duration;

use crate::models::{Applicant, EmploymentStatus, MatchRecord, MatchType, ProductRule};
use crate::services::store::{
    ApplicantScope, ApplicantSource, ApplicantStore, InsertOutcome, MatchSink, ProcessedPolicy,
    RecordedApplicant, RuleSource, StoreError,
};

/// PostgreSQL-backed store for applicants, product rules and matches
///
/// The pool is the explicit persistence handle: connections are acquired per
/// statement and returned when the statement completes.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and run pending migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store from optional settings, filling in defaults
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Wrap an existing pool without running migrations
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All match records of one match batch, best score first
    pub async fn matches_for_batch(&self, match_batch_id: &str) -> Result<Vec<MatchRecord>, StoreError> {
        let query = r#"
            SELECT applicant_id, product_id, match_batch_id, match_score,
                   match_reason, match_type, created_at
            FROM matches
            WHERE match_batch_id = $1
            ORDER BY match_score DESC, applicant_id, product_id
        "#;

        let rows = sqlx::query(query)
            .bind(match_batch_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(match_from_row).collect()
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

/// A stored applicant row; `Malformed` carries the id and the reason
enum StoredApplicant {
    Valid(Applicant),
    Malformed { applicant_id: String, reason: String },
}

fn applicant_from_row(row: &PgRow) -> Result<StoredApplicant, StoreError> {
    let applicant_id: String = row.try_get("applicant_id")?;
    let raw_status: String = row.try_get("employment_status")?;

    let employment_status = match raw_status.parse::<EmploymentStatus>() {
        Ok(status) => status,
        Err(e) => {
            return Ok(StoredApplicant::Malformed {
                applicant_id,
                reason: e.to_string(),
            })
        }
    };

    Ok(StoredApplicant::Valid(Applicant {
        applicant_id,
        email: row.try_get("email")?,
        monthly_income: row.try_get("monthly_income")?,
        credit_score: row.try_get("credit_score")?,
        employment_status,
        age: row.try_get("age")?,
        processed: row.try_get("processed")?,
        batch_id: row.try_get("batch_id")?,
    }))
}

fn match_from_row(row: &PgRow) -> Result<MatchRecord, StoreError> {
    let score: i16 = row.try_get("match_score")?;
    let match_type: String = row.try_get("match_type")?;

    Ok(MatchRecord {
        applicant_id: row.try_get("applicant_id")?,
        product_id: row.try_get("product_id")?,
        match_batch_id: row.try_get("match_batch_id")?,
        score: score.clamp(0, u8::MAX as i16) as u8,
        reason: row.try_get("match_reason")?,
        match_type: if match_type == MatchType::Manual.as_str() {
            MatchType::Manual
        } else {
            MatchType::Auto
        },
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ApplicantSource for PostgresStore {
    async fn unprocessed(&self, scope: &ApplicantScope) -> Result<Vec<Applicant>, StoreError> {
        let rows = match scope {
            ApplicantScope::Batch(batch_id) => {
                let query = r#"
                    SELECT applicant_id, email, monthly_income::float8 AS monthly_income,
                           credit_score, employment_status, age, processed, batch_id
                    FROM applicants
                    WHERE batch_id = $1 AND processed = FALSE
                    ORDER BY updated_at, applicant_id
                "#;
                sqlx::query(query).bind(batch_id).fetch_all(&self.pool).await?
            }
            ApplicantScope::Unscoped { limit } => {
                let query = r#"
                    SELECT applicant_id, email, monthly_income::float8 AS monthly_income,
                           credit_score, employment_status, age, processed, batch_id
                    FROM applicants
                    WHERE processed = FALSE
                    ORDER BY updated_at, applicant_id
                    LIMIT $1
                "#;
                sqlx::query(query)
                    .bind(*limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut applicants = Vec::with_capacity(rows.len());
        for row in &rows {
            match applicant_from_row(row)? {
                StoredApplicant::Valid(applicant) => applicants.push(applicant),
                StoredApplicant::Malformed { applicant_id, reason } => {
                    tracing::warn!("Quarantining applicant {}: {}", applicant_id, reason);
                    self.quarantine(&applicant_id, &reason).await?;
                }
            }
        }

        tracing::debug!("Loaded {} unprocessed applicants for {:?}", applicants.len(), scope);
        Ok(applicants)
    }

    async fn latest_batch_id(&self) -> Result<Option<String>, StoreError> {
        let query = r#"
            SELECT batch_id
            FROM applicants
            ORDER BY updated_at DESC
            LIMIT 1
        "#;

        let row = sqlx::query(query).fetch_optional(&self.pool).await?;
        row.map(|r| r.try_get("batch_id")).transpose().map_err(Into::into)
    }

    async fn batch_size(&self, batch_id: &str) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM applicants WHERE batch_id = $1")
            .bind(batch_id)
            .fetch_one(&self.pool)
            .await?;

        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as usize)
    }
}

#[async_trait]
impl RuleSource for PostgresStore {
    async fn active_rules(&self) -> Result<Vec<ProductRule>, StoreError> {
        let query = r#"
            SELECT product_id, product_name, provider_name,
                   min_monthly_income::float8 AS min_monthly_income,
                   min_credit_score, max_credit_score, min_age, max_age,
                   required_employment_status, is_active
            FROM loan_products
            WHERE is_active = TRUE
            ORDER BY product_id
        "#;

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;

        let rules: Result<Vec<ProductRule>, sqlx::Error> = rows
            .iter()
            .map(|row| {
                Ok(ProductRule {
                    product_id: row.try_get("product_id")?,
                    product_name: row.try_get("product_name")?,
                    provider_name: row.try_get("provider_name")?,
                    min_monthly_income: row.try_get("min_monthly_income")?,
                    min_credit_score: row.try_get("min_credit_score")?,
                    max_credit_score: row.try_get("max_credit_score")?,
                    min_age: row.try_get("min_age")?,
                    max_age: row.try_get("max_age")?,
                    required_employment_status: row.try_get("required_employment_status")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect();

        Ok(rules?)
    }
}

#[async_trait]
impl MatchSink for PostgresStore {
    /// One transaction per applicant; each insert runs under its own savepoint
    /// so a failed insert is rolled back alone.
    async fn record_applicant(
        &self,
        applicant_id: &str,
        records: &[MatchRecord],
        policy: ProcessedPolicy,
    ) -> Result<RecordedApplicant, StoreError> {
        let insert = r#"
            INSERT INTO matches (applicant_id, product_id, match_batch_id, match_score,
                                 match_reason, match_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (applicant_id, product_id, match_batch_id) DO NOTHING
        "#;

        let mut tx = self.pool.begin().await?;
        let mut inserts = Vec::with_capacity(records.len());

        for record in records {
            let mut savepoint = tx.begin().await?;
            let result = sqlx::query(insert)
                .bind(&record.applicant_id)
                .bind(&record.product_id)
                .bind(&record.match_batch_id)
                .bind(record.score as i16)
                .bind(&record.reason)
                .bind(record.match_type.as_str())
                .bind(record.created_at)
                .execute(&mut *savepoint)
                .await;

            match result {
                Ok(done) => {
                    savepoint.commit().await?;
                    inserts.push(Ok(if done.rows_affected() == 0 {
                        InsertOutcome::Duplicate
                    } else {
                        InsertOutcome::Inserted
                    }));
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    inserts.push(Err(StoreError::from(e)));
                }
            }
        }

        let failed = inserts.iter().filter(|r| r.is_err()).count();
        let processed = policy.should_mark(failed);

        if processed {
            sqlx::query(
                r#"
                UPDATE applicants
                SET processed = TRUE, updated_at = NOW()
                WHERE applicant_id = $1
                "#,
            )
            .bind(applicant_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(RecordedApplicant { inserts, processed })
    }

    async fn quarantine(&self, applicant_id: &str, reason: &str) -> Result<(), StoreError> {
        let query = r#"
            UPDATE applicants
            SET processed = TRUE, rejection_reason = $2, updated_at = NOW()
            WHERE applicant_id = $1
        "#;

        sqlx::query(query)
            .bind(applicant_id)
            .bind(reason)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ApplicantStore for PostgresStore {
    /// Upsert in one transaction; existing applicants get processed reset to FALSE
    async fn upsert_applicants(&self, applicants: &[Applicant]) -> Result<usize, StoreError> {
        let query = r#"
            INSERT INTO applicants (applicant_id, email, monthly_income, credit_score,
                                    employment_status, age, batch_id, processed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
            ON CONFLICT (applicant_id) DO UPDATE SET
                email = EXCLUDED.email,
                monthly_income = EXCLUDED.monthly_income,
                credit_score = EXCLUDED.credit_score,
                employment_status = EXCLUDED.employment_status,
                age = EXCLUDED.age,
                batch_id = EXCLUDED.batch_id,
                processed = FALSE,
                rejection_reason = NULL,
                updated_at = NOW()
        "#;

        let mut tx = self.pool.begin().await?;
        for applicant in applicants {
            sqlx::query(query)
                .bind(&applicant.applicant_id)
                .bind(&applicant.email)
                .bind(applicant.monthly_income)
                .bind(applicant.credit_score)
                .bind(applicant.employment_status.as_str())
                .bind(applicant.age)
                .bind(&applicant.batch_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!("Upserted {} applicants", applicants.len());
        Ok(applicants.len())
    }
}
