use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Credit score domain accepted by the matcher (inclusive)
pub const CREDIT_SCORE_RANGE: std::ops::RangeInclusive<i32> = 300..=900;

/// Applicant age domain accepted by the matcher (inclusive)
pub const AGE_RANGE: std::ops::RangeInclusive<i32> = 18..=100;

/// A record arrived with a field outside its declared domain.
///
/// Raised per applicant or per rule; the offending entity is excluded from the
/// run and the batch carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("applicant {id}: {reason}")]
    Applicant { id: String, reason: String },

    #[error("product {id}: {reason}")]
    Product { id: String, reason: String },
}

/// Closed set of employment statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Salaried,
    SelfEmployed,
    Business,
    Professional,
}

impl EmploymentStatus {
    pub const ALL: [EmploymentStatus; 4] = [
        EmploymentStatus::Salaried,
        EmploymentStatus::SelfEmployed,
        EmploymentStatus::Business,
        EmploymentStatus::Professional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentStatus::Salaried => "salaried",
            EmploymentStatus::SelfEmployed => "self_employed",
            EmploymentStatus::Business => "business",
            EmploymentStatus::Professional => "professional",
        }
    }
}

impl fmt::Display for EmploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown employment status: {0:?}")]
pub struct UnknownEmploymentStatus(pub String);

impl FromStr for EmploymentStatus {
    type Err = UnknownEmploymentStatus;

    /// Case-insensitive; `-`, `_` and inner spaces are treated as the same separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        match key.as_str() {
            "salaried" => Ok(EmploymentStatus::Salaried),
            "self_employed" => Ok(EmploymentStatus::SelfEmployed),
            "business" => Ok(EmploymentStatus::Business),
            "professional" => Ok(EmploymentStatus::Professional),
            _ => Err(UnknownEmploymentStatus(s.to_string())),
        }
    }
}

/// Applicant as handed to the matcher by the applicant source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Applicant {
    #[serde(rename = "applicantId")]
    pub applicant_id: String,
    pub email: String,
    #[serde(rename = "monthlyIncome")]
    pub monthly_income: f64,
    #[serde(rename = "creditScore")]
    pub credit_score: i32,
    #[serde(rename = "employmentStatus")]
    pub employment_status: EmploymentStatus,
    pub age: i32,
    #[serde(default)]
    pub processed: bool,
    #[serde(rename = "batchId")]
    pub batch_id: String,
}

impl Applicant {
    /// Check every field against its declared domain.
    ///
    /// Boundary values (credit 300/900, age 18/100) are in-domain.
    pub fn check_shape(&self) -> Result<(), ShapeError> {
        let reject = |reason: String| ShapeError::Applicant {
            id: self.applicant_id.clone(),
            reason,
        };

        if self.applicant_id.trim().is_empty() {
            return Err(reject("empty applicant id".to_string()));
        }
        if !CREDIT_SCORE_RANGE.contains(&self.credit_score) {
            return Err(reject(format!(
                "credit score {} outside {}..={}",
                self.credit_score,
                CREDIT_SCORE_RANGE.start(),
                CREDIT_SCORE_RANGE.end()
            )));
        }
        if !self.monthly_income.is_finite() || self.monthly_income < 0.0 {
            return Err(reject(format!("invalid monthly income {}", self.monthly_income)));
        }
        if !AGE_RANGE.contains(&self.age) {
            return Err(reject(format!(
                "age {} outside {}..={}",
                self.age,
                AGE_RANGE.start(),
                AGE_RANGE.end()
            )));
        }
        Ok(())
    }
}

/// Eligibility rule for one loan product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRule {
    #[serde(rename = "productId")]
    pub product_id: String,
    #[serde(rename = "productName")]
    pub product_name: String,
    #[serde(rename = "providerName")]
    pub provider_name: String,
    #[serde(rename = "minMonthlyIncome")]
    pub min_monthly_income: f64,
    #[serde(rename = "minCreditScore")]
    pub min_credit_score: i32,
    #[serde(rename = "maxCreditScore")]
    pub max_credit_score: i32,
    #[serde(rename = "minAge")]
    pub min_age: i32,
    #[serde(rename = "maxAge")]
    pub max_age: i32,
    /// Comma-separated accepted statuses; `None` accepts any status
    #[serde(rename = "requiredEmploymentStatus", default)]
    pub required_employment_status: Option<String>,
    #[serde(rename = "isActive", default = "default_true")]
    pub is_active: bool,
}

impl ProductRule {
    /// Inverted bounds (min > max) are not a shape error; they just never match.
    pub fn check_shape(&self) -> Result<(), ShapeError> {
        if self.product_id.trim().is_empty() {
            return Err(ShapeError::Product {
                id: self.product_id.clone(),
                reason: "empty product id".to_string(),
            });
        }
        if !self.min_monthly_income.is_finite() || self.min_monthly_income < 0.0 {
            return Err(ShapeError::Product {
                id: self.product_id.clone(),
                reason: format!("invalid minimum monthly income {}", self.min_monthly_income),
            });
        }
        Ok(())
    }
}

fn default_true() -> bool { true }

/// How a match record came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Auto,
    Manual,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Auto => "auto",
            MatchType::Manual => "manual",
        }
    }
}

/// Unique identity of a match record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey {
    pub applicant_id: String,
    pub product_id: String,
    pub match_batch_id: String,
}

/// One eligible (applicant, product) pairing produced by a matching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(rename = "applicantId")]
    pub applicant_id: String,
    #[serde(rename = "productId")]
    pub product_id: String,
    #[serde(rename = "matchBatchId")]
    pub match_batch_id: String,
    pub score: u8,
    pub reason: String,
    #[serde(rename = "matchType")]
    pub match_type: MatchType,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl MatchRecord {
    pub fn key(&self) -> MatchKey {
        MatchKey {
            applicant_id: self.applicant_id.clone(),
            product_id: self.product_id.clone(),
            match_batch_id: self.match_batch_id.clone(),
        }
    }
}

/// Point model used by the scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    pub base: u8,
    pub credit_high_threshold: i32,
    pub credit_high_bonus: u8,
    pub credit_mid_threshold: i32,
    pub credit_mid_bonus: u8,
    pub income_threshold: f64,
    pub income_bonus: u8,
    pub salaried_bonus: u8,
    pub max_score: u8,
    pub currency_symbol: String,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            base: 60,
            credit_high_threshold: 750,
            credit_high_bonus: 20,
            credit_mid_threshold: 700,
            credit_mid_bonus: 10,
            income_threshold: 50000.0,
            income_bonus: 10,
            salaried_bonus: 10,
            max_score: 100,
            currency_symbol: "₹".to_string(),
        }
    }
}
