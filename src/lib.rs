//! Loan eligibility - batch matching of applicants against loan products
//!
//! This library provides the eligibility pipeline used to pair applicants with
//! the loan products they qualify for. Each run filters every unprocessed
//! applicant through a four-stage rule check, scores the surviving pairs and
//! records them idempotently under a match-batch id.

pub mod config;
pub mod core;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use core::{eligible_products, calculate_match_score, BatchMatcher, MatcherOptions, RuleCatalog};
pub use models::{Applicant, BatchReport, EmploymentStatus, MatchRecord, ProductRule, ScoringRules};
