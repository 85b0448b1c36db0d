// Core algorithm exports
pub mod catalog;
pub mod filters;
pub mod matcher;
pub mod scoring;

pub use catalog::{RuleCatalog, CatalogEntry, StatusRequirement};
pub use filters::{eligible_products, is_eligible};
pub use matcher::{BatchMatcher, MatcherOptions, MatchError, ApplicantOutcome, plan_applicant, new_match_batch_id};
pub use crate::services::store::ProcessedPolicy;
pub use scoring::{calculate_match_score, MatchScore};
