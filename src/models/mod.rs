// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{Applicant, EmploymentStatus, ProductRule, MatchRecord, MatchKey, MatchType, ScoringRules, ShapeError};
pub use requests::{ApplicantRow, ValidatedRows, validate_rows};
pub use responses::{BatchReport, IngestReport, BatchNotification, HealthResponse};
