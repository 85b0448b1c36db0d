use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::domain::{Applicant, EmploymentStatus};

/// Raw applicant row as received from an upload, before validation
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApplicantRow {
    #[validate(custom(function = "validate_not_blank"))]
    #[serde(alias = "user_id", rename = "applicantId")]
    pub applicant_id: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(range(min = 0.0, message = "Monthly income cannot be negative"))]
    #[serde(alias = "monthly_income", rename = "monthlyIncome")]
    pub monthly_income: f64,
    #[validate(range(min = 300, max = 900, message = "Credit score must be between 300 and 900"))]
    #[serde(alias = "credit_score", rename = "creditScore")]
    pub credit_score: i32,
    #[validate(custom(function = "validate_employment_status"))]
    #[serde(alias = "employment_status", rename = "employmentStatus")]
    pub employment_status: String,
    #[validate(range(min = 18, max = 100, message = "Age must be between 18 and 100"))]
    pub age: i32,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("user_id is required".into());
        return Err(err);
    }
    Ok(())
}

fn validate_employment_status(status: &str) -> Result<(), ValidationError> {
    status
        .parse::<EmploymentStatus>()
        .map(|_| ())
        .map_err(|_| {
            let mut err = ValidationError::new("employment_status");
            err.message = Some(
                "Invalid employment status. Valid options: salaried, self-employed, business, professional"
                    .into(),
            );
            err
        })
}

impl ApplicantRow {
    /// Validate and convert into a matcher-ready applicant tagged with `batch_id`
    pub fn into_applicant(self, batch_id: &str) -> Result<Applicant, ValidationErrors> {
        self.validate()?;
        let employment_status = self
            .employment_status
            .parse::<EmploymentStatus>()
            .map_err(|_| {
                let mut errors = ValidationErrors::new();
                errors.add("employment_status", ValidationError::new("employment_status"));
                errors
            })?;

        Ok(Applicant {
            applicant_id: self.applicant_id.trim().to_string(),
            email: self.email.trim().to_string(),
            monthly_income: self.monthly_income,
            credit_score: self.credit_score,
            employment_status,
            age: self.age,
            processed: false,
            batch_id: batch_id.to_string(),
        })
    }
}

/// Outcome of validating a set of uploaded rows
#[derive(Debug, Default)]
pub struct ValidatedRows {
    pub applicants: Vec<Applicant>,
    pub rejected: usize,
    pub errors: Vec<String>,
}

/// Validate uploaded rows, keeping at most `error_cap` error messages.
///
/// Row numbers follow spreadsheet convention: the header is row 1.
pub fn validate_rows(rows: Vec<ApplicantRow>, batch_id: &str, error_cap: usize) -> ValidatedRows {
    let mut out = ValidatedRows::default();

    for (idx, row) in rows.into_iter().enumerate() {
        let row_num = idx + 2;
        match row.into_applicant(batch_id) {
            Ok(applicant) => out.applicants.push(applicant),
            Err(errors) => {
                out.rejected += 1;
                tracing::debug!("Row {} rejected: {}", row_num, errors);
                if out.errors.len() < error_cap {
                    out.errors.push(format!("Row {}: {}", row_num, describe(&errors)));
                }
            }
        }
    }

    out
}

fn describe(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("{} is invalid", field),
            })
        })
        .collect();
    messages.sort();
    messages.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> ApplicantRow {
        ApplicantRow {
            applicant_id: "U001".to_string(),
            email: "priya@example.com".to_string(),
            monthly_income: 55000.0,
            credit_score: 760,
            employment_status: "Salaried".to_string(),
            age: 30,
        }
    }

    #[test]
    fn test_valid_row_converts() {
        let applicant = row().into_applicant("20240101120000").unwrap();
        assert_eq!(applicant.employment_status, EmploymentStatus::Salaried);
        assert_eq!(applicant.batch_id, "20240101120000");
        assert!(!applicant.processed);
    }

    #[test]
    fn test_boundaries_accepted() {
        let mut low = row();
        low.credit_score = 300;
        low.age = 18;
        assert!(low.validate().is_ok());

        let mut high = row();
        high.credit_score = 900;
        high.age = 100;
        assert!(high.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut below = row();
        below.credit_score = 299;
        assert!(below.validate().is_err());

        let mut above = row();
        above.credit_score = 901;
        assert!(above.validate().is_err());

        let mut young = row();
        young.age = 17;
        assert!(young.validate().is_err());
    }

    #[test]
    fn test_bad_email_and_status() {
        let mut bad = row();
        bad.email = "not-an-email".to_string();
        bad.employment_status = "retired".to_string();
        let errors = bad.validate().unwrap_err();
        assert_eq!(errors.field_errors().len(), 2);
    }

    #[test]
    fn test_blank_id_rejected() {
        let mut blank = row();
        blank.applicant_id = "   ".to_string();
        assert_eq!(blank.validate().unwrap_err().field_errors().len(), 1);

        let result = validate_rows(vec![blank], "B1", 10);
        assert!(result.applicants.is_empty());
        assert_eq!(result.rejected, 1);
        assert_eq!(result.errors, vec!["Row 2: user_id is required".to_string()]);
    }

    #[test]
    fn test_validate_rows_caps_errors() {
        let mut rows = vec![row()];
        for i in 0..15 {
            let mut bad = row();
            bad.applicant_id = format!("bad{}", i);
            bad.age = 5;
            rows.push(bad);
        }

        let result = validate_rows(rows, "B1", 10);
        assert_eq!(result.applicants.len(), 1);
        assert_eq!(result.rejected, 15);
        assert_eq!(result.errors.len(), 10);
        assert!(result.errors[0].starts_with("Row 3:"));
    }
}
