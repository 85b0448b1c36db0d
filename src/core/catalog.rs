use std::sync::Arc;

use crate::models::{EmploymentStatus, ProductRule, ShapeError};

/// Accepted employment statuses of one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusRequirement {
    Any,
    OneOf(Vec<EmploymentStatus>),
}

impl StatusRequirement {
    /// Parse a comma-separated status list.
    ///
    /// Blank input means no requirement. Unknown tokens are dropped, so a list
    /// made only of unknown tokens accepts nobody.
    pub fn parse(raw: Option<&str>) -> Self {
        let raw = match raw {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return StatusRequirement::Any,
        };

        let mut statuses: Vec<EmploymentStatus> = Vec::new();
        for token in raw.split(',') {
            match token.parse::<EmploymentStatus>() {
                Ok(status) if !statuses.contains(&status) => statuses.push(status),
                Ok(_) => {}
                Err(e) => tracing::trace!("Ignoring status token: {}", e),
            }
        }
        StatusRequirement::OneOf(statuses)
    }

    #[inline]
    pub fn accepts(&self, status: EmploymentStatus) -> bool {
        match self {
            StatusRequirement::Any => true,
            StatusRequirement::OneOf(statuses) => statuses.contains(&status),
        }
    }
}

/// A rule plus its pre-parsed status requirement
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub rule: ProductRule,
    pub statuses: StatusRequirement,
}

/// Read-only snapshot of the active product rules for one run.
///
/// Cloning shares the snapshot.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    entries: Arc<[CatalogEntry]>,
}

impl RuleCatalog {
    /// Build a catalog from raw rules, keeping source order.
    ///
    /// Inactive rules are dropped. Rules with out-of-domain fields are dropped
    /// and returned alongside the catalog.
    pub fn build(rules: Vec<ProductRule>) -> (Self, Vec<ShapeError>) {
        let mut rejected = Vec::new();
        let mut entries = Vec::with_capacity(rules.len());

        for rule in rules {
            if !rule.is_active {
                continue;
            }
            if let Err(e) = rule.check_shape() {
                tracing::warn!("Excluding product rule: {}", e);
                rejected.push(e);
                continue;
            }
            let statuses = StatusRequirement::parse(rule.required_employment_status.as_deref());
            entries.push(CatalogEntry { rule, statuses });
        }

        (
            Self {
                entries: entries.into(),
            },
            rejected,
        )
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, required: Option<&str>, active: bool) -> ProductRule {
        ProductRule {
            product_id: id.to_string(),
            product_name: format!("Loan {}", id),
            provider_name: "Test Bank".to_string(),
            min_monthly_income: 25000.0,
            min_credit_score: 650,
            max_credit_score: 900,
            min_age: 21,
            max_age: 60,
            required_employment_status: required.map(str::to_string),
            is_active: active,
        }
    }

    #[test]
    fn test_parse_status_list() {
        let req = StatusRequirement::parse(Some(" Salaried , self-employed"));
        assert_eq!(
            req,
            StatusRequirement::OneOf(vec![EmploymentStatus::Salaried, EmploymentStatus::SelfEmployed])
        );
        assert!(req.accepts(EmploymentStatus::SelfEmployed));
        assert!(!req.accepts(EmploymentStatus::Business));
    }

    #[test]
    fn test_blank_requirement_accepts_any() {
        assert_eq!(StatusRequirement::parse(None), StatusRequirement::Any);
        assert_eq!(StatusRequirement::parse(Some("  ")), StatusRequirement::Any);
    }

    #[test]
    fn test_unknown_tokens_accept_nobody() {
        let req = StatusRequirement::parse(Some("retired, student"));
        for status in EmploymentStatus::ALL {
            assert!(!req.accepts(status));
        }
    }

    #[test]
    fn test_build_drops_inactive_and_malformed() {
        let mut broken = rule("P3", None, true);
        broken.min_monthly_income = f64::NAN;

        let (catalog, rejected) = RuleCatalog::build(vec![
            rule("P1", None, true),
            rule("P2", None, false),
            broken,
            rule("P4", Some("business"), true),
        ]);

        let ids: Vec<&str> = catalog
            .entries()
            .iter()
            .map(|e| e.rule.product_id.as_str())
            .collect();
        assert_eq!(ids, vec!["P1", "P4"]);
        assert_eq!(rejected.len(), 1);
    }
}
