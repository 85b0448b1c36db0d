use crate::core::catalog::{CatalogEntry, RuleCatalog};
use crate::models::{Applicant, ProductRule};

/// Stage 1: credit score within the rule's inclusive band
#[inline]
pub fn within_credit_band(applicant: &Applicant, rule: &ProductRule) -> bool {
    rule.min_credit_score <= applicant.credit_score && applicant.credit_score <= rule.max_credit_score
}

/// Stage 2: income at or above the rule's floor
#[inline]
pub fn meets_income_floor(applicant: &Applicant, rule: &ProductRule) -> bool {
    rule.min_monthly_income <= applicant.monthly_income
}

/// Stage 3: age within the rule's inclusive band
#[inline]
pub fn within_age_band(applicant: &Applicant, rule: &ProductRule) -> bool {
    rule.min_age <= applicant.age && applicant.age <= rule.max_age
}

/// Stage 4: employment status accepted by the rule
#[inline]
pub fn accepts_employment(applicant: &Applicant, entry: &CatalogEntry) -> bool {
    entry.statuses.accepts(applicant.employment_status)
}

/// True when the applicant passes all four stages for this entry
pub fn is_eligible(applicant: &Applicant, entry: &CatalogEntry) -> bool {
    within_credit_band(applicant, &entry.rule)
        && meets_income_floor(applicant, &entry.rule)
        && within_age_band(applicant, &entry.rule)
        && accepts_employment(applicant, entry)
}

/// Narrow the catalog down to the products this applicant qualifies for.
///
/// Stages run cheapest and most selective first. The result keeps catalog order
/// and is always a subset of the catalog.
pub fn eligible_products<'a>(
    applicant: &Applicant,
    catalog: &'a RuleCatalog,
) -> Vec<&'a CatalogEntry> {
    catalog
        .entries()
        .iter()
        // Stage 1: credit score band
        .filter(|entry| within_credit_band(applicant, &entry.rule))
        // Stage 2: income floor
        .filter(|entry| meets_income_floor(applicant, &entry.rule))
        // Stage 3: age band
        .filter(|entry| within_age_band(applicant, &entry.rule))
        // Stage 4: employment status
        .filter(|entry| accepts_employment(applicant, entry))
        .collect()
}
