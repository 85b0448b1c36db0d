use crate::models::{Applicant, EmploymentStatus, ProductRule, ScoringRules};

/// Score for one eligible (applicant, product) pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchScore {
    pub score: u8,
    pub reason: String,
}

/// Calculate a suitability score (0-100) for an eligible pairing
///
/// Additive point model:
/// score = min(
///     base                          # 60 for any eligible pairing
///     + credit bonus                # +20 at >= 750, else +10 at >= 700
///     + income bonus                # +10 at >= income threshold
///     + salaried bonus,             # +10 for salaried applicants
///     cap                           # 100
/// )
///
/// A heuristic, not a statistical model; swap the rules or this function to
/// replace it. The product does not influence the score today.
pub fn calculate_match_score(
    applicant: &Applicant,
    _product: &ProductRule,
    rules: &ScoringRules,
) -> MatchScore {
    let total = rules.base as u16
        + credit_bonus(applicant.credit_score, rules) as u16
        + income_bonus(applicant.monthly_income, rules) as u16
        + employment_bonus(applicant.employment_status, rules) as u16;

    MatchScore {
        score: total.min(rules.max_score as u16) as u8,
        reason: format!(
            "Matched based on eligibility criteria (CS: {}, Income: {}{})",
            applicant.credit_score,
            rules.currency_symbol,
            format_amount(applicant.monthly_income)
        ),
    }
}

#[inline]
fn credit_bonus(credit_score: i32, rules: &ScoringRules) -> u8 {
    if credit_score >= rules.credit_high_threshold {
        rules.credit_high_bonus
    } else if credit_score >= rules.credit_mid_threshold {
        rules.credit_mid_bonus
    } else {
        0
    }
}

#[inline]
fn income_bonus(monthly_income: f64, rules: &ScoringRules) -> u8 {
    if monthly_income >= rules.income_threshold {
        rules.income_bonus
    } else {
        0
    }
}

#[inline]
fn employment_bonus(status: EmploymentStatus, rules: &ScoringRules) -> u8 {
    if status == EmploymentStatus::Salaried {
        rules.salaried_bonus
    } else {
        0
    }
}

/// Whole units with thousands separators, e.g. 1234567.6 -> "1,234,568".
/// Halves round to even.
fn format_amount(amount: f64) -> String {
    let whole = amount.round_ties_even() as i64;
    let digits = whole.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if whole < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_applicant(credit_score: i32, income: f64, status: EmploymentStatus) -> Applicant {
        Applicant {
            applicant_id: "A1".to_string(),
            email: "a1@example.com".to_string(),
            monthly_income: income,
            credit_score,
            employment_status: status,
            age: 28,
            processed: false,
            batch_id: "B1".to_string(),
        }
    }

    fn create_test_rule() -> ProductRule {
        ProductRule {
            product_id: "P1".to_string(),
            product_name: "Personal Loan".to_string(),
            provider_name: "Test Bank".to_string(),
            min_monthly_income: 30000.0,
            min_credit_score: 600,
            max_credit_score: 900,
            min_age: 21,
            max_age: 60,
            required_employment_status: None,
            is_active: true,
        }
    }

    #[test]
    fn test_full_score() {
        let applicant = create_test_applicant(750, 50000.0, EmploymentStatus::Salaried);
        let result = calculate_match_score(&applicant, &create_test_rule(), &ScoringRules::default());

        assert_eq!(result.score, 100);
        assert_eq!(
            result.reason,
            "Matched based on eligibility criteria (CS: 750, Income: ₹50,000)"
        );
    }

    #[test]
    fn test_base_only() {
        let applicant = create_test_applicant(650, 30000.0, EmploymentStatus::Business);
        let result = calculate_match_score(&applicant, &create_test_rule(), &ScoringRules::default());

        assert_eq!(result.score, 60);
    }

    #[test]
    fn test_credit_tiers() {
        let rules = ScoringRules::default();
        assert_eq!(credit_bonus(699, &rules), 0);
        assert_eq!(credit_bonus(700, &rules), 10);
        assert_eq!(credit_bonus(749, &rules), 10);
        assert_eq!(credit_bonus(750, &rules), 20);
        assert_eq!(credit_bonus(900, &rules), 20);
    }

    #[test]
    fn test_cap_applies() {
        let rules = ScoringRules {
            base: 90,
            ..ScoringRules::default()
        };
        let applicant = create_test_applicant(800, 90000.0, EmploymentStatus::Salaried);

        assert_eq!(calculate_match_score(&applicant, &create_test_rule(), &rules).score, 100);
    }

    #[test]
    fn test_configured_income_threshold() {
        let rules = ScoringRules {
            income_threshold: 4000.0,
            ..ScoringRules::default()
        };
        let applicant = create_test_applicant(650, 4500.0, EmploymentStatus::Professional);

        assert_eq!(calculate_match_score(&applicant, &create_test_rule(), &rules).score, 70);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(999.4), "999");
        assert_eq!(format_amount(1000.0), "1,000");
        assert_eq!(format_amount(1234567.6), "1,234,568");
        assert_eq!(format_amount(50000.5), "50,000");
        assert_eq!(format_amount(50001.5), "50,002");
    }
}
