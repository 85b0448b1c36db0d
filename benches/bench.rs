// Criterion benchmarks for the eligibility pipeline

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use loan_eligibility::core::{calculate_match_score, eligible_products, plan_applicant, RuleCatalog};
use loan_eligibility::models::{Applicant, EmploymentStatus, ProductRule, ScoringRules};

fn create_applicant(id: usize) -> Applicant {
    Applicant {
        applicant_id: format!("A{}", id),
        email: format!("a{}@example.com", id),
        monthly_income: 25000.0 + (id % 20) as f64 * 2500.0,
        credit_score: 600 + (id % 30) as i32 * 10,
        employment_status: EmploymentStatus::ALL[id % EmploymentStatus::ALL.len()],
        age: 21 + (id % 40) as i32,
        processed: false,
        batch_id: "BENCH".to_string(),
    }
}

fn create_rule(id: usize) -> ProductRule {
    let statuses = ["salaried", "self-employed,business", "professional,salaried"];
    ProductRule {
        product_id: format!("P{}", id),
        product_name: format!("Loan {}", id),
        provider_name: "Bench Bank".to_string(),
        min_monthly_income: 20000.0 + (id % 10) as f64 * 5000.0,
        min_credit_score: 600 + (id % 8) as i32 * 25,
        max_credit_score: 900,
        min_age: 21,
        max_age: 55 + (id % 10) as i32,
        required_employment_status: if id % 4 == 0 {
            None
        } else {
            Some(statuses[id % statuses.len()].to_string())
        },
        is_active: true,
    }
}

fn build_catalog(size: usize) -> RuleCatalog {
    RuleCatalog::build((0..size).map(create_rule).collect()).0
}

fn bench_scoring(c: &mut Criterion) {
    let applicant = create_applicant(7);
    let rule = create_rule(1);
    let rules = ScoringRules::default();

    c.bench_function("calculate_match_score", |b| {
        b.iter(|| calculate_match_score(black_box(&applicant), black_box(&rule), &rules));
    });
}

fn bench_filtering(c: &mut Criterion) {
    let applicant = create_applicant(11);
    let mut group = c.benchmark_group("eligible_products");

    for catalog_size in [10, 100, 1000].iter() {
        let catalog = build_catalog(*catalog_size);
        group.bench_with_input(BenchmarkId::from_parameter(catalog_size), &catalog, |b, catalog| {
            b.iter(|| eligible_products(black_box(&applicant), catalog));
        });
    }

    group.finish();
}

fn bench_batch_plan(c: &mut Criterion) {
    let catalog = build_catalog(50);
    let rules = ScoringRules::default();
    let now = Utc::now();
    let mut group = c.benchmark_group("plan_batch");

    for applicant_count in [100, 1000].iter() {
        let applicants: Vec<Applicant> = (0..*applicant_count).map(create_applicant).collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(applicant_count),
            &applicants,
            |b, applicants| {
                b.iter(|| {
                    applicants
                        .iter()
                        .map(|a| plan_applicant(a, &catalog, &rules, "MATCH_BENCH", now).len())
                        .sum::<usize>()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_scoring, bench_filtering, bench_batch_plan);
criterion_main!(benches);
