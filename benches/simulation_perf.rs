
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use hins::schedule::Schedule;
use hins::selection::{InsuranceMode, SelectionRequest, select_best_eligible_plan};
use hins::types::{Tick, Year};

use fixtures::{LARGE, MEDIUM, SMALL, build_simulation, make_plans, sample_terms};

// ── Group 1: adjudication, reimbursement and budget inversion ──────────────

fn bench_adjudication(c: &mut Criterion) {
    let mut group = c.benchmark_group("adjudication");
    let claims: Vec<(f64, f64)> =
        (0..1_000).map(|i| ((i * 37 % 5_000) as f64, (i * 53 % 3_000) as f64 + 1.0)).collect();
    group.throughput(Throughput::Elements(claims.len() as u64));

    for (name, terms) in ["stop_loss", "stop_claim"].into_iter().zip(sample_terms()) {
        group.bench_function(BenchmarkId::new("reimbursement", name), |b| {
            b.iter(|| {
                for &(ytd, claim) in &claims {
                    std::hint::black_box(terms.reimbursement(ytd, claim).ok());
                }
            })
        });
        group.bench_function(BenchmarkId::new("max_affordable_claim", name), |b| {
            b.iter(|| {
                for &(ytd, allowance) in &claims {
                    std::hint::black_box(terms.max_affordable_claim(ytd, allowance));
                }
            })
        });
    }
    group.finish();
}

// ── Group 2: plan_selection, catalogue size scaling ────────────────────────

fn bench_plan_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_selection");
    for &n in &[5usize, 20, 100] {
        let plans = make_plans(n);
        let request = SelectionRequest {
            projected_annual_claim: 2_500.0,
            switching_cost_multiplier: 1.05,
            prior_plan: None,
            affordability_limit: 30_000.0,
            mode: InsuranceMode::Voluntary,
        };
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &plans, |b, plans| {
            b.iter(|| select_best_eligible_plan(plans.iter(), &request))
        });
    }
    group.finish();
}

// ── Group 3: full_year, end-to-end single year ──────────────────────────────

fn bench_full_year(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_year");
    for (name, scenario) in [("small", &SMALL), ("medium", &MEDIUM), ("large", &LARGE)] {
        if name == "large" {
            group.sample_size(10);
        }
        group.throughput(Throughput::Elements(scenario.population as u64));
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter_batched(
                || build_simulation(scenario, 42, 1),
                |mut sim| sim.run(),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

// ── Group 4: multi_year, year-over-year scaling ─────────────────────────────

fn bench_multi_year(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_year");
    group.sample_size(10);
    for &years in &[1u32, 5, 10] {
        group.bench_with_input(BenchmarkId::from_parameter(years), &years, |b, &y| {
            b.iter_batched(
                || build_simulation(&MEDIUM, 42, y),
                |mut sim| sim.run(),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

// ── Group 5: schedule, phase heap in isolation ──────────────────────────────

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule");
    for &years in &[1u32, 10, 100] {
        group.throughput(Throughput::Elements(years as u64 * Tick::WEEKS_PER_YEAR));
        group.bench_with_input(BenchmarkId::from_parameter(years), &years, |b, &y| {
            b.iter(|| {
                for entry in Schedule::standard(Tick::year_end(Year(y))) {
                    std::hint::black_box(entry);
                }
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_adjudication,
    bench_plan_selection,
    bench_full_year,
    bench_multi_year,
    bench_schedule,
);
criterion_main!(benches);
