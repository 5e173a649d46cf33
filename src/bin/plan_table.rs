//! Tabulate the cost-sharing curves of the configured plans.
//!
//! Usage: `plan_table [STEP] [MAX_CLAIM]`. Writes one NDJSON row per plan
//! and cumulative-claim point to stdout, and a per-plan summary to stderr.

use std::env;
use std::process::ExitCode;

use serde::Serialize;

use hins::config::SimulationConfig;
use hins::cost_sharing::{ClaimCeiling, Regime};

#[derive(Debug, Serialize)]
struct CurvePoint {
    plan_id: u64,
    cumulative_claim: f64,
    reimbursement: f64,
    out_of_pocket: f64,
    /// Regime of the next `step` of claims starting at this point.
    next_regime: Regime,
    /// Largest further claim affordable with one year of premium as budget.
    /// `None` when any claim is affordable.
    ceiling_at_premium: Option<f64>,
}

fn main() -> ExitCode {
    let config = SimulationConfig::canonical();
    let mut args = env::args().skip(1);
    let step: f64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(250.0);
    let max_claim: f64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(30_000.0);
    if !(step > 0.0 && max_claim >= 0.0) {
        eprintln!("plan_table: STEP must be > 0 and MAX_CLAIM >= 0");
        return ExitCode::from(2);
    }

    for plan in &config.plans {
        let template = match plan.build() {
            Ok(t) => t,
            Err(e) => {
                eprintln!("plan_table: {e}");
                return ExitCode::FAILURE;
            }
        };
        let terms = template.terms;
        let bp = terms.breakpoints();

        let mut x = 0.0;
        let mut points = 0usize;
        while x <= max_claim {
            let reimbursement = match terms.reimbursement(0.0, x) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("plan_table: {e}");
                    return ExitCode::FAILURE;
                }
            };
            let ceiling = match terms.max_affordable_claim(x, template.premium) {
                ClaimCeiling::Bounded(c) => Some(c),
                ClaimCeiling::Unbounded => None,
            };
            let row = CurvePoint {
                plan_id: plan.id.0,
                cumulative_claim: x,
                reimbursement,
                out_of_pocket: terms.out_of_pocket_at(x),
                next_regime: terms.regime(x, step),
                ceiling_at_premium: ceiling,
            };
            match serde_json::to_string(&row) {
                Ok(line) => println!("{line}"),
                Err(e) => {
                    eprintln!("plan_table: serialisation failed: {e}");
                    return ExitCode::FAILURE;
                }
            }
            x += step;
            points += 1;
        }

        let plateau = if bp.bp2.is_finite() {
            format!("{:>9.0}", terms.out_of_pocket_at(bp.bp2))
        } else {
            "     none".to_string()
        };
        let bp2 = if bp.bp2.is_finite() { format!("{:>9.0}", bp.bp2) } else { "      inf".to_string() };
        eprintln!(
            "  plan={:<3} premium={:>7.0}  bp1={:>7.0}  bp2={bp2}  max_oop={plateau}  points={points}",
            plan.id.0, template.premium, bp.bp1,
        );
    }
    ExitCode::SUCCESS
}
