use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::events::{Event, SimEvent};
use crate::premium::PremiumBounds;
use crate::types::{ContractId, InsuredId, PlanId};

/// Per-year aggregate statistics derived from the event stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YearStats {
    pub year: u32,
    /// Sum of PremiumsCollected.amount in the year.
    pub premiums: f64,
    /// Sum of all care bills, insured or not.
    pub care_spend: f64,
    /// Sum of ClaimSettled.claim.
    pub claims: f64,
    /// Sum of ClaimSettled.reimbursement.
    pub reimbursements: f64,
    pub contracts_signed: u32,
    /// Sum of ContractSigned.premium, for the mean.
    signed_premium_total: f64,
    pub declined: u32,
    pub deaths: u32,
    /// Uninsured head count at YearEnd.
    pub uninsured: u32,
    pub population: u32,
    pub deductible_raises: u32,
}

impl YearStats {
    fn zero(year: u32) -> Self {
        YearStats { year, ..Default::default() }
    }

    /// Reimbursements / premiums collected. Zero if no premium.
    pub fn loss_ratio(&self) -> f64 {
        if self.premiums == 0.0 { 0.0 } else { self.reimbursements / self.premiums }
    }

    /// Care spending the insureds bore themselves.
    pub fn out_of_pocket(&self) -> f64 {
        self.care_spend - self.reimbursements
    }

    /// Mean annual premium of contracts signed this year. Zero if none.
    pub fn mean_premium(&self) -> f64 {
        if self.contracts_signed == 0 {
            0.0
        } else {
            self.signed_premium_total / self.contracts_signed as f64
        }
    }

    pub fn uninsured_share(&self) -> f64 {
        if self.population == 0 { 0.0 } else { self.uninsured as f64 / self.population as f64 }
    }
}

/// Compute per-year statistics from a typed event slice, sorted by year.
pub fn analyse(events: &[SimEvent]) -> Vec<YearStats> {
    let mut stats: BTreeMap<u32, YearStats> = BTreeMap::new();

    for sim_event in events {
        let year = sim_event.tick.year().0;
        let s = stats.entry(year).or_insert_with(|| YearStats::zero(year));

        match &sim_event.event {
            Event::PremiumsCollected { amount, .. } => s.premiums += amount,
            Event::CareReceived { bill, .. } => s.care_spend += bill,
            Event::ClaimSettled { claim, reimbursement, .. } => {
                s.claims += claim;
                s.reimbursements += reimbursement;
            }
            Event::ContractSigned { premium, .. } => {
                s.contracts_signed += 1;
                s.signed_premium_total += premium;
            }
            Event::RemainedUninsured { .. } => s.declined += 1,
            Event::InsuredDied { .. } => s.deaths += 1,
            Event::DeductibleRaised { .. } => s.deductible_raises += 1,
            Event::YearEnd { insured, uninsured, .. } => {
                s.uninsured = *uninsured as u32;
                s.population = (*insured + *uninsured) as u32;
            }
            _ => {}
        }
    }

    stats.into_values().collect()
}

/// Distribution statistics for a continuous metric across N simulation runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Distribution statistics for a sparse integer count metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountDist {
    pub n: usize,
    pub p50: u32,
    pub max: u32,
    pub mean: f64,
}

/// Per-year cross-run distribution of the key YearStats metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearDist {
    pub year: u32,
    pub loss_ratio: DistStats,
    pub mean_premium: DistStats,
    pub out_of_pocket: DistStats,
    pub uninsured_share: DistStats,
    pub deaths: CountDist,
    pub declined: CountDist,
}

fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let h = p * (n - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = h - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

fn percentile_stats(mut values: Vec<f64>) -> Option<DistStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };

    Some(DistStats {
        n,
        min: values[0],
        p5: interpolate(&values, 0.05),
        p25: interpolate(&values, 0.25),
        p50: interpolate(&values, 0.50),
        p75: interpolate(&values, 0.75),
        p95: interpolate(&values, 0.95),
        max: values[n - 1],
        mean,
        std_dev: variance.sqrt(),
    })
}

fn count_dist(values: Vec<u32>) -> Option<CountDist> {
    let max = *values.iter().max()?;
    let n = values.len();
    let mean = values.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
    let mut as_f64: Vec<f64> = values.iter().map(|&x| x as f64).collect();
    as_f64.sort_by(f64::total_cmp);
    let p50 = interpolate(&as_f64, 0.5).round() as u32;
    Some(CountDist { n, p50, max, mean })
}

/// Per-year cross-run distributions. Years present in fewer than 2 runs are
/// skipped. Sorted by year.
pub fn analyse_distributions(all_runs: &[Vec<YearStats>]) -> Vec<YearDist> {
    let all_years: BTreeSet<u32> =
        all_runs.iter().flat_map(|run| run.iter().map(|s| s.year)).collect();

    let mut result = Vec::new();
    for year in all_years {
        let year_stats: Vec<&YearStats> = all_runs
            .iter()
            .filter_map(|run| run.iter().find(|s| s.year == year))
            .collect();
        if year_stats.len() < 2 {
            continue;
        }

        let metric = |f: fn(&YearStats) -> f64| year_stats.iter().map(|s| f(s)).collect::<Vec<_>>();
        let count = |f: fn(&YearStats) -> u32| year_stats.iter().map(|s| f(s)).collect::<Vec<_>>();

        let dist = (|| {
            Some(YearDist {
                year,
                loss_ratio: percentile_stats(metric(YearStats::loss_ratio))?,
                mean_premium: percentile_stats(metric(YearStats::mean_premium))?,
                out_of_pocket: percentile_stats(metric(YearStats::out_of_pocket))?,
                uninsured_share: percentile_stats(metric(YearStats::uninsured_share))?,
                deaths: count_dist(count(|s| s.deaths))?,
                declined: count_dist(count(|s| s.declined))?,
            })
        })();
        result.extend(dist);
    }
    result
}

/// A ledger invariant violation detected in the event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerViolation {
    /// Reimbursement outside `[0, claim]`.
    ReimbursementOutOfRange { tick: u64, contract_id: ContractId, claim: f64, reimbursement: f64 },
    /// A contract was signed while the insured still held a live one.
    OverlappingContracts { tick: u64, insured_id: InsuredId },
    /// A claim was settled against a contract that was not live.
    ClaimWithoutContract { tick: u64, contract_id: ContractId },
    /// A contract's claims_ytd went down between settlements.
    ClaimsYtdDecreased { tick: u64, contract_id: ContractId, before: f64, after: f64 },
    /// A premium moved outside the regulated band.
    PremiumOutOfBounds { tick: u64, plan_id: PlanId, old: f64, new: f64 },
}

impl std::fmt::Display for LedgerViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReimbursementOutOfRange { tick, contract_id, claim, reimbursement } => write!(
                f,
                "ReimbursementOutOfRange tick={tick} contract={}: reimbursement={reimbursement} claim={claim}",
                contract_id.0
            ),
            Self::OverlappingContracts { tick, insured_id } => {
                write!(f, "OverlappingContracts tick={tick} insured={}", insured_id.0)
            }
            Self::ClaimWithoutContract { tick, contract_id } => {
                write!(f, "ClaimWithoutContract tick={tick} contract={}", contract_id.0)
            }
            Self::ClaimsYtdDecreased { tick, contract_id, before, after } => write!(
                f,
                "ClaimsYtdDecreased tick={tick} contract={}: {before} -> {after}",
                contract_id.0
            ),
            Self::PremiumOutOfBounds { tick, plan_id, old, new } => {
                write!(f, "PremiumOutOfBounds tick={tick} plan={}: {old} -> {new}", plan_id.0)
            }
        }
    }
}

const LEDGER_TOLERANCE: f64 = 1e-6;

/// Replay the contract ledger and check its invariants. Returns one item
/// per violation found.
pub fn verify_ledger(events: &[SimEvent], bounds: &PremiumBounds) -> Vec<LedgerViolation> {
    let mut violations = Vec::new();
    // contract → (insured, last claims_ytd)
    let mut live: BTreeMap<ContractId, (InsuredId, f64)> = BTreeMap::new();
    let mut holding: BTreeMap<InsuredId, ContractId> = BTreeMap::new();

    for e in events {
        let tick = e.tick.0;
        match &e.event {
            Event::ContractSigned { contract_id, insured_id, .. } => {
                if holding.insert(*insured_id, *contract_id).is_some() {
                    violations.push(LedgerViolation::OverlappingContracts {
                        tick,
                        insured_id: *insured_id,
                    });
                }
                live.insert(*contract_id, (*insured_id, 0.0));
            }
            Event::ContractTerminated { contract_id, insured_id, .. } => {
                live.remove(contract_id);
                if holding.get(insured_id) == Some(contract_id) {
                    holding.remove(insured_id);
                }
            }
            Event::ClaimSettled { contract_id, claim, reimbursement, claims_ytd, .. } => {
                let slack = LEDGER_TOLERANCE * claim.max(1.0);
                if *reimbursement < -slack || *reimbursement > claim + slack {
                    violations.push(LedgerViolation::ReimbursementOutOfRange {
                        tick,
                        contract_id: *contract_id,
                        claim: *claim,
                        reimbursement: *reimbursement,
                    });
                }
                match live.get_mut(contract_id) {
                    Some((_, last)) => {
                        if *claims_ytd + LEDGER_TOLERANCE < *last {
                            violations.push(LedgerViolation::ClaimsYtdDecreased {
                                tick,
                                contract_id: *contract_id,
                                before: *last,
                                after: *claims_ytd,
                            });
                        }
                        *last = *claims_ytd;
                    }
                    None => violations.push(LedgerViolation::ClaimWithoutContract {
                        tick,
                        contract_id: *contract_id,
                    }),
                }
            }
            Event::PremiumAdjusted { plan_id, old, new, .. } => {
                let floor = old * bounds.max_reduction_ratio - LEDGER_TOLERANCE;
                let ceiling = old * bounds.max_raise_ratio + LEDGER_TOLERANCE;
                if *new < floor || *new > ceiling {
                    violations.push(LedgerViolation::PremiumOutOfBounds {
                        tick,
                        plan_id: *plan_id,
                        old: *old,
                        new: *new,
                    });
                }
            }
            _ => {}
        }
    }
    violations
}
