use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const COST_HISTORY_YEARS: usize = 5;

/// Fixed-capacity ring buffer of average cost per insuree, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostHistory {
    slots: [f64; COST_HISTORY_YEARS],
    /// Index the next push writes to.
    next: usize,
    len: usize,
}

impl CostHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new year, evicting the oldest once full.
    pub fn push(&mut self, cost: f64) {
        self.slots[self.next] = cost;
        self.next = (self.next + 1) % COST_HISTORY_YEARS;
        self.len = (self.len + 1).min(COST_HISTORY_YEARS);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (1..=self.len).map(move |back| {
            self.slots[(self.next + COST_HISTORY_YEARS - back) % COST_HISTORY_YEARS]
        })
    }

    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.iter().sum::<f64>() / self.len as f64)
    }
}

/// Regulated year-over-year premium change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PremiumBounds {
    /// Floor as a fraction of the current premium, in `(0, 1]`.
    pub max_reduction_ratio: f64,
    /// Ceiling as a multiple of the current premium, `>= 1`.
    pub max_raise_ratio: f64,
}

impl PremiumBounds {
    pub fn new(max_reduction_ratio: f64, max_raise_ratio: f64) -> Result<Self, ConfigError> {
        let bounds = PremiumBounds { max_reduction_ratio, max_raise_ratio };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ok = self.max_reduction_ratio.is_finite()
            && self.max_raise_ratio.is_finite()
            && self.max_reduction_ratio > 0.0
            && self.max_reduction_ratio <= 1.0
            && self.max_raise_ratio >= 1.0;
        if ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidPremiumBounds {
                max_reduction_ratio: self.max_reduction_ratio,
                max_raise_ratio: self.max_raise_ratio,
            })
        }
    }

    pub fn clamp(&self, current: f64, candidate: f64) -> f64 {
        candidate
            .max(current * self.max_reduction_ratio)
            .min(current * self.max_raise_ratio)
    }
}

impl Default for PremiumBounds {
    fn default() -> Self {
        PremiumBounds { max_reduction_ratio: 0.8, max_raise_ratio: 1.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PremiumAdjustment {
    pub old: f64,
    pub new: f64,
    /// This year's reimbursements per insuree; `None` when nobody enrolled.
    pub observed_cost: Option<f64>,
    pub average_cost: Option<f64>,
}

/// One step of the premium control loop.
/// Once a year the premium moves towards the mean observed cost per insuree,
/// never by more than the regulated year-over-year bounds.
///
/// With enrolment, the year's cost per insuree enters `history` and the
/// candidate premium is the history mean. Without enrolment the history is
/// left alone and the candidate is the largest permitted cut. Either way
/// the result is clamped into the regulated band around `current`.
pub fn adjust_premium(
    current: f64,
    total_reimbursements: f64,
    total_insurees: u32,
    history: &mut CostHistory,
    bounds: &PremiumBounds,
) -> PremiumAdjustment {
    let observed_cost =
        (total_insurees > 0).then(|| total_reimbursements / total_insurees as f64);
    if let Some(cost) = observed_cost {
        history.push(cost);
    }
    let average_cost = history.mean();

    let candidate = match (observed_cost, average_cost) {
        (Some(_), Some(avg)) => avg,
        _ => current * bounds.max_reduction_ratio,
    };

    PremiumAdjustment {
        old: current,
        new: bounds.clamp(current, candidate),
        observed_cost,
        average_cost,
    }
}

/// Regulatory floor on deductibles, in force from `from_year` onwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimumDeductiblePolicy {
    pub from_year: u32,
    pub min_deductible: f64,
    /// Maximum co-payment on top of the deductible for stop-loss plans.
    pub stop_loss_margin: f64,
}

impl MinimumDeductiblePolicy {
    pub fn in_force(&self, year: u32) -> bool {
        year >= self.from_year
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("minimum_deductible.min_deductible", self.min_deductible),
            ("minimum_deductible.stop_loss_margin", self.stop_loss_margin),
        ];
        for (field, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidParameter {
                    field,
                    reason: format!("{value} must be finite and >= 0"),
                });
            }
        }
        Ok(())
    }
}
