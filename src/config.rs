use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::care::{CareConfig, CareModel};
use crate::cost_sharing::CostSharing;
use crate::error::ConfigError;
use crate::insurer::Insurer;
use crate::plan::{Eligibility, PlanTemplate};
use crate::premium::{MinimumDeductiblePolicy, PremiumBounds};
use crate::selection::InsuranceMode;
use crate::types::{InsurerId, PlanId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsurerConfig {
    pub id: InsurerId,
    pub initial_capital: f64,
}

/// Raw plan definition. `stop_loss` / `stop_claim` of 0 mean "not set".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    pub id: PlanId,
    pub insurer_id: InsurerId,
    pub premium: f64,
    pub deductible: f64,
    pub copayment_rate: f64,
    #[serde(default)]
    pub stop_loss: f64,
    #[serde(default)]
    pub stop_claim: f64,
    #[serde(default)]
    pub eligibility: Eligibility,
}

impl PlanConfig {
    pub fn build(&self) -> Result<PlanTemplate, ConfigError> {
        let terms = CostSharing::new(
            self.id,
            self.deductible,
            self.copayment_rate,
            self.stop_loss,
            self.stop_claim,
        )?;
        PlanTemplate::new(self.id, self.insurer_id, self.premium, terms, self.eligibility)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub size: usize,
    /// Initial ages are uniform on `[min_age, max_age]` years.
    pub min_age: u32,
    pub max_age: u32,
    pub female_share: f64,
    /// Log-normal weekly income; ln-space params.
    pub income_mu: f64,
    pub income_sigma: f64,
    /// Starting cash in weeks of income.
    pub initial_cash_weeks: f64,
    /// Projected annual claim before an insured has a year of history.
    pub initial_expected_expenditure: f64,
    /// Age of the newcomer who takes a dead insured's place.
    pub replacement_age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub years: u32,
    pub mode: InsuranceMode,
    /// Visit agents in a seeded random order within each phase.
    pub shuffle_agents: bool,
    pub switching_cost_multiplier: f64,
    pub weekly_mortality: f64,
    pub premium_bounds: PremiumBounds,
    #[serde(default)]
    pub minimum_deductible: Option<MinimumDeductiblePolicy>,
    pub insurers: Vec<InsurerConfig>,
    pub plans: Vec<PlanConfig>,
    pub population: PopulationConfig,
    pub care: CareConfig,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter { field, reason: reason.into() }
}

fn plan(
    id: u64,
    insurer: u64,
    premium: f64,
    deductible: f64,
    copayment_rate: f64,
    stop_loss: f64,
    stop_claim: f64,
) -> PlanConfig {
    PlanConfig {
        id: PlanId(id),
        insurer_id: InsurerId(insurer),
        premium,
        deductible,
        copayment_rate,
        stop_loss,
        stop_claim,
        eligibility: Eligibility::everyone(),
    }
}

impl SimulationConfig {
    pub fn canonical() -> Self {
        SimulationConfig {
            seed: 42,
            years: 10,
            mode: InsuranceMode::Mandatory,
            shuffle_agents: true,
            switching_cost_multiplier: 1.05,
            // ≈ 1% per year
            weekly_mortality: 0.0002,
            premium_bounds: PremiumBounds { max_reduction_ratio: 0.8, max_raise_ratio: 1.5 },
            minimum_deductible: None,
            insurers: vec![
                InsurerConfig { id: InsurerId(1), initial_capital: 5_000_000.0 },
                InsurerConfig { id: InsurerId(2), initial_capital: 5_000_000.0 },
            ],
            // ── Plans: deductible ladder, stop-loss = deductible + 700 ───────
            plans: vec![
                plan(1, 1, 2_600.0, 300.0, 0.1, 1_000.0, 0.0),
                plan(2, 1, 2_200.0, 1_000.0, 0.1, 1_700.0, 0.0),
                plan(3, 1, 1_800.0, 2_500.0, 0.1, 3_200.0, 0.0),
                plan(4, 2, 2_400.0, 500.0, 0.1, 1_200.0, 0.0),
                plan(5, 2, 1_900.0, 1_500.0, 0.1, 2_200.0, 0.0),
                // Stop-claim: insurer pays at most 20k a year.
                plan(6, 2, 1_500.0, 500.0, 0.2, 0.0, 20_000.0),
            ],
            population: PopulationConfig {
                size: 1_000,
                min_age: 18,
                max_age: 80,
                female_share: 0.5,
                // mu=6.4, sigma=0.5 → median ≈ 600 per week
                income_mu: 6.4,
                income_sigma: 0.5,
                initial_cash_weeks: 8.0,
                initial_expected_expenditure: 2_500.0,
                replacement_age: 18,
            },
            care: CareConfig::canonical(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        // Surface a bad mode as its own error rather than a generic parse failure.
        if let Some(mode) = value.get("mode").and_then(|m| m.as_str()) {
            mode.parse::<InsuranceMode>()?;
        }
        serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    /// Check every parameter and build the insurers with their plans.
    /// Runs before the first tick; nothing is simulated on bad input.
    pub fn build_insurers(&self) -> Result<Vec<Insurer>, ConfigError> {
        self.premium_bounds.validate()?;

        let mut insurers: Vec<Insurer> = Vec::with_capacity(self.insurers.len());
        for c in &self.insurers {
            if !c.initial_capital.is_finite() {
                return Err(invalid("insurers.initial_capital", format!("{:?}: not finite", c.id)));
            }
            if insurers.iter().any(|i| i.id == c.id) {
                return Err(invalid("insurers.id", format!("{:?} defined more than once", c.id)));
            }
            insurers.push(Insurer::new(c.id, c.initial_capital));
        }

        let mut seen = BTreeSet::new();
        for p in &self.plans {
            if !seen.insert(p.id) {
                return Err(ConfigError::DuplicatePlan(p.id));
            }
            let template = p.build()?;
            let insurer = insurers
                .iter_mut()
                .find(|i| i.id == p.insurer_id)
                .ok_or(ConfigError::UnknownInsurer { plan: p.id, insurer: p.insurer_id })?;
            insurer.plans.push(template);
        }

        // Apply the deductible floor to scratch copies now so a bad policy
        // fails here and not in the year it comes into force.
        if let Some(policy) = &self.minimum_deductible {
            policy.validate()?;
            for template in insurers.iter().flat_map(|i| &i.plans) {
                template.clone().enforce_minimum_deductible(policy)?;
            }
        }
        Ok(insurers)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.years == 0 {
            return Err(invalid("years", "must be at least 1"));
        }
        if self.plans.is_empty() {
            return Err(invalid("plans", "at least one plan is required"));
        }
        if !(self.switching_cost_multiplier.is_finite() && self.switching_cost_multiplier > 0.0) {
            return Err(invalid("switching_cost_multiplier", "must be finite and > 0"));
        }
        if !(0.0..=1.0).contains(&self.weekly_mortality) {
            return Err(invalid("weekly_mortality", "must be a probability"));
        }
        let pop = &self.population;
        if pop.size == 0 {
            return Err(invalid("population.size", "must be at least 1"));
        }
        if pop.min_age > pop.max_age {
            return Err(invalid("population.min_age", "exceeds max_age"));
        }
        if !(0.0..=1.0).contains(&pop.female_share) {
            return Err(invalid("population.female_share", "must be in [0, 1]"));
        }
        if !(pop.income_sigma.is_finite() && pop.income_sigma >= 0.0) {
            return Err(invalid("population.income_sigma", "must be finite and >= 0"));
        }
        if !(pop.initial_expected_expenditure.is_finite() && pop.initial_expected_expenditure >= 0.0) {
            return Err(invalid("population.initial_expected_expenditure", "must be finite and >= 0"));
        }
        CareModel::new(&self.care)?;
        self.build_insurers().map(|_| ())
    }
}
