use rand::Rng;
use rand::distr::weighted::WeightedIndex;
use rand_distr::{Distribution, LogNormal, Poisson};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How an illness episode is treated. Self-care never reaches the insurer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreatmentType {
    SelfCare,
    Placebo,
    Normal,
    Specialist,
}

impl TreatmentType {
    pub fn is_reimbursable(self) -> bool {
        match self {
            TreatmentType::SelfCare => false,
            TreatmentType::Placebo | TreatmentType::Normal | TreatmentType::Specialist => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreatmentOption {
    pub treatment: TreatmentType,
    /// Relative choice weight.
    pub weight: f64,
    /// Multiplier on the episode's base cost.
    pub cost_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareConfig {
    /// Poisson λ: expected illness episodes per insured per week.
    pub weekly_illness_rate: f64,
    /// Log-normal base episode cost; ln-space params.
    /// E[X] = exp(mu + sigma²/2).
    pub cost_mu: f64,
    pub cost_sigma: f64,
    pub treatments: Vec<TreatmentOption>,
}

impl CareConfig {
    pub fn canonical() -> Self {
        // mu=5.5, sigma=1.1 → E[X] ≈ 450; median ≈ 245
        CareConfig {
            weekly_illness_rate: 0.05,
            cost_mu: 5.5,
            cost_sigma: 1.1,
            treatments: vec![
                TreatmentOption { treatment: TreatmentType::SelfCare, weight: 0.25, cost_multiplier: 0.2 },
                TreatmentOption { treatment: TreatmentType::Placebo, weight: 0.10, cost_multiplier: 0.5 },
                TreatmentOption { treatment: TreatmentType::Normal, weight: 0.50, cost_multiplier: 1.0 },
                TreatmentOption { treatment: TreatmentType::Specialist, weight: 0.15, cost_multiplier: 3.0 },
            ],
        }
    }
}

/// One illness needing care this week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CareEpisode {
    pub base_cost: f64,
}

/// Sampling stand-in for disease progression and provider pricing.
#[derive(Debug, Clone)]
pub struct CareModel {
    illness: Option<Poisson<f64>>,
    cost: LogNormal<f64>,
    choice: WeightedIndex<f64>,
    options: Vec<TreatmentOption>,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter { field, reason: reason.into() }
}

impl CareModel {
    pub fn new(config: &CareConfig) -> Result<Self, ConfigError> {
        let rate = config.weekly_illness_rate;
        if !rate.is_finite() || rate < 0.0 {
            return Err(invalid("care.weekly_illness_rate", format!("{rate} must be >= 0")));
        }
        let illness = if rate > 0.0 {
            Some(Poisson::new(rate).map_err(|e| invalid("care.weekly_illness_rate", e.to_string()))?)
        } else {
            None
        };
        let sigma = config.cost_sigma;
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(invalid("care.cost_sigma", format!("{sigma} must be finite and >= 0")));
        }
        if !config.cost_mu.is_finite() {
            return Err(invalid("care.cost_mu", "must be finite"));
        }
        let cost = LogNormal::new(config.cost_mu, sigma)
            .map_err(|e| invalid("care.cost_sigma", e.to_string()))?;
        if config.treatments.iter().any(|t| !t.cost_multiplier.is_finite() || t.cost_multiplier < 0.0) {
            return Err(invalid("care.treatments", "cost multipliers must be finite and >= 0"));
        }
        let choice = WeightedIndex::new(config.treatments.iter().map(|t| t.weight))
            .map_err(|e| invalid("care.treatments", e.to_string()))?;

        Ok(CareModel { illness, cost, choice, options: config.treatments.clone() })
    }

    /// Episodes an insured falls ill with this week.
    pub fn draw_episodes(&self, rng: &mut impl Rng) -> Vec<CareEpisode> {
        let Some(poisson) = &self.illness else {
            return Vec::new();
        };
        let n = poisson.sample(rng) as usize;
        (0..n).map(|_| CareEpisode { base_cost: self.cost.sample(rng) }).collect()
    }

    /// Treatment chosen for an episode and its list price.
    pub fn choose_treatment(&self, episode: &CareEpisode, rng: &mut impl Rng) -> (TreatmentType, f64) {
        let option = &self.options[self.choice.sample(rng)];
        (option.treatment, episode.base_cost * option.cost_multiplier)
    }
}
