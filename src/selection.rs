use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, InvariantViolation};
use crate::plan::PlanTemplate;
use crate::types::PlanId;

/// Whether the population is obliged to hold a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsuranceMode {
    Mandatory,
    Voluntary,
}

impl FromStr for InsuranceMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mandatory" => Ok(InsuranceMode::Mandatory),
            "voluntary" => Ok(InsuranceMode::Voluntary),
            other => Err(ConfigError::UnknownSelectionMode(other.to_string())),
        }
    }
}

impl fmt::Display for InsuranceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsuranceMode::Mandatory => write!(f, "mandatory"),
            InsuranceMode::Voluntary => write!(f, "voluntary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRequest {
    pub projected_annual_claim: f64,
    /// Multiplier (>= 1) applied to the cost of any plan other than `prior_plan`.
    pub switching_cost_multiplier: f64,
    pub prior_plan: Option<PlanId>,
    /// Highest annual premium the insured can pay.
    pub affordability_limit: f64,
    pub mode: InsuranceMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlanChoice {
    pub plan_id: PlanId,
    pub net_cost: f64,
}

/// Pick the plan with the lowest projected net cost.
///
/// Voluntary: the plan must be affordable and beat going uninsured, whose
/// cost is the projected claim itself. Mandatory: there is no uninsured
/// option, so the cheapest affordable plan wins and, failing that, the
/// cheapest plan outright. Ties keep the earlier plan.
pub fn select_best_eligible_plan<'a>(
    plans: impl IntoIterator<Item = &'a PlanTemplate>,
    request: &SelectionRequest,
) -> Result<Option<PlanChoice>, InvariantViolation> {
    let reservation = match request.mode {
        InsuranceMode::Voluntary => request.projected_annual_claim,
        InsuranceMode::Mandatory => f64::INFINITY,
    };

    let mut best: Option<PlanChoice> = None;
    let mut cheapest: Option<PlanChoice> = None;

    for plan in plans {
        let mut net_cost = plan.projected_net_cost(request.projected_annual_claim)?;
        if request.prior_plan != Some(plan.id) {
            net_cost *= request.switching_cost_multiplier;
        }
        let candidate = PlanChoice { plan_id: plan.id, net_cost };

        let bar = best.map_or(reservation, |b| b.net_cost);
        if plan.premium <= request.affordability_limit && net_cost < bar {
            best = Some(candidate);
        }
        if cheapest.is_none_or(|c| net_cost < c.net_cost) {
            cheapest = Some(candidate);
        }
    }

    Ok(match request.mode {
        InsuranceMode::Voluntary => best,
        InsuranceMode::Mandatory => best.or(cheapest),
    })
}
