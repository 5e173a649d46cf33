use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::contract::Contract;
use crate::error::ConfigError;
use crate::events::Event;
use crate::plan::PlanTemplate;
use crate::premium::{MinimumDeductiblePolicy, PremiumBounds, adjust_premium};
use crate::types::{ContractId, InsurerId, PlanId, Year};

/// A health insurer. Owns its plan offers and tracks which contracts are live.
/// Capital is never re-endowed; it can go negative.
#[derive(Debug, Clone)]
pub struct Insurer {
    pub id: InsurerId,
    pub capital: f64,
    pub initial_capital: f64,
    pub plans: Vec<PlanTemplate>,
    pub active: BTreeSet<ContractId>,
}

impl Insurer {
    pub fn new(id: InsurerId, initial_capital: f64) -> Self {
        Insurer {
            id,
            capital: initial_capital,
            initial_capital,
            plans: Vec::new(),
            active: BTreeSet::new(),
        }
    }

    pub fn plan(&self, id: PlanId) -> Option<&PlanTemplate> {
        self.plans.iter().find(|p| p.id == id)
    }

    pub fn plan_mut(&mut self, id: PlanId) -> Option<&mut PlanTemplate> {
        self.plans.iter_mut().find(|p| p.id == id)
    }

    pub fn on_premium_received(&mut self, amount: f64) {
        self.capital += amount;
    }

    /// Pay out a reimbursement (capital may go negative; there is no insolvency).
    pub fn on_claim_settled(&mut self, amount: f64) {
        self.capital -= amount;
    }

    /// Annual repricing of every plan from the experience of the closing
    /// year, then any regulatory deductible floor.
    pub fn adapt_plan_offer(
        &mut self,
        year: Year,
        contracts: &BTreeMap<ContractId, Contract>,
        bounds: &PremiumBounds,
        policy: Option<&MinimumDeductiblePolicy>,
    ) -> Result<Vec<Event>, ConfigError> {
        let mut events = Vec::new();
        for plan in &mut self.plans {
            let open: f64 = self
                .active
                .iter()
                .filter_map(|id| contracts.get(id))
                .filter(|c| c.plan_id == plan.id)
                .map(|c| c.reimbursement_ytd)
                .sum();
            let total = open + plan.closed_reimbursements;
            let insurees = plan.insurees_this_year;

            let adj = adjust_premium(plan.premium, total, insurees, &mut plan.cost_history, bounds);
            plan.premium = adj.new;
            plan.reset_year();
            events.push(Event::PremiumAdjusted {
                plan_id: plan.id,
                insurer_id: self.id,
                old: adj.old,
                new: adj.new,
                insurees,
                observed_cost: adj.observed_cost,
            });

            if let Some(policy) = policy.filter(|p| p.in_force(year.0))
                && let Some(old) = plan.enforce_minimum_deductible(policy)?
            {
                debug!(plan = plan.id.0, old, new = plan.terms.deductible, "deductible raised to regulatory minimum");
                events.push(Event::DeductibleRaised {
                    plan_id: plan.id,
                    old,
                    new: plan.terms.deductible,
                });
            }
        }
        Ok(events)
    }
}
