use serde::{Deserialize, Serialize};

use crate::cost_sharing::{Cap, CostSharing};
use crate::error::{ConfigError, InvariantViolation};
use crate::premium::{CostHistory, MinimumDeductiblePolicy};
use crate::types::{InsurerId, PlanId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    Female,
    Male,
}

/// Who may buy a plan. Ages are whole years, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub min_age: u32,
    pub max_age: u32,
    pub women: bool,
    pub men: bool,
}

impl Eligibility {
    pub fn everyone() -> Self {
        Eligibility { min_age: 0, max_age: u32::MAX, women: true, men: true }
    }

    pub fn admits(&self, age_years: u32, sex: Sex) -> bool {
        let sex_ok = match sex {
            Sex::Female => self.women,
            Sex::Male => self.men,
        };
        sex_ok && (self.min_age..=self.max_age).contains(&age_years)
    }
}

impl Default for Eligibility {
    fn default() -> Self {
        Self::everyone()
    }
}

/// An insurer's offer. Contracts copy its terms when signed; after that only
/// the annual premium pass touches the template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanTemplate {
    pub id: PlanId,
    pub insurer_id: InsurerId,
    /// Annual premium.
    pub premium: f64,
    pub terms: CostSharing,
    pub eligibility: Eligibility,
    pub cost_history: CostHistory,
    /// Contracts signed under this plan since the last premium update.
    pub insurees_this_year: u32,
    /// Reimbursements booked this year by contracts that ended early.
    pub closed_reimbursements: f64,
}

impl PlanTemplate {
    pub fn new(
        id: PlanId,
        insurer_id: InsurerId,
        premium: f64,
        terms: CostSharing,
        eligibility: Eligibility,
    ) -> Result<Self, ConfigError> {
        if !premium.is_finite() || premium < 0.0 {
            return Err(ConfigError::NegativeAmount { plan: id, field: "premium", value: premium });
        }
        Ok(PlanTemplate {
            id,
            insurer_id,
            premium,
            terms,
            eligibility,
            cost_history: CostHistory::new(),
            insurees_this_year: 0,
            closed_reimbursements: 0.0,
        })
    }

    /// What a fresh contract on this plan would reimburse for `claim`.
    pub fn projected_reimbursement(&self, claim: f64) -> Result<f64, InvariantViolation> {
        self.terms.reimbursement(0.0, claim)
    }

    /// Expected yearly cost of holding this plan: premium plus the
    /// out-of-pocket share of `projected_claim`.
    pub fn projected_net_cost(&self, projected_claim: f64) -> Result<f64, InvariantViolation> {
        Ok(projected_claim - self.projected_reimbursement(projected_claim)? + self.premium)
    }

    /// Raise the deductible to the regulatory floor. Returns the old
    /// deductible when the plan had to change.
    pub fn enforce_minimum_deductible(
        &mut self,
        policy: &MinimumDeductiblePolicy,
    ) -> Result<Option<f64>, ConfigError> {
        let old = self.terms.deductible;
        if old >= policy.min_deductible {
            return Ok(None);
        }
        let (stop_loss, stop_claim) = match self.terms.cap {
            Cap::StopLoss(_) => (policy.min_deductible + policy.stop_loss_margin, 0.0),
            Cap::StopClaim(c) => (0.0, c),
            Cap::Uncapped => (0.0, 0.0),
        };
        self.terms = CostSharing::new(
            self.id,
            policy.min_deductible,
            self.terms.copayment_rate,
            stop_loss,
            stop_claim,
        )?;
        Ok(Some(old))
    }

    /// Zero the per-year enrolment counters after a premium update.
    pub fn reset_year(&mut self) {
        self.insurees_this_year = 0;
        self.closed_reimbursements = 0.0;
    }
}
