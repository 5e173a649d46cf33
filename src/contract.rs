use serde::Serialize;

use crate::cost_sharing::{ClaimCeiling, CostSharing};
use crate::error::InvariantViolation;
use crate::plan::PlanTemplate;
use crate::types::{ContractId, InsuredId, InsurerId, PlanId, Tick};

/// A signed insurance contract for one coverage year.
/// Terms and premium are frozen at signature; the YTD accumulators only grow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contract {
    pub id: ContractId,
    pub plan_id: PlanId,
    pub insurer_id: InsurerId,
    pub insured_id: InsuredId,
    pub start: Tick,
    pub terms: CostSharing,
    pub premium: f64,
    pub claims_ytd: f64,
    pub reimbursement_ytd: f64,
}

impl Contract {
    pub fn sign(id: ContractId, plan: &PlanTemplate, insured_id: InsuredId, start: Tick) -> Self {
        Contract {
            id,
            plan_id: plan.id,
            insurer_id: plan.insurer_id,
            insured_id,
            start,
            terms: plan.terms,
            premium: plan.premium,
            claims_ytd: 0.0,
            reimbursement_ytd: 0.0,
        }
    }

    /// Reimbursement owed for `claim`. With `commit == false` this is a
    /// projection and the contract is left untouched.
    pub fn adjudicate(&mut self, claim: f64, commit: bool) -> Result<f64, InvariantViolation> {
        let reimbursement = self.project(claim)?;
        if commit {
            self.claims_ytd += claim;
            self.reimbursement_ytd += reimbursement;
        }
        Ok(reimbursement)
    }

    pub fn project(&self, claim: f64) -> Result<f64, InvariantViolation> {
        self.terms.reimbursement_for(Some(self.id), self.claims_ytd, claim)
    }

    pub fn max_affordable_claim(&self, allowance: f64) -> ClaimCeiling {
        self.terms.max_affordable_claim(self.claims_ytd, allowance)
    }

    /// One of the 52 weekly instalments of the frozen annual premium.
    pub fn weekly_premium(&self) -> f64 {
        self.premium / Tick::WEEKS_PER_YEAR as f64
    }

    pub fn out_of_pocket_ytd(&self) -> f64 {
        self.claims_ytd - self.reimbursement_ytd
    }
}
