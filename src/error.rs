use thiserror::Error;

use crate::types::{ContractId, InsuredId, InsurerId, PlanId};

/// Model-definition errors. Any of these aborts the run before (or at) the
/// point where the bad definition would be used.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("plan {plan:?}: stop-loss ({stop_loss}) and stop-claim ({stop_claim}) are both set")]
    ConflictingCaps { plan: PlanId, stop_loss: f64, stop_claim: f64 },

    #[error("plan {plan:?}: stop-loss {stop_loss} is below the deductible {deductible} (stop-loss = deductible + max co-payment)")]
    StopLossBelowDeductible { plan: PlanId, stop_loss: f64, deductible: f64 },

    #[error("plan {plan:?}: co-payment rate {rate} outside [0, 1)")]
    CopaymentOutOfRange { plan: PlanId, rate: f64 },

    #[error("plan {plan:?}: {field} must be a finite non-negative amount, got {value}")]
    NegativeAmount { plan: PlanId, field: &'static str, value: f64 },

    #[error("plan {plan:?} references unknown insurer {insurer:?}")]
    UnknownInsurer { plan: PlanId, insurer: InsurerId },

    #[error("plan id {0:?} is defined more than once")]
    DuplicatePlan(PlanId),

    #[error("unknown plan-selection mode {0:?} (expected \"mandatory\" or \"voluntary\")")]
    UnknownSelectionMode(String),

    #[error("premium bounds invalid: max reduction {max_reduction_ratio}, max raise {max_raise_ratio} (need 0 < reduction <= 1 <= raise)")]
    InvalidPremiumBounds { max_reduction_ratio: f64, max_raise_ratio: f64 },

    #[error("insured {0:?} found no eligible plan under mandatory insurance")]
    NoEligiblePlan(InsuredId),

    #[error("invalid simulation parameter {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("could not read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("could not parse config: {0}")]
    Parse(String),
}

/// Logic defects detected at run time. These never occur for valid inputs.
#[derive(Debug, Error, PartialEq)]
pub enum InvariantViolation {
    #[error("contract {contract:?}: reimbursement {reimbursement} for claim {claim} at claims_ytd {claims_ytd} is out of [0, claim]")]
    InvalidReimbursement {
        contract: Option<ContractId>,
        claims_ytd: f64,
        claim: f64,
        reimbursement: f64,
    },

    #[error("contract {contract:?}: claim amount {claim} must be finite and non-negative")]
    InvalidClaim { contract: Option<ContractId>, claim: f64 },

    #[error("insured {insured:?} holds {count} contracts after renewal")]
    ContractCount { insured: InsuredId, count: usize },

    #[error("unknown contract {0:?}")]
    UnknownContract(ContractId),

    #[error("unknown plan {0:?}")]
    UnknownPlan(PlanId),
}

#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}
