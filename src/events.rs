use serde::Serialize;

use crate::care::TreatmentType;
use crate::types::{ContractId, InsuredId, InsurerId, PlanId, Tick, Year};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TerminationReason {
    /// Annual cohort renewal.
    Renewal,
    Death,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    /// Fires once at Tick(0).
    SimulationStart { year_start: Year, population: usize },
    YearStart { year: Year },
    YearEnd { year: Year, insured: usize, uninsured: usize },
    ContractSigned {
        contract_id: ContractId,
        plan_id: PlanId,
        insurer_id: InsurerId,
        insured_id: InsuredId,
        premium: f64,
        net_cost: f64,
    },
    ContractTerminated {
        contract_id: ContractId,
        plan_id: PlanId,
        insured_id: InsuredId,
        reason: TerminationReason,
        claims_ytd: f64,
        reimbursement_ytd: f64,
    },
    /// Voluntary mode only: no plan beat going without.
    RemainedUninsured { insured_id: InsuredId, projected_claim: f64 },
    /// Weekly instalments collected by one insurer in one tick.
    PremiumsCollected { insurer_id: InsurerId, amount: f64, payers: usize },
    CareReceived {
        insured_id: InsuredId,
        treatment: TreatmentType,
        /// Provider's list price before budget renegotiation.
        list_price: f64,
        bill: f64,
    },
    ClaimSettled {
        contract_id: ContractId,
        insured_id: InsuredId,
        insurer_id: InsurerId,
        claim: f64,
        reimbursement: f64,
        claims_ytd: f64,
    },
    InsuredDied { insured_id: InsuredId, age_years: u32 },
    InsuredJoined { insured_id: InsuredId, replaces: Option<InsuredId> },
    PremiumAdjusted {
        plan_id: PlanId,
        insurer_id: InsurerId,
        old: f64,
        new: f64,
        insurees: u32,
        observed_cost: Option<f64>,
    },
    DeductibleRaised { plan_id: PlanId, old: f64, new: f64 },
}

/// Completed events in dispatch order.
pub type EventLog = Vec<SimEvent>;

/// Log entry: what happened, and in which week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimEvent {
    pub tick: Tick,
    pub event: Event,
}
