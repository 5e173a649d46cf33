use std::collections::VecDeque;

use serde::Serialize;

use crate::care::CareEpisode;
use crate::plan::Sex;
use crate::types::{ContractId, InsuredId, PlanId, Tick};

/// Years of expenditure an insured remembers when projecting next year.
pub const EXPENDITURE_MEMORY_YEARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Coverage {
    Uninsured,
    Active(ContractId),
    /// Old contract closed at the renewal boundary, selection not yet run.
    PendingRenewal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insured {
    pub id: InsuredId,
    pub age_weeks: u64,
    pub sex: Sex,
    pub weekly_income: f64,
    /// Liquid wealth. Premium instalments may drive it negative.
    pub cash: f64,
    pub coverage: Coverage,
    /// Plan held last year, for switching costs.
    pub prior_plan: Option<PlanId>,
    /// Completed years of medical spending, newest first.
    pub expenditure_history: VecDeque<f64>,
    pub ytd_expenditure: f64,
    pub ytd_out_of_pocket: f64,
    pub pending_episodes: Vec<CareEpisode>,
}

impl Insured {
    pub fn new(id: InsuredId, age_weeks: u64, sex: Sex, weekly_income: f64, cash: f64) -> Self {
        Insured {
            id,
            age_weeks,
            sex,
            weekly_income,
            cash,
            coverage: Coverage::Uninsured,
            prior_plan: None,
            expenditure_history: VecDeque::with_capacity(EXPENDITURE_MEMORY_YEARS),
            ytd_expenditure: 0.0,
            ytd_out_of_pocket: 0.0,
            pending_episodes: Vec::new(),
        }
    }

    /// Newcomer taking over a dead insured's slot: same sex and income,
    /// adult age, no history.
    pub fn successor(&self, id: InsuredId, age_years: u32) -> Self {
        Insured::new(
            id,
            age_years as u64 * Tick::WEEKS_PER_YEAR,
            self.sex,
            self.weekly_income,
            self.weekly_income,
        )
    }

    pub fn age_years(&self) -> u32 {
        (self.age_weeks / Tick::WEEKS_PER_YEAR) as u32
    }

    pub fn contract_id(&self) -> Option<ContractId> {
        match self.coverage {
            Coverage::Active(id) => Some(id),
            Coverage::Uninsured | Coverage::PendingRenewal => None,
        }
    }

    pub fn is_insured(&self) -> bool {
        self.contract_id().is_some()
    }

    /// Highest annual premium this insured can commit to.
    pub fn affordability_limit(&self) -> f64 {
        self.weekly_income * Tick::WEEKS_PER_YEAR as f64
    }

    /// Expected medical spending next year: the mean of remembered years,
    /// or `fallback` before any year has completed.
    pub fn projected_annual_claim(&self, fallback: f64) -> f64 {
        if self.expenditure_history.is_empty() {
            return fallback;
        }
        self.expenditure_history.iter().sum::<f64>() / self.expenditure_history.len() as f64
    }

    /// Weekly reset: one week older, one week of income richer.
    pub fn on_week_start(&mut self) {
        self.age_weeks += 1;
        self.cash += self.weekly_income;
    }

    pub fn pay(&mut self, amount: f64) {
        self.cash -= amount;
    }

    /// Book a treatment bill and the part the insured bore.
    pub fn record_care(&mut self, bill: f64, out_of_pocket: f64) {
        self.ytd_expenditure += bill;
        self.ytd_out_of_pocket += out_of_pocket;
    }

    /// Cash available for medical bills.
    pub fn care_allowance(&self) -> f64 {
        self.cash.max(0.0)
    }

    /// Close the expenditure year.
    pub fn on_year_end(&mut self) {
        if self.expenditure_history.len() == EXPENDITURE_MEMORY_YEARS {
            self.expenditure_history.pop_back();
        }
        self.expenditure_history.push_front(self.ytd_expenditure);
        self.ytd_expenditure = 0.0;
        self.ytd_out_of_pocket = 0.0;
    }
}
