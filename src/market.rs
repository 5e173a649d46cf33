use std::collections::BTreeMap;

use tracing::debug;

use crate::contract::Contract;
use crate::error::{ConfigError, InvariantViolation};
use crate::events::{Event, TerminationReason};
use crate::insured::{Coverage, Insured};
use crate::insurer::Insurer;
use crate::plan::{PlanTemplate, Sex};
use crate::premium::{MinimumDeductiblePolicy, PremiumBounds};
use crate::selection::InsuranceMode;
use crate::types::{ContractId, IdSequences, InsuredId, InsurerId, PlanId, Tick, Year};

/// Outcome of a committed claim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettledClaim {
    pub reimbursement: f64,
    pub insurer_id: InsurerId,
    pub claims_ytd: f64,
}

/// Contract lifecycle: signature, renewal, death, and claim settlement.
/// The market owns every live contract; insurers hold only their ids.
#[derive(Debug, Clone, Default)]
pub struct Market {
    pub insurers: Vec<Insurer>,
    pub contracts: BTreeMap<ContractId, Contract>,
}

impl Market {
    pub fn new(insurers: Vec<Insurer>) -> Self {
        Market { insurers, contracts: BTreeMap::new() }
    }

    pub fn plans(&self) -> impl Iterator<Item = &PlanTemplate> {
        self.insurers.iter().flat_map(|i| i.plans.iter())
    }

    pub fn plan(&self, id: PlanId) -> Option<&PlanTemplate> {
        self.plans().find(|p| p.id == id)
    }

    pub fn eligible_plans(&self, age_years: u32, sex: Sex) -> Vec<&PlanTemplate> {
        self.plans().filter(|p| p.eligibility.admits(age_years, sex)).collect()
    }

    fn insurer_mut(&mut self, id: InsurerId) -> Option<&mut Insurer> {
        self.insurers.iter_mut().find(|i| i.id == id)
    }

    pub fn sign_contract(
        &mut self,
        plan_id: PlanId,
        insured: &mut Insured,
        tick: Tick,
        ids: &mut IdSequences,
        net_cost: f64,
    ) -> Result<Event, InvariantViolation> {
        let insurer = self
            .insurers
            .iter_mut()
            .find(|i| i.plan(plan_id).is_some())
            .ok_or(InvariantViolation::UnknownPlan(plan_id))?;
        let plan = insurer.plan_mut(plan_id).ok_or(InvariantViolation::UnknownPlan(plan_id))?;

        let contract = Contract::sign(ids.next_contract(), plan, insured.id, tick);
        plan.insurees_this_year += 1;
        insurer.active.insert(contract.id);
        insured.coverage = Coverage::Active(contract.id);
        insured.prior_plan = Some(plan_id);
        debug!(contract = contract.id.0, insured = insured.id.0, plan = plan_id.0, "contract signed");

        let event = Event::ContractSigned {
            contract_id: contract.id,
            plan_id,
            insurer_id: contract.insurer_id,
            insured_id: insured.id,
            premium: contract.premium,
            net_cost,
        };
        self.contracts.insert(contract.id, contract);
        Ok(event)
    }

    fn close(&mut self, contract_id: ContractId) -> Result<Contract, InvariantViolation> {
        let contract = self
            .contracts
            .remove(&contract_id)
            .ok_or(InvariantViolation::UnknownContract(contract_id))?;
        if let Some(insurer) = self.insurer_mut(contract.insurer_id) {
            insurer.active.remove(&contract_id);
        }
        Ok(contract)
    }

    /// Annual cohort renewal: the current contract ends whatever its age and
    /// the insured waits for plan selection.
    pub fn terminate_for_renewal(
        &mut self,
        insured: &mut Insured,
    ) -> Result<Option<Event>, InvariantViolation> {
        let Some(contract_id) = insured.contract_id() else {
            return Ok(None);
        };
        let contract = self.close(contract_id)?;
        insured.coverage = Coverage::PendingRenewal;
        debug!(contract = contract_id.0, insured = insured.id.0, "contract closed for renewal");
        Ok(Some(termination_event(&contract, TerminationReason::Renewal)))
    }

    /// Death: the contract ends immediately. Its year-to-date reimbursements
    /// stay on the plan's books for the next repricing.
    pub fn terminate_on_death(
        &mut self,
        insured: &mut Insured,
    ) -> Result<Option<Event>, InvariantViolation> {
        let Some(contract_id) = insured.contract_id() else {
            return Ok(None);
        };
        let contract = self.close(contract_id)?;
        if let Some(plan) = self
            .insurer_mut(contract.insurer_id)
            .and_then(|i| i.plan_mut(contract.plan_id))
        {
            plan.closed_reimbursements += contract.reimbursement_ytd;
        }
        insured.coverage = Coverage::Uninsured;
        debug!(contract = contract_id.0, insured = insured.id.0, "contract closed on death");
        Ok(Some(termination_event(&contract, TerminationReason::Death)))
    }

    /// Commit a claim. Lookups and the reimbursement formula are evaluated
    /// before anything is mutated, so a failure leaves no partial booking.
    pub fn settle_claim(
        &mut self,
        contract_id: ContractId,
        claim: f64,
        insured: &mut Insured,
    ) -> Result<SettledClaim, InvariantViolation> {
        let contract = self
            .contracts
            .get(&contract_id)
            .ok_or(InvariantViolation::UnknownContract(contract_id))?;
        let reimbursement = contract.project(claim)?;
        let insurer_id = contract.insurer_id;
        if !self.insurers.iter().any(|i| i.id == insurer_id) {
            return Err(InvariantViolation::UnknownContract(contract_id));
        }

        let contract = self
            .contracts
            .get_mut(&contract_id)
            .ok_or(InvariantViolation::UnknownContract(contract_id))?;
        contract.adjudicate(claim, true)?;
        let claims_ytd = contract.claims_ytd;
        if let Some(insurer) = self.insurer_mut(insurer_id) {
            insurer.on_claim_settled(reimbursement);
        }
        insured.cash += reimbursement;

        Ok(SettledClaim { reimbursement, insurer_id, claims_ytd })
    }

    /// Weekly premium instalments from every covered insured.
    pub fn collect_premiums(&mut self, insureds: &mut [Insured]) -> Vec<Event> {
        let mut collected: BTreeMap<InsurerId, (f64, usize)> = BTreeMap::new();
        for insured in insureds.iter_mut() {
            let Some(contract) = insured.contract_id().and_then(|id| self.contracts.get(&id)) else {
                continue;
            };
            let instalment = contract.weekly_premium();
            insured.pay(instalment);
            let entry = collected.entry(contract.insurer_id).or_default();
            entry.0 += instalment;
            entry.1 += 1;
        }

        collected
            .into_iter()
            .map(|(insurer_id, (amount, payers))| {
                if let Some(insurer) = self.insurer_mut(insurer_id) {
                    insurer.on_premium_received(amount);
                }
                Event::PremiumsCollected { insurer_id, amount, payers }
            })
            .collect()
    }

    pub fn adapt_plan_offers(
        &mut self,
        year: Year,
        bounds: &PremiumBounds,
        policy: Option<&MinimumDeductiblePolicy>,
    ) -> Result<Vec<Event>, ConfigError> {
        let mut events = Vec::new();
        for insurer in &mut self.insurers {
            events.extend(insurer.adapt_plan_offer(year, &self.contracts, bounds, policy)?);
        }
        Ok(events)
    }

    /// After renewal every insured holds exactly one contract under mandatory
    /// insurance, at most one otherwise.
    pub fn check_contract_counts(
        &self,
        insureds: &[Insured],
        mode: InsuranceMode,
    ) -> Result<(), InvariantViolation> {
        let mut held: BTreeMap<InsuredId, usize> = BTreeMap::new();
        for contract in self.contracts.values() {
            *held.entry(contract.insured_id).or_default() += 1;
        }
        for insured in insureds {
            let count = held.get(&insured.id).copied().unwrap_or(0);
            let ok = match mode {
                InsuranceMode::Mandatory => count == 1,
                InsuranceMode::Voluntary => count <= 1,
            };
            if !ok {
                return Err(InvariantViolation::ContractCount { insured: insured.id, count });
            }
        }
        Ok(())
    }
}

fn termination_event(contract: &Contract, reason: TerminationReason) -> Event {
    Event::ContractTerminated {
        contract_id: contract.id,
        plan_id: contract.plan_id,
        insured_id: contract.insured_id,
        reason,
        claims_ytd: contract.claims_ytd,
        reimbursement_ytd: contract.reimbursement_ytd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost_sharing::CostSharing;
    use crate::plan::Eligibility;

    fn market() -> Market {
        let mut ins = Insurer::new(InsurerId(1), 10_000.0);
        let terms = CostSharing::new(PlanId(1), 500.0, 0.2, 2000.0, 0.0).unwrap();
        ins.plans.push(
            PlanTemplate::new(PlanId(1), InsurerId(1), 5200.0, terms, Eligibility::everyone())
                .unwrap(),
        );
        Market::new(vec![ins])
    }

    fn insured(id: u64) -> Insured {
        Insured::new(InsuredId(id), 30 * 52, Sex::Male, 500.0, 0.0)
    }

    fn signed(market: &mut Market, ids: &mut IdSequences, person: &mut Insured) -> ContractId {
        market.sign_contract(PlanId(1), person, Tick(0), ids, 0.0).unwrap();
        person.contract_id().unwrap()
    }

    // ── Signature ─────────────────────────────────────────────────────────────

    #[test]
    fn signing_activates_coverage_and_counts_insuree() {
        let mut m = market();
        let mut ids = IdSequences::new();
        let mut p = insured(1);
        let event = m.sign_contract(PlanId(1), &mut p, Tick(0), &mut ids, 1234.0).unwrap();

        let cid = p.contract_id().expect("insured must hold a contract");
        assert!(matches!(event, Event::ContractSigned { contract_id, .. } if contract_id == cid));
        assert_eq!(p.prior_plan, Some(PlanId(1)));
        assert_eq!(m.plan(PlanId(1)).unwrap().insurees_this_year, 1);
        assert!(m.insurers[0].active.contains(&cid));
        assert_eq!(m.contracts[&cid].claims_ytd, 0.0);
    }

    #[test]
    fn signing_unknown_plan_fails() {
        let mut m = market();
        let mut ids = IdSequences::new();
        let mut p = insured(1);
        let err = m.sign_contract(PlanId(99), &mut p, Tick(0), &mut ids, 0.0).unwrap_err();
        assert_eq!(err, InvariantViolation::UnknownPlan(PlanId(99)));
        assert_eq!(p.coverage, Coverage::Uninsured);
    }

    // ── Settlement ────────────────────────────────────────────────────────────

    #[test]
    fn settle_moves_money_between_insurer_and_insured() {
        let mut m = market();
        let mut ids = IdSequences::new();
        let mut p = insured(1);
        let cid = signed(&mut m, &mut ids, &mut p);

        let settled = m.settle_claim(cid, 9000.0, &mut p).unwrap();
        assert!((settled.reimbursement - 7000.0).abs() < 1e-9);
        assert!((p.cash - 7000.0).abs() < 1e-9);
        assert!((m.insurers[0].capital - 3000.0).abs() < 1e-9);
        assert_eq!(m.contracts[&cid].claims_ytd, 9000.0);
    }

    #[test]
    fn failed_settlement_changes_nothing() {
        let mut m = market();
        let mut ids = IdSequences::new();
        let mut p = insured(1);
        let cid = signed(&mut m, &mut ids, &mut p);

        assert!(m.settle_claim(cid, -10.0, &mut p).is_err());
        assert!(m.settle_claim(ContractId(77), 10.0, &mut p).is_err());
        assert_eq!(p.cash, 0.0);
        assert_eq!(m.insurers[0].capital, 10_000.0);
        assert_eq!(m.contracts[&cid].claims_ytd, 0.0);
    }

    // ── Repricing ─────────────────────────────────────────────────────────────

    #[test]
    fn live_contract_keeps_terms_through_repricing() {
        let mut m = market();
        let mut ids = IdSequences::new();
        let mut p = insured(1);
        let cid = signed(&mut m, &mut ids, &mut p);
        let signed_terms = m.contracts[&cid].terms;
        m.settle_claim(cid, 9000.0, &mut p).unwrap();

        let policy =
            MinimumDeductiblePolicy { from_year: 2, min_deductible: 1_000.0, stop_loss_margin: 700.0 };
        let events = m.adapt_plan_offers(Year(2), &PremiumBounds::default(), Some(&policy)).unwrap();
        assert!(events.iter().any(|e| matches!(e, Event::PremiumAdjusted { .. })));
        assert!(events.iter().any(|e| matches!(e, Event::DeductibleRaised { .. })));

        let template = m.plan(PlanId(1)).unwrap();
        assert!((template.premium - 7000.0).abs() < 1e-9, "template repriced, got {}", template.premium);
        assert_eq!(template.terms.deductible, 1_000.0, "template takes the floor");

        let contract = &m.contracts[&cid];
        assert_eq!(contract.premium, 5200.0, "live contract keeps its signed premium");
        assert_eq!(contract.terms, signed_terms, "live contract keeps its signed terms");

        let cash_before = p.cash;
        let events = m.collect_premiums(std::slice::from_mut(&mut p));
        assert!(
            matches!(events.as_slice(), [Event::PremiumsCollected { amount, payers: 1, .. }] if (*amount - 100.0).abs() < 1e-9),
            "instalment must come from the signed premium, got {events:?}"
        );
        assert!((cash_before - p.cash - 100.0).abs() < 1e-9);
    }

    // ── Termination ───────────────────────────────────────────────────────────

    #[test]
    fn renewal_closes_contract_and_leaves_insured_pending() {
        let mut m = market();
        let mut ids = IdSequences::new();
        let mut p = insured(1);
        let cid = signed(&mut m, &mut ids, &mut p);

        let event = m.terminate_for_renewal(&mut p).unwrap();
        assert!(matches!(
            event,
            Some(Event::ContractTerminated { reason: TerminationReason::Renewal, .. })
        ));
        assert_eq!(p.coverage, Coverage::PendingRenewal);
        assert!(!m.contracts.contains_key(&cid));
        assert!(m.insurers[0].active.is_empty());
    }

    #[test]
    fn death_folds_reimbursements_into_plan() {
        let mut m = market();
        let mut ids = IdSequences::new();
        let mut p = insured(1);
        let cid = signed(&mut m, &mut ids, &mut p);
        m.settle_claim(cid, 1000.0, &mut p).unwrap();

        m.terminate_on_death(&mut p).unwrap();
        assert_eq!(p.coverage, Coverage::Uninsured);
        assert!((m.plan(PlanId(1)).unwrap().closed_reimbursements - 400.0).abs() < 1e-9);
        assert!(m.contracts.is_empty());
    }

    #[test]
    fn terminating_uninsured_is_a_no_op() {
        let mut m = market();
        let mut p = insured(1);
        assert_eq!(m.terminate_for_renewal(&mut p).unwrap(), None);
        assert_eq!(m.terminate_on_death(&mut p).unwrap(), None);
    }

    // ── Premiums ──────────────────────────────────────────────────────────────

    #[test]
    fn weekly_instalment_is_a_52nd_of_premium() {
        let mut m = market();
        let mut ids = IdSequences::new();
        let mut people = vec![insured(1), insured(2), insured(3)];
        signed(&mut m, &mut ids, &mut people[0]);
        signed(&mut m, &mut ids, &mut people[1]);

        let events = m.collect_premiums(&mut people);
        assert_eq!(
            events,
            vec![Event::PremiumsCollected { insurer_id: InsurerId(1), amount: 200.0, payers: 2 }]
        );
        assert_eq!(people[0].cash, -100.0);
        assert_eq!(people[2].cash, 0.0, "uninsured pays nothing");
        assert_eq!(m.insurers[0].capital, 10_200.0);
    }

    // ── Contract counts ───────────────────────────────────────────────────────

    #[test]
    fn mandatory_requires_exactly_one_contract() {
        let mut m = market();
        let mut ids = IdSequences::new();
        let mut people = vec![insured(1), insured(2)];
        signed(&mut m, &mut ids, &mut people[0]);

        let err = m.check_contract_counts(&people, InsuranceMode::Mandatory).unwrap_err();
        assert_eq!(err, InvariantViolation::ContractCount { insured: InsuredId(2), count: 0 });
        assert!(m.check_contract_counts(&people, InsuranceMode::Voluntary).is_ok());
    }

    #[test]
    fn double_contract_is_a_violation_in_any_mode() {
        let mut m = market();
        let mut ids = IdSequences::new();
        let mut p = insured(1);
        signed(&mut m, &mut ids, &mut p);
        signed(&mut m, &mut ids, &mut p);
        let people = vec![p];
        assert!(matches!(
            m.check_contract_counts(&people, InsuranceMode::Voluntary),
            Err(InvariantViolation::ContractCount { count: 2, .. })
        ));
    }
}
