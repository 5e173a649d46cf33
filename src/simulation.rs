use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, LogNormal};
use tracing::{error, info, warn};

use crate::care::CareModel;
use crate::config::SimulationConfig;
use crate::error::{ConfigError, SimError};
use crate::events::{Event, EventLog, SimEvent};
use crate::insured::{Coverage, Insured};
use crate::market::Market;
use crate::plan::Sex;
use crate::schedule::{Phase, Schedule};
use crate::selection::{InsuranceMode, SelectionRequest, select_best_eligible_plan};
use crate::types::{IdSequences, Tick, Year};

pub struct Simulation {
    schedule: Schedule,
    /// Completed events in dispatch order.
    pub log: EventLog,
    rng: ChaCha20Rng,
    pub market: Market,
    /// Population arena. A death reuses the slot for the newcomer.
    pub insureds: Vec<Insured>,
    ids: IdSequences,
    care: CareModel,
    config: SimulationConfig,
}

impl Simulation {
    /// Validate `config` and set up the initial population. No tick runs here.
    pub fn from_config(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let market = Market::new(config.build_insurers()?);
        let care = CareModel::new(&config.care)?;
        let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
        let mut ids = IdSequences::new();

        let pop = &config.population;
        let income = LogNormal::new(pop.income_mu, pop.income_sigma).map_err(|e| {
            ConfigError::InvalidParameter { field: "population.income_sigma", reason: e.to_string() }
        })?;
        let insureds = (0..pop.size)
            .map(|_| {
                let years = rng.random_range(pop.min_age..=pop.max_age) as u64;
                let age_weeks = years * Tick::WEEKS_PER_YEAR + rng.random_range(0..Tick::WEEKS_PER_YEAR);
                let sex = if rng.random_bool(pop.female_share) { Sex::Female } else { Sex::Male };
                let weekly_income = income.sample(&mut rng);
                let cash = weekly_income * pop.initial_cash_weeks;
                Insured::new(ids.next_insured(), age_weeks, sex, weekly_income, cash)
            })
            .collect();

        Ok(Simulation {
            schedule: Schedule::standard(Tick::year_end(Year(config.years))),
            log: EventLog::new(),
            rng,
            market,
            insureds,
            ids,
            care,
            config,
        })
    }

    /// Override the tick horizon (used in tests).
    pub fn until(mut self, tick: Tick) -> Self {
        self.schedule = Schedule::standard(tick);
        self
    }

    fn record(&mut self, tick: Tick, event: Event) {
        self.log.push(SimEvent { tick, event });
    }

    /// Run to the horizon. The first configuration error or invariant
    /// violation stops the run and is returned; state is left as it was at
    /// the failure.
    pub fn run(&mut self) -> Result<(), SimError> {
        let population = self.insureds.len();
        self.record(Tick(0), Event::SimulationStart { year_start: Year(1), population });

        while let Some((tick, phase)) = self.schedule.next() {
            if let Err(e) = self.dispatch(tick, phase) {
                error!(tick = tick.0, ?phase, "simulation aborted: {e}");
                return Err(e);
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, tick: Tick, phase: Phase) -> Result<(), SimError> {
        match phase {
            Phase::YearStart => {
                self.handle_year_start(tick);
                Ok(())
            }
            Phase::ResetInsureds => self.handle_reset_insureds(tick),
            Phase::AdaptPlanOffer => self.handle_adapt_plan_offer(tick),
            Phase::ContractRenewal => self.handle_contract_renewal(tick),
            Phase::FallIll => {
                self.handle_fall_ill();
                Ok(())
            }
            Phase::SeekCare => self.handle_seek_care(tick),
            Phase::YearEnd => {
                self.handle_year_end(tick);
                Ok(())
            }
        }
    }

    /// Slot visiting order for one phase.
    fn agent_order(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.insureds.len()).collect();
        if self.config.shuffle_agents {
            order.shuffle(&mut self.rng);
        }
        order
    }

    fn handle_year_start(&mut self, tick: Tick) {
        let year = tick.year();
        info!(year = year.0, "year start");
        self.record(tick, Event::YearStart { year });
    }

    fn handle_reset_insureds(&mut self, tick: Tick) -> Result<(), SimError> {
        for slot in self.agent_order() {
            self.insureds[slot].on_week_start();
            if self.rng.random_bool(self.config.weekly_mortality) {
                self.handle_death(slot, tick)?;
            }
        }
        let events = self.market.collect_premiums(&mut self.insureds);
        for e in events {
            self.record(tick, e);
        }
        Ok(())
    }

    /// Tear down the dead insured's contract, put a newcomer in the slot and
    /// let them choose a plan straight away.
    fn handle_death(&mut self, slot: usize, tick: Tick) -> Result<(), SimError> {
        let dead_id = self.insureds[slot].id;
        let age_years = self.insureds[slot].age_years();
        self.record(tick, Event::InsuredDied { insured_id: dead_id, age_years });
        if let Some(e) = self.market.terminate_on_death(&mut self.insureds[slot])? {
            self.record(tick, e);
        }

        let successor =
            self.insureds[slot].successor(self.ids.next_insured(), self.config.population.replacement_age);
        let new_id = successor.id;
        self.insureds[slot] = successor;
        self.record(tick, Event::InsuredJoined { insured_id: new_id, replaces: Some(dead_id) });

        self.choose_plan(slot, tick)
    }

    fn handle_adapt_plan_offer(&mut self, tick: Tick) -> Result<(), SimError> {
        let policy = self.config.minimum_deductible;
        let events =
            self.market.adapt_plan_offers(tick.year(), &self.config.premium_bounds, policy.as_ref())?;
        for e in events {
            if let Event::PremiumAdjusted { plan_id, old, new, insurees, .. } = &e {
                info!(plan = plan_id.0, old, new, insurees, "premium adjusted");
            }
            self.record(tick, e);
        }
        Ok(())
    }

    fn handle_contract_renewal(&mut self, tick: Tick) -> Result<(), SimError> {
        for slot in self.agent_order() {
            if let Some(e) = self.market.terminate_for_renewal(&mut self.insureds[slot])? {
                self.record(tick, e);
            }
            self.choose_plan(slot, tick)?;
        }
        self.market.check_contract_counts(&self.insureds, self.config.mode)?;
        Ok(())
    }

    /// Plan selection for the insured in `slot`, signing the winner.
    fn choose_plan(&mut self, slot: usize, tick: Tick) -> Result<(), SimError> {
        let mode = self.config.mode;
        let insured = &self.insureds[slot];
        let request = SelectionRequest {
            projected_annual_claim: insured
                .projected_annual_claim(self.config.population.initial_expected_expenditure),
            switching_cost_multiplier: self.config.switching_cost_multiplier,
            prior_plan: insured.prior_plan,
            affordability_limit: insured.affordability_limit(),
            mode,
        };

        let eligible = self.market.eligible_plans(insured.age_years(), insured.sex);
        if eligible.is_empty() && mode == InsuranceMode::Mandatory {
            return Err(ConfigError::NoEligiblePlan(insured.id).into());
        }
        let choice = select_best_eligible_plan(eligible, &request)?;

        match choice {
            Some(choice) => {
                let event = self.market.sign_contract(
                    choice.plan_id,
                    &mut self.insureds[slot],
                    tick,
                    &mut self.ids,
                    choice.net_cost,
                )?;
                self.record(tick, event);
            }
            None => {
                let insured = &mut self.insureds[slot];
                insured.coverage = Coverage::Uninsured;
                insured.prior_plan = None;
                let insured_id = insured.id;
                warn!(insured = insured_id.0, "no plan worth buying; staying uninsured");
                self.record(
                    tick,
                    Event::RemainedUninsured {
                        insured_id,
                        projected_claim: request.projected_annual_claim,
                    },
                );
            }
        }
        Ok(())
    }

    fn handle_fall_ill(&mut self) {
        for slot in self.agent_order() {
            let episodes = self.care.draw_episodes(&mut self.rng);
            self.insureds[slot].pending_episodes.extend(episodes);
        }
    }

    /// Treat every pending episode. The bill is capped at what the insured
    /// can afford out of pocket, then the reimbursable part goes to the insurer.
    fn handle_seek_care(&mut self, tick: Tick) -> Result<(), SimError> {
        for slot in self.agent_order() {
            let episodes = std::mem::take(&mut self.insureds[slot].pending_episodes);
            for episode in episodes {
                let (treatment, list_price) = self.care.choose_treatment(&episode, &mut self.rng);
                let insured = &self.insureds[slot];
                let allowance = insured.care_allowance();
                let contract = insured
                    .contract_id()
                    .filter(|_| treatment.is_reimbursable())
                    .and_then(|id| self.market.contracts.get(&id));

                let bill = match contract {
                    Some(c) => c.max_affordable_claim(allowance).cap(list_price),
                    None => list_price.min(allowance),
                };
                let contract_id = contract.map(|c| c.id);
                let insured_id = insured.id;

                let insured = &mut self.insureds[slot];
                insured.pay(bill);
                let mut out_of_pocket = bill;
                if let Some(contract_id) = contract_id
                    && bill > 0.0
                {
                    let settled = self.market.settle_claim(contract_id, bill, insured)?;
                    out_of_pocket -= settled.reimbursement;
                    self.record(
                        tick,
                        Event::ClaimSettled {
                            contract_id,
                            insured_id,
                            insurer_id: settled.insurer_id,
                            claim: bill,
                            reimbursement: settled.reimbursement,
                            claims_ytd: settled.claims_ytd,
                        },
                    );
                }
                self.insureds[slot].record_care(bill, out_of_pocket);
                self.record(tick, Event::CareReceived { insured_id, treatment, list_price, bill });
            }
        }
        Ok(())
    }

    fn handle_year_end(&mut self, tick: Tick) {
        let year = tick.year();
        for insured in &mut self.insureds {
            insured.on_year_end();
        }
        let insured = self.insureds.iter().filter(|i| i.is_insured()).count();
        let uninsured = self.insureds.len() - insured;
        let capital: f64 = self.market.insurers.iter().map(|i| i.capital).sum();
        info!(year = year.0, insured, uninsured, capital, "year end");
        self.record(tick, Event::YearEnd { year, insured, uninsured });
    }
}
