use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InsuredId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InsurerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Year(pub u32);

/// Simulation time in weeks (1 unit = 1 simulated week).
/// Years are 52 ticks long; tick 0 is the first week of year 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tick(pub u64);

impl Tick {
    pub const WEEKS_PER_YEAR: u64 = 52;

    pub fn year_start(year: Year) -> Self {
        Tick((year.0 as u64 - 1) * Self::WEEKS_PER_YEAR)
    }

    pub fn year_end(year: Year) -> Self {
        Tick(year.0 as u64 * Self::WEEKS_PER_YEAR - 1)
    }

    pub fn year(self) -> Year {
        Year((self.0 / Self::WEEKS_PER_YEAR) as u32 + 1)
    }

    pub fn offset(self, weeks: u64) -> Self {
        Tick(self.0 + weeks)
    }
}

/// Monotonic id generators owned by the simulation. Replaces process-wide
/// counters so two simulations in the same process never share id state.
#[derive(Debug, Default, Clone)]
pub struct IdSequences {
    next_insured: u64,
    next_contract: u64,
}

impl IdSequences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_insured(&mut self) -> InsuredId {
        self.next_insured += 1;
        InsuredId(self.next_insured)
    }

    pub fn next_contract(&mut self) -> ContractId {
        self.next_contract += 1;
        ContractId(self.next_contract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_boundaries_are_52_weeks_apart() {
        assert_eq!(Tick::year_start(Year(1)), Tick(0));
        assert_eq!(Tick::year_end(Year(1)), Tick(51));
        assert_eq!(Tick::year_start(Year(3)), Tick(104));
    }

    #[test]
    fn tick_maps_back_to_its_year() {
        assert_eq!(Tick(0).year(), Year(1));
        assert_eq!(Tick(51).year(), Year(1));
        assert_eq!(Tick(52).year(), Year(2));
        assert_eq!(Tick::year_start(Tick(104).year()), Tick(104));
    }

    #[test]
    fn id_sequences_are_monotonic_and_independent() {
        let mut ids = IdSequences::new();
        assert_eq!(ids.next_insured(), InsuredId(1));
        assert_eq!(ids.next_insured(), InsuredId(2));
        assert_eq!(ids.next_contract(), ContractId(1));
        assert_eq!(ids.next_insured(), InsuredId(3));
    }
}
