use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::Serialize;

use crate::types::Tick;

/// The recurring steps of a simulated week. Within one tick, higher
/// priority runs first, and every agent finishes a phase before the next
/// phase starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    YearStart,
    /// Income, premium instalments, ageing, mortality.
    ResetInsureds,
    /// Premium repricing and regulatory deductible floor.
    AdaptPlanOffer,
    ContractRenewal,
    FallIll,
    SeekCare,
    YearEnd,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::YearStart,
        Phase::ResetInsureds,
        Phase::AdaptPlanOffer,
        Phase::ContractRenewal,
        Phase::FallIll,
        Phase::SeekCare,
        Phase::YearEnd,
    ];

    pub fn priority(self) -> u8 {
        match self {
            Phase::YearStart => 100,
            Phase::ResetInsureds => 99,
            Phase::AdaptPlanOffer => 95,
            Phase::ContractRenewal => 90,
            Phase::FallIll => 80,
            Phase::SeekCare => 70,
            Phase::YearEnd => 0,
        }
    }

    pub fn start(self) -> Tick {
        match self {
            // Repricing needs a full year of experience.
            Phase::AdaptPlanOffer => Tick(Tick::WEEKS_PER_YEAR),
            Phase::YearEnd => Tick(Tick::WEEKS_PER_YEAR - 1),
            _ => Tick(0),
        }
    }

    pub fn interval(self) -> u64 {
        match self {
            Phase::ResetInsureds | Phase::FallIll | Phase::SeekCare => 1,
            Phase::YearStart | Phase::AdaptPlanOffer | Phase::ContractRenewal | Phase::YearEnd => {
                Tick::WEEKS_PER_YEAR
            }
        }
    }
}

/// Queue entry. Ordering: tick ascending, then priority descending, then
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledPhase {
    pub tick: Tick,
    pub priority: u8,
    seq: u64,
    pub phase: Phase,
    interval: Option<u64>,
}

impl Ord for ScheduledPhase {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tick
            .cmp(&other.tick)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ScheduledPhase {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority-ordered phase queue. Recurring phases re-enqueue themselves
/// after dispatch until the horizon is passed.
#[derive(Debug, Clone)]
pub struct Schedule {
    queue: BinaryHeap<Reverse<ScheduledPhase>>,
    next_seq: u64,
    /// Last tick that may be dispatched.
    horizon: Tick,
}

impl Schedule {
    pub fn new(horizon: Tick) -> Self {
        Schedule { queue: BinaryHeap::new(), next_seq: 0, horizon }
    }

    /// Every phase at its standard start, priority and interval.
    pub fn standard(horizon: Tick) -> Self {
        let mut schedule = Schedule::new(horizon);
        for phase in Phase::ALL {
            schedule.register(phase, phase.start(), Some(phase.interval()));
        }
        schedule
    }

    pub fn register(&mut self, phase: Phase, start: Tick, interval: Option<u64>) {
        self.push(phase, start, interval);
    }

    fn push(&mut self, phase: Phase, tick: Tick, interval: Option<u64>) {
        if tick > self.horizon {
            return;
        }
        let entry = ScheduledPhase { tick, priority: phase.priority(), seq: self.next_seq, phase, interval };
        self.next_seq += 1;
        self.queue.push(Reverse(entry));
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Iterator for Schedule {
    type Item = (Tick, Phase);

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(entry) = self.queue.pop()?;
        if let Some(interval) = entry.interval.filter(|&i| i > 0) {
            self.push(entry.phase, entry.tick.offset(interval), Some(interval));
        }
        Some((entry.tick, entry.phase))
    }
}
