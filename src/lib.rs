pub mod analysis;
pub mod care;
pub mod config;
pub mod contract;
pub mod cost_sharing;
pub mod error;
pub mod events;
pub mod insured;
pub mod insurer;
pub mod market;
pub mod plan;
pub mod premium;
pub mod schedule;
pub mod selection;
pub mod simulation;
pub mod types;
