//! # epitree-core
//!
//! Shared data model for stochastic epidemic simulation on a population
//! hierarchy (individuals grouped in families, families in neighbourhoods, and
//! so on up to the whole population).
//!
//! This crate holds the types every engine and binding agrees on:
//! compartments and their counts, rate constants, the hierarchy shape,
//! exogenous input series, root snapshots, configuration loading and the error
//! taxonomy. Engines implement [`SimulationEngine`] and report through an
//! [`Observer`].

pub mod config;
pub mod error;
pub mod series;
pub mod types;

pub use config::{EpidemicModel, RateUpdate, SimulationConfig};
pub use error::{Result, SimulationError};
pub use types::{
    Compartment, CompartmentCounts, HierarchyConfig, ImportedCases, LevelDetail, LevelStats,
    OffspringSampler, OffspringSpec, RateChange, RateConstants, Snapshot, StageConvention,
};

/// Sink for the aggregate state of a running simulation.
///
/// `observe` is called synchronously from the simulation loop with the state
/// that held up to `time`, i.e. before the event occurring at `time` is
/// applied. The last notification of a run that reaches its horizon is
/// made at the horizon itself. Implementations only read the snapshot.
pub trait Observer {
    fn observe(&mut self, time: f64, snapshot: &Snapshot);
}

impl<F> Observer for F
where
    F: FnMut(f64, &Snapshot),
{
    fn observe(&mut self, time: f64, snapshot: &Snapshot) {
        self(time, snapshot)
    }
}

/// Observer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn observe(&mut self, _time: f64, _snapshot: &Snapshot) {}
}

/// Whether an engine can keep stepping
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
}

/// Common interface of simulation engines.
///
/// Engines own their state and random source; `reset` starts a new
/// independent run without rebuilding the population structure.
pub trait SimulationEngine {
    /// Return to the initial all-susceptible state at time 0
    fn reset(&mut self);

    /// Advance by one event, reporting to `observer`
    fn step(&mut self, observer: &mut dyn Observer) -> Result<RunState>;

    /// Step until the engine stops
    fn run(&mut self, observer: &mut dyn Observer) -> Result<()> {
        while self.step(observer)? == RunState::Running {}
        Ok(())
    }

    /// Current simulated time
    fn time(&self) -> f64;

    /// Aggregate state at the root
    fn snapshot(&self) -> Snapshot;

    /// Compartment names in snapshot order
    fn compartments(&self) -> Vec<String> {
        Compartment::ALL
            .iter()
            .map(|c| c.short_name().to_string())
            .collect()
    }
}
