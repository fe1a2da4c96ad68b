//! # epitree-gillespie
//!
//! Exact stochastic (Gillespie) simulation of SEEIIR and SIR epidemics on a
//! hierarchical population: individuals live in families, families in
//! groups of families, and so on up to the root. Each level has its own
//! contact rate.
//!
//! ```no_run
//! use epitree_core::{SimulationConfig, SimulationEngine};
//! use epitree_gillespie::{GillespieDriver, GridSampler, Trajectory};
//!
//! let config = SimulationConfig::from_json_file("seeiir.json")?;
//! let mut driver = GillespieDriver::new(&config)?;
//! let mut sampler = GridSampler::new(Trajectory::new(), 0.0, config.horizon, 1.0);
//! driver.run(&mut sampler)?;
//! sampler.finish();
//! for row in sampler.into_inner().rows() {
//!     println!("{:?}", row);
//! }
//! # Ok::<(), epitree_core::SimulationError>(())
//! ```

pub mod driver;
pub mod events;
pub mod model;
pub mod rates;
pub mod sampler;
pub mod tree;

pub use driver::GillespieDriver;
pub use events::{ExogenousEvent, ExogenousEventQueue, ExogenousKind};
pub use model::Epidemic;
pub use rates::{RateTable, Transition, TransitionKind};
pub use sampler::{GridSampler, Trajectory};
pub use tree::{HierarchyNode, InfectionTally, NodeId, PopulationTree};
