pub mod compartment;
pub mod events;
pub mod hierarchy;
pub mod rates;
pub mod snapshot;

pub use compartment::{Compartment, CompartmentCounts};
pub use events::{ImportedCases, RateChange};
pub use hierarchy::{HierarchyConfig, OffspringSampler, OffspringSpec};
pub use rates::{RateConstants, StageConvention};
pub use snapshot::{LevelDetail, LevelStats, Snapshot};
