//! Epidemic model variants run on the hierarchy.
//!
//! The variant is fixed when the driver is built; the simulation loop matches
//! on it to pick the transition set and the stage rates.

use epitree_core::{Compartment, EpidemicModel, RateConstants, StageConvention};

use crate::tree::HierarchyNode;

const SEEIIR_PROGRESSIONS: [(Compartment, Compartment); 4] = [
    (Compartment::Exposed1, Compartment::Exposed2),
    (Compartment::Exposed2, Compartment::Infectious1),
    (Compartment::Infectious1, Compartment::Infectious2),
    (Compartment::Infectious2, Compartment::Recovered),
];

const SIR_PROGRESSIONS: [(Compartment, Compartment); 1] =
    [(Compartment::Infectious1, Compartment::Recovered)];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Epidemic {
    model: EpidemicModel,
    convention: StageConvention,
}

impl Epidemic {
    pub fn new(model: EpidemicModel, convention: StageConvention) -> Self {
        Self { model, convention }
    }

    pub fn model(&self) -> EpidemicModel {
        self.model
    }

    /// Compartment a newly infected susceptible enters
    pub fn infection_target(&self) -> Compartment {
        match self.model {
            EpidemicModel::Seeiir => Compartment::Exposed1,
            EpidemicModel::Sir => Compartment::Infectious1,
        }
    }

    /// Population-wide stage transitions, in rate-table order
    pub fn progressions(&self) -> &'static [(Compartment, Compartment)] {
        match self.model {
            EpidemicModel::Seeiir => &SEEIIR_PROGRESSIONS,
            EpidemicModel::Sir => &SIR_PROGRESSIONS,
        }
    }

    /// Per-individual rate of leaving `from` through a stage transition
    pub fn stage_rate(&self, from: Compartment, rates: &RateConstants) -> f64 {
        let factor = self.convention.stage_factor();
        match (self.model, from) {
            (EpidemicModel::Seeiir, Compartment::Exposed1) => rates.sigma1 * factor,
            (EpidemicModel::Seeiir, Compartment::Exposed2) => rates.sigma2 * factor,
            (EpidemicModel::Seeiir, Compartment::Infectious1) => rates.gamma1 * factor,
            (EpidemicModel::Seeiir, Compartment::Infectious2) => rates.gamma2 * factor,
            // A single infectious stage leaves at gamma1 regardless of the convention
            (EpidemicModel::Sir, Compartment::Infectious1) => rates.gamma1,
            _ => 0.0,
        }
    }

    /// Infection propensity inside one node.
    ///
    /// Families mix fully (`S * beta * I`); above the family level contacts
    /// are normalized by `N - 1`.
    pub fn infection_propensity(&self, node: &HierarchyNode, rates: &RateConstants) -> f64 {
        let counts = node.counts();
        let norm = if node.level() == 1 {
            1.0
        } else if node.population() > 1 {
            1.0 / (node.population() - 1) as f64
        } else {
            0.0
        };
        counts.s as f64 * rates.beta_at(node.level()) * counts.infectious() as f64 * norm
    }
}

impl Default for Epidemic {
    fn default() -> Self {
        Self::new(EpidemicModel::default(), StageConvention::default())
    }
}
