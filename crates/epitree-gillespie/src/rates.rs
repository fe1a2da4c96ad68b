//! Propensities of every possible next event and their cumulative sums.
//!
//! Slot layout: one infection slot per roster entry (in roster order),
//! followed by one slot per population-wide stage transition.

use epitree_core::{Compartment, RateConstants, Result, SimulationError};

use crate::model::Epidemic;
use crate::tree::{NodeId, PopulationTree};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    /// A susceptible below `node` becomes infected
    Infection,
    /// A uniformly chosen member of `from` moves to `to`
    Progression { from: Compartment, to: Compartment },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub kind: TransitionKind,
    /// Node the event happens in (the root for progressions)
    pub node: NodeId,
    pub rate: f64,
}

#[derive(Clone, Debug, Default)]
pub struct RateTable {
    transitions: Vec<Transition>,
    // cumulative[0] = 0, cumulative[i + 1] = sum of rates of slots 0..=i
    cumulative: Vec<f64>,
    infection_slots: usize,
    roster_version: Option<u64>,
}

fn clamp_rate(rate: f64, kind: TransitionKind, node: NodeId) -> f64 {
    if rate >= 0.0 {
        rate
    } else {
        log::debug!(
            "Clamped propensity {} of {:?} at node {} to zero",
            rate,
            kind,
            node.index()
        );
        0.0
    }
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn total(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Rebuild every slot from the current tree state
    pub fn recompute_all(&mut self, tree: &PopulationTree, rates: &RateConstants, epidemic: &Epidemic) {
        self.transitions.clear();

        for &id in tree.roster() {
            let rate = epidemic.infection_propensity(tree.node(id), rates);
            self.transitions.push(Transition {
                kind: TransitionKind::Infection,
                node: id,
                rate: clamp_rate(rate, TransitionKind::Infection, id),
            });
        }
        self.infection_slots = self.transitions.len();

        let root = tree.root();
        for &(from, to) in epidemic.progressions() {
            let kind = TransitionKind::Progression { from, to };
            let rate = tree.root_counts().get(from) as f64 * epidemic.stage_rate(from, rates);
            self.transitions.push(Transition {
                kind,
                node: root,
                rate: clamp_rate(rate, kind, root),
            });
        }

        self.cumulative.clear();
        self.cumulative.push(0.0);
        self.accumulate_from(0);
        self.roster_version = Some(tree.roster_version());
    }

    /// Bring the table up to date after an event inside family `leaf`.
    ///
    /// Only the roster slots on the path from `leaf` to the root and the
    /// progression slots can have changed, unless the roster itself changed,
    /// in which case the table is rebuilt.
    pub fn refresh_after(
        &mut self,
        tree: &PopulationTree,
        rates: &RateConstants,
        epidemic: &Epidemic,
        leaf: NodeId,
    ) {
        if self.roster_version != Some(tree.roster_version()) {
            self.recompute_all(tree, rates, epidemic);
            return;
        }

        let mut first_touched = self.infection_slots;
        for id in tree.ancestors(leaf) {
            if let Some(slot) = tree.node(id).roster_position() {
                let rate = epidemic.infection_propensity(tree.node(id), rates);
                self.transitions[slot].rate = clamp_rate(rate, TransitionKind::Infection, id);
                first_touched = first_touched.min(slot);
            }
        }

        let root = tree.root();
        for (j, &(from, _)) in epidemic.progressions().iter().enumerate() {
            let slot = self.infection_slots + j;
            let rate = tree.root_counts().get(from) as f64 * epidemic.stage_rate(from, rates);
            self.transitions[slot].rate = clamp_rate(rate, self.transitions[slot].kind, root);
        }

        self.accumulate_from(first_touched);
    }

    // Recompute cumulative[i + 1] for every slot i >= start, summing in slot
    // order so that partial and full rebuilds give identical values.
    fn accumulate_from(&mut self, start: usize) {
        self.cumulative.truncate(start + 1);
        let mut sum = self.cumulative[start];
        for transition in &self.transitions[start..] {
            sum += transition.rate;
            self.cumulative.push(sum);
        }
    }

    /// Index of the slot `i` with `cumulative[i] < u <= cumulative[i + 1]`
    pub fn select_index(&self, u: f64) -> Result<usize> {
        let total = self.total();
        if !(u > 0.0 && u <= total) {
            return Err(SimulationError::invariant(format!(
                "selector {} outside (0, {}]",
                u, total
            )));
        }
        let index = self.cumulative[1..].partition_point(|&c| c < u);
        if index >= self.transitions.len() {
            return Err(SimulationError::invariant(format!(
                "selector {} fell past the last transition",
                u
            )));
        }
        Ok(index)
    }

    /// Transition whose cumulative interval contains `u`
    pub fn select(&self, u: f64) -> Result<&Transition> {
        self.select_index(u).map(|i| &self.transitions[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epitree_core::{EpidemicModel, StageConvention};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn seeiir() -> Epidemic {
        Epidemic::new(EpidemicModel::Seeiir, StageConvention::PerStage)
    }

    #[test]
    fn test_single_family_total_rate() {
        let mut tree = PopulationTree::build(1, |_| 100).unwrap();
        let rates = RateConstants::new(vec![0.1], 0.2, 0.2, 0.1, 0.1);
        let mut rng = StdRng::seed_from_u64(1);
        tree.force_infection(1, &mut rng).unwrap();

        let mut table = RateTable::new();
        table.recompute_all(&tree, &rates, &seeiir());

        let infection: f64 = table
            .transitions()
            .iter()
            .filter(|t| t.kind == TransitionKind::Infection)
            .map(|t| t.rate)
            .sum();
        assert!((infection - 9.9).abs() < 1e-12);
        // Only the occupied I1 stage adds to the infection term
        assert!((table.total() - 10.0).abs() < 1e-12);
        assert_eq!(table.transitions().len(), 5);
        assert_eq!(table.cumulative()[0], 0.0);
    }

    #[test]
    fn test_uninfected_family_contributes_nothing() {
        // Two families of 5
        let mut tree = PopulationTree::build(2, |level| if level == 1 { 5 } else { 2 }).unwrap();
        let family1 = tree.leaves()[0];
        let family2 = tree.leaves()[1];
        tree.apply_transition(0, Compartment::Susceptible, Compartment::Infectious1)
            .unwrap();
        assert_eq!(tree.infected_leaves(), vec![family1]);

        let rates = RateConstants::new(vec![0.5, 0.2], 0.2, 0.2, 0.1, 0.1);
        let mut table = RateTable::new();
        table.recompute_all(&tree, &rates, &seeiir());

        assert!(table.transitions().iter().all(|t| t.node != family2));
        let family_rate = table.transitions()[0].rate;
        assert_eq!(table.transitions()[0].node, family1);
        assert!((family_rate - 4.0 * 0.5).abs() < 1e-12);
        // Root: S = 9, I = 1, N = 10
        let root_rate = table.transitions()[1].rate;
        assert!((root_rate - 9.0 * 0.2 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_select_is_right_closed() {
        let mut tree = PopulationTree::build(1, |_| 10).unwrap();
        let rates = RateConstants::new(vec![1.0], 1.0, 1.0, 2.0, 1.0);
        tree.apply_transition(0, Compartment::Susceptible, Compartment::Infectious1)
            .unwrap();
        let mut table = RateTable::new();
        table.recompute_all(&tree, &rates, &seeiir());

        // Slots: infection 9.0, E1 0, E2 0, I1->I2 2.0, I2 0
        assert_eq!(table.cumulative(), &[0.0, 9.0, 9.0, 9.0, 11.0, 11.0]);
        assert_eq!(table.select_index(9.0).unwrap(), 0);
        assert_eq!(table.select_index(1e-9).unwrap(), 0);
        assert_eq!(table.select_index(9.0 + 1e-9).unwrap(), 3);
        assert_eq!(table.select_index(11.0).unwrap(), 3);
        assert!(table.select_index(0.0).is_err());
        assert!(table.select_index(11.5).is_err());
        assert_eq!(
            table.select(10.0).unwrap().kind,
            TransitionKind::Progression {
                from: Compartment::Infectious1,
                to: Compartment::Infectious2
            }
        );
    }

    #[test]
    fn test_negative_rates_are_clamped() {
        let mut tree = PopulationTree::build(1, |_| 4).unwrap();
        let rates = RateConstants::new(vec![0.3], -0.5, 0.2, 0.1, 0.1);
        tree.apply_transition(0, Compartment::Susceptible, Compartment::Exposed1)
            .unwrap();
        let mut table = RateTable::new();
        table.recompute_all(&tree, &rates, &seeiir());
        assert!(table.transitions().iter().all(|t| t.rate >= 0.0));
        assert!(table.cumulative().windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(table.total(), 0.0);
    }

    #[test]
    fn test_incremental_refresh_matches_full_rebuild() {
        let mut tree = PopulationTree::build(3, |level| if level == 1 { 4 } else { 3 }).unwrap();
        let rates = RateConstants::new(vec![0.6, 0.1, 0.01], 0.3, 0.3, 0.2, 0.2);
        let epidemic = seeiir();
        let mut rng = StdRng::seed_from_u64(17);
        tree.force_infection(2, &mut rng).unwrap();

        let mut incremental = RateTable::new();
        incremental.recompute_all(&tree, &rates, &epidemic);

        for _ in 0..300 {
            let total = incremental.total();
            if total == 0.0 {
                break;
            }
            let u = (1.0 - rng.gen::<f64>()) * total;
            let transition = *incremental.select(u).unwrap();
            let leaf = match transition.kind {
                TransitionKind::Infection => {
                    let s = tree.node(transition.node).counts().s;
                    let k = rng.gen_range(0..s);
                    tree.infect_within(transition.node, k, epidemic.infection_target())
                        .unwrap()
                }
                TransitionKind::Progression { from, to } => {
                    tree.advance(from, to, &mut rng).unwrap()
                }
            };
            incremental.refresh_after(&tree, &rates, &epidemic, leaf);

            let mut full = RateTable::new();
            full.recompute_all(&tree, &rates, &epidemic);
            assert_eq!(incremental.transitions(), full.transitions());
            assert_eq!(incremental.cumulative(), full.cumulative());
        }
    }
}
