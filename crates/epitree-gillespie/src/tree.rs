//! Arena-backed population hierarchy with flat per-compartment member lists.
//!
//! Level-1 nodes (families) are the lowest stored unit; individuals exist only
//! as entries in the flat lists, each entry naming the family the individual
//! belongs to. Every node keeps the compartment counts of its subtree, so the
//! root always holds the population totals.

use std::collections::HashMap;

use epitree_core::{
    Compartment, CompartmentCounts, HierarchyConfig, LevelDetail, LevelStats, RateConstants,
    Result, SimulationError, Snapshot,
};
use rand::Rng;

/// Stable index of a node in the tree arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct HierarchyNode {
    level: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    direct_children: u32,
    population: u64,
    counts: CompartmentCounts,
    first_susceptible: usize,
    level_position: usize,
    roster_position: Option<usize>,
}

impl HierarchyNode {
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Offspring count drawn when the tree was built (individuals for a family)
    pub fn direct_children(&self) -> u32 {
        self.direct_children
    }

    pub fn population(&self) -> u64 {
        self.population
    }

    pub fn counts(&self) -> &CompartmentCounts {
        &self.counts
    }

    /// Offset of this node's first susceptible in the flat S list
    pub fn first_susceptible(&self) -> usize {
        self.first_susceptible
    }

    pub fn level_position(&self) -> usize {
        self.level_position
    }

    pub fn roster_position(&self) -> Option<usize> {
        self.roster_position
    }
}

/// Cumulative per-run counters kept alongside the tree
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfectionTally {
    pub imported: u64,
    pub forcibly_recovered: u64,
    pub exposed_accumulated: u64,
    /// Infections attributed to each level, indexed by level (slot 0 unused)
    pub by_level: Vec<u64>,
}

#[derive(Clone, Debug)]
pub struct PopulationTree {
    nodes: Vec<HierarchyNode>,
    root: NodeId,
    levels: u32,
    // level_nodes[l] lists the nodes of level l in depth-first order
    level_nodes: Vec<Vec<NodeId>>,
    // Member lists for S, E1, E2, I1, I2 (R is not listed)
    lists: [Vec<NodeId>; 5],
    forced_recovered: Vec<NodeId>,
    roster: Vec<NodeId>,
    roster_version: u64,
    tally: InfectionTally,
}

fn is_allowed_move(from: Compartment, to: Compartment) -> bool {
    use Compartment::*;
    matches!(
        (from, to),
        (Susceptible, Exposed1)
            | (Exposed1, Exposed2)
            | (Exposed2, Infectious1)
            | (Infectious1, Infectious2)
            | (Infectious2, Recovered)
            | (Susceptible, Infectious1)
            | (Infectious1, Recovered)
            | (Susceptible, Recovered)
    )
}

impl PopulationTree {
    /// Build a tree with `levels` stored levels.
    ///
    /// `offspring(level)` is called once per node in depth-first preorder and
    /// gives the number of level-`level - 1` children (individuals for a
    /// family). The tree starts all susceptible.
    pub fn build<F>(levels: u32, mut offspring: F) -> Result<Self>
    where
        F: FnMut(u32) -> u32,
    {
        if levels == 0 {
            return Err(SimulationError::config("hierarchy needs at least one level"));
        }

        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            levels,
            level_nodes: vec![Vec::new(); levels as usize + 1],
            lists: Default::default(),
            forced_recovered: Vec::new(),
            roster: Vec::new(),
            roster_version: 0,
            tally: InfectionTally::default(),
        };
        tree.root = tree.build_subtree(levels, None, &mut offspring)?;
        tree.reset_to_all_susceptible();

        log::debug!(
            "Built population tree: {} levels, {} nodes, {} individuals",
            levels,
            tree.nodes.len(),
            tree.population()
        );
        Ok(tree)
    }

    /// Build a tree drawing per-level offspring counts from `hierarchy`
    pub fn from_config<R: Rng + ?Sized>(hierarchy: &HierarchyConfig, rng: &mut R) -> Result<Self> {
        hierarchy.validate()?;
        let samplers = hierarchy.samplers()?;
        Self::build(samplers.len() as u32, |level| {
            samplers[level as usize - 1].sample(rng)
        })
    }

    fn build_subtree<F>(
        &mut self,
        level: u32,
        parent: Option<NodeId>,
        offspring: &mut F,
    ) -> Result<NodeId>
    where
        F: FnMut(u32) -> u32,
    {
        let id = NodeId(self.nodes.len());
        let m = offspring(level);
        if m == 0 {
            return Err(SimulationError::config(format!(
                "node at level {} drew zero offspring",
                level
            )));
        }

        let level_nodes = &mut self.level_nodes[level as usize];
        self.nodes.push(HierarchyNode {
            level,
            parent,
            children: Vec::new(),
            direct_children: m,
            population: 0,
            counts: CompartmentCounts::default(),
            first_susceptible: 0,
            level_position: level_nodes.len(),
            roster_position: None,
        });
        level_nodes.push(id);

        if level > 1 {
            let mut children = Vec::with_capacity(m as usize);
            for _ in 0..m {
                children.push(self.build_subtree(level - 1, Some(id), offspring)?);
            }
            self.nodes[id.0].children = children;
        }
        Ok(id)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &HierarchyNode {
        &self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Nodes of `level` in depth-first order (empty for unknown levels)
    pub fn level_nodes(&self, level: u32) -> &[NodeId] {
        self.level_nodes
            .get(level as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn leaves(&self) -> &[NodeId] {
        self.level_nodes(1)
    }

    pub fn population(&self) -> u64 {
        self.nodes[self.root.0].population
    }

    pub fn root_counts(&self) -> &CompartmentCounts {
        &self.nodes[self.root.0].counts
    }

    /// Member list of a compartment; R is not listed and yields an empty slice
    pub fn members(&self, compartment: Compartment) -> &[NodeId] {
        match compartment.list_index() {
            Some(i) => &self.lists[i],
            None => &[],
        }
    }

    pub fn forced_recovered(&self) -> &[NodeId] {
        &self.forced_recovered
    }

    /// Nodes at any level with at least one infectious individual
    pub fn roster(&self) -> &[NodeId] {
        &self.roster
    }

    /// Bumped whenever roster membership changes
    pub fn roster_version(&self) -> u64 {
        self.roster_version
    }

    /// Families with at least one infectious individual, in roster order
    pub fn infected_leaves(&self) -> Vec<NodeId> {
        self.roster
            .iter()
            .copied()
            .filter(|&id| self.nodes[id.0].level == 1)
            .collect()
    }

    pub fn tally(&self) -> &InfectionTally {
        &self.tally
    }

    /// Path from `id` to the root, `id` first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |&current| self.nodes[current.0].parent)
    }

    /// Return every family to all-susceptible and clear the run counters
    pub fn reset_to_all_susceptible(&mut self) {
        for node in &mut self.nodes {
            node.counts = if node.level == 1 {
                CompartmentCounts::all_susceptible(node.direct_children as u64)
            } else {
                CompartmentCounts::default()
            };
        }
        self.forced_recovered.clear();
        self.tally = InfectionTally {
            by_level: vec![0; self.levels as usize + 1],
            ..InfectionTally::default()
        };
        self.recompute_counts();
    }

    /// Rebuild aggregates, member lists and the roster from the family counts
    pub fn recompute_counts(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
        self.roster.clear();
        self.roster_version += 1;

        // Families: fill the member lists in depth-first family order
        for &leaf in &self.level_nodes[1] {
            let node = &mut self.nodes[leaf.0];
            node.population = node.direct_children as u64;
            node.first_susceptible = self.lists[0].len();
            for (i, list) in self.lists.iter_mut().enumerate() {
                let count = node.counts.get(Compartment::ALL[i]);
                list.extend(std::iter::repeat(leaf).take(count as usize));
            }
            node.roster_position = if node.counts.infectious() > 0 {
                self.roster.push(leaf);
                Some(self.roster.len() - 1)
            } else {
                None
            };
        }

        // Upper levels: children are already up to date
        for level in 2..=self.levels as usize {
            let mut offset = 0;
            for &id in &self.level_nodes[level] {
                let mut counts = CompartmentCounts::default();
                let mut population = 0;
                for &child in &self.nodes[id.0].children {
                    counts.add(&self.nodes[child.0].counts);
                    population += self.nodes[child.0].population;
                }

                let node = &mut self.nodes[id.0];
                node.counts = counts;
                node.population = population;
                node.first_susceptible = offset;
                offset += counts.s as usize;
                node.roster_position = if counts.infectious() > 0 {
                    self.roster.push(id);
                    Some(self.roster.len() - 1)
                } else {
                    None
                };
            }
        }
    }

    /// Move the individual at `position` of the `from` list to `to`.
    ///
    /// Returns the family the individual belongs to.
    pub fn apply_transition(
        &mut self,
        position: usize,
        from: Compartment,
        to: Compartment,
    ) -> Result<NodeId> {
        if !is_allowed_move(from, to) {
            return Err(SimulationError::invariant(format!(
                "transition {} -> {} is not allowed",
                from, to
            )));
        }
        let from_index = from
            .list_index()
            .ok_or_else(|| SimulationError::invariant(format!("{} has no member list", from)))?;
        let available = self.lists[from_index].len();
        if position >= available {
            return Err(SimulationError::invariant(format!(
                "position {} out of range for {} list of length {}",
                position, from, available
            )));
        }

        let leaf = self.lists[from_index].remove(position);
        if let Some(to_index) = to.list_index() {
            self.lists[to_index].push(leaf);
        }
        self.cascade(leaf, from, to)?;
        if from == Compartment::Susceptible {
            self.reindex_after_susceptible_removal(leaf);
        }
        Ok(leaf)
    }

    // Move one count from `from` to `to` on the path leaf -> root, keeping the
    // roster in step with each node's infectious count.
    fn cascade(&mut self, leaf: NodeId, from: Compartment, to: Compartment) -> Result<()> {
        let mut current = Some(leaf);
        while let Some(id) = current {
            let node = &mut self.nodes[id.0];
            let before = node.counts.infectious();
            let from_count = node.counts.get_mut(from);
            *from_count = from_count.checked_sub(1).ok_or_else(|| {
                SimulationError::invariant(format!(
                    "node {} has no {} individual to move",
                    id.0, from
                ))
            })?;
            *node.counts.get_mut(to) += 1;
            let after = node.counts.infectious();
            current = node.parent;

            if before == 0 && after > 0 {
                self.roster_insert(id);
            } else if before > 0 && after == 0 {
                self.roster_remove(id);
            }
        }
        Ok(())
    }

    fn roster_insert(&mut self, id: NodeId) {
        self.nodes[id.0].roster_position = Some(self.roster.len());
        self.roster.push(id);
        self.roster_version += 1;
    }

    fn roster_remove(&mut self, id: NodeId) {
        if let Some(position) = self.nodes[id.0].roster_position.take() {
            self.roster.remove(position);
            for &later in &self.roster[position..] {
                if let Some(p) = self.nodes[later.0].roster_position.as_mut() {
                    *p -= 1;
                }
            }
            self.roster_version += 1;
        }
    }

    /// Shift the susceptible offsets after one susceptible of `leaf` left the S list
    pub fn reindex_after_susceptible_removal(&mut self, leaf: NodeId) {
        let mut current = Some(leaf);
        while let Some(id) = current {
            let node = &self.nodes[id.0];
            let level = node.level as usize;
            let position = node.level_position;
            current = node.parent;
            for &later in &self.level_nodes[level][position + 1..] {
                self.nodes[later.0].first_susceptible -= 1;
            }
        }
    }

    /// Infect the `k`-th susceptible below `node`, moving it to `to`
    /// (E1 for SEEIIR, I1 for SIR)
    pub fn infect_within(&mut self, node: NodeId, k: u64, to: Compartment) -> Result<NodeId> {
        let target = &self.nodes[node.0];
        if k >= target.counts.s {
            return Err(SimulationError::invariant(format!(
                "susceptible {} requested from node {} holding {}",
                k, node.0, target.counts.s
            )));
        }
        let position = target.first_susceptible + k as usize;
        let leaf = self.apply_transition(position, Compartment::Susceptible, to)?;
        self.tally.exposed_accumulated += 1;
        if to == Compartment::Infectious1 {
            self.count_infection_kind(leaf);
        }
        Ok(leaf)
    }

    /// Move a uniformly chosen member of `from` to `to`
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        from: Compartment,
        to: Compartment,
        rng: &mut R,
    ) -> Result<NodeId> {
        let available = self.members(from).len();
        if available == 0 {
            return Err(SimulationError::invariant(format!(
                "no {} individual available to move to {}",
                from, to
            )));
        }
        let leaf = self.apply_transition(rng.gen_range(0..available), from, to)?;
        if from == Compartment::Exposed2 && to == Compartment::Infectious1 {
            self.count_infection_kind(leaf);
        }
        Ok(leaf)
    }

    // Attribute a new infectious individual to the lowest level at which the
    // node already held another infected or recovered individual.
    fn count_infection_kind(&mut self, leaf: NodeId) {
        let mut current = leaf;
        loop {
            let node = &self.nodes[current.0];
            let seen = node.counts.i1 + node.counts.i2 + node.counts.r;
            match node.parent {
                Some(parent) if seen <= 1 && node.level < self.levels => current = parent,
                _ => {
                    self.tally.by_level[node.level as usize] += 1;
                    return;
                }
            }
        }
    }

    fn ensure_susceptibles(&self, requested: u64) -> Result<()> {
        let available = self.root_counts().s;
        if requested > available {
            return Err(SimulationError::InsufficientSusceptibles {
                requested,
                available,
            });
        }
        Ok(())
    }

    /// Move `count` uniformly chosen susceptibles to I1
    pub fn force_infection<R: Rng + ?Sized>(&mut self, count: u64, rng: &mut R) -> Result<()> {
        self.ensure_susceptibles(count)?;
        for _ in 0..count {
            let s = self.lists[0].len();
            self.apply_transition(
                rng.gen_range(0..s),
                Compartment::Susceptible,
                Compartment::Infectious1,
            )?;
        }
        self.tally.imported += count;
        Ok(())
    }

    /// Move `count` uniformly chosen susceptibles straight to R
    pub fn force_recovery<R: Rng + ?Sized>(&mut self, count: u64, rng: &mut R) -> Result<()> {
        self.ensure_susceptibles(count)?;
        for _ in 0..count {
            let s = self.lists[0].len();
            let leaf = self.apply_transition(
                rng.gen_range(0..s),
                Compartment::Susceptible,
                Compartment::Recovered,
            )?;
            self.forced_recovered.push(leaf);
        }
        self.tally.forcibly_recovered += count;
        Ok(())
    }

    /// Return `count` randomly chosen forcibly recovered individuals to S
    pub fn unforce_recovery<R: Rng + ?Sized>(&mut self, count: u64, rng: &mut R) -> Result<()> {
        let available = self.forced_recovered.len() as u64;
        if count > available {
            return Err(SimulationError::malformed(format!(
                "cannot return {} forcibly recovered individuals, only {} held",
                count, available
            )));
        }
        for _ in 0..count {
            let index = rng.gen_range(0..self.forced_recovered.len());
            let leaf = self.forced_recovered.remove(index);
            let counts = &mut self.nodes[leaf.0].counts;
            counts.r -= 1;
            counts.s += 1;
        }
        self.tally.forcibly_recovered -= count;
        self.recompute_counts();
        Ok(())
    }

    /// Reconcile the tree with cumulative imported infections and forced
    /// recoveries read from an input series
    pub fn apply_imported<R: Rng + ?Sized>(
        &mut self,
        infected: u64,
        recovered: u64,
        rng: &mut R,
    ) -> Result<()> {
        let new_infected = infected.checked_sub(self.tally.imported).ok_or_else(|| {
            SimulationError::malformed(format!(
                "cumulative imported infections decreased from {} to {}",
                self.tally.imported, infected
            ))
        })?;
        let held = self.tally.forcibly_recovered;
        let new_recovered = recovered.saturating_sub(held);
        let returned = held.saturating_sub(recovered);

        // Check everything up front so a failing record leaves the tree untouched
        self.ensure_susceptibles(new_infected + new_recovered)?;
        if returned > self.forced_recovered.len() as u64 {
            return Err(SimulationError::invariant(format!(
                "forced recovery tally {} disagrees with {} held individuals",
                held,
                self.forced_recovered.len()
            )));
        }

        if new_infected > 0 {
            self.force_infection(new_infected, rng)?;
        }
        if new_recovered > 0 {
            self.force_recovery(new_recovered, rng)?;
        } else if returned > 0 {
            self.unforce_recovery(returned, rng)?;
        }
        Ok(())
    }

    /// Mean and sample variance of `I1 + I2` over the nodes of `level`
    pub fn level_infection_stats(&self, level: u32) -> (f64, f64) {
        let nodes = self.level_nodes(level);
        // West recurrence
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for (n, &id) in nodes.iter().enumerate() {
            let x = self.nodes[id.0].counts.infectious() as f64;
            let q = x - mean;
            let r = q / (n + 1) as f64;
            mean += r;
            m2 += q * r * n as f64;
        }
        let variance = if nodes.len() > 1 {
            m2 / (nodes.len() - 1) as f64
        } else {
            0.0
        };
        (mean, variance)
    }

    /// Root state together with the run counters
    pub fn snapshot(&self, rates: &RateConstants) -> Snapshot {
        let root = &self.nodes[self.root.0];
        Snapshot {
            population: root.population,
            counts: root.counts,
            infections_imported: self.tally.imported,
            infections_close: self.tally.by_level.get(1).copied().unwrap_or(0),
            infections_community: self
                .tally
                .by_level
                .get(self.levels as usize)
                .copied()
                .unwrap_or(0),
            exposed_accumulated: self.tally.exposed_accumulated,
            forcibly_recovered: self.tally.forcibly_recovered,
            beta_out: rates.beta_at(2),
            mean_infectious_time: rates.mean_infectious_time(),
            detail: None,
        }
    }

    /// Infectious mean and variance for every level below the root, and
    /// per-node infectious counts from the root down to `detail_level`
    pub fn level_detail(&self, detail_level: u32) -> LevelDetail {
        let level_stats = (1..self.levels)
            .rev()
            .map(|level| {
                let (mean, variance) = self.level_infection_stats(level);
                LevelStats {
                    level,
                    mean,
                    variance,
                }
            })
            .collect();
        let node_infectious = (detail_level.max(1)..=self.levels)
            .rev()
            .map(|level| {
                let counts = self
                    .level_nodes(level)
                    .iter()
                    .map(|id| self.nodes[id.0].counts.infectious())
                    .collect();
                (level, counts)
            })
            .collect();
        LevelDetail {
            level_stats,
            node_infectious,
        }
    }

    /// Verify every structural invariant, reporting the first violation
    pub fn check_invariants(&self) -> Result<()> {
        let fail = |message: String| Err(SimulationError::invariant(message));

        for (i, node) in self.nodes.iter().enumerate() {
            if node.counts.total() != node.population {
                return fail(format!(
                    "node {} counts sum to {} but population is {}",
                    i,
                    node.counts.total(),
                    node.population
                ));
            }
            if node.level > 1 {
                let mut counts = CompartmentCounts::default();
                let mut population = 0;
                for &child in &node.children {
                    counts.add(&self.nodes[child.0].counts);
                    population += self.nodes[child.0].population;
                }
                if counts != node.counts || population != node.population {
                    return fail(format!("node {} does not match the sum of its children", i));
                }
                let first_child = node.children.first().map(|c| self.nodes[c.0].first_susceptible);
                if first_child != Some(node.first_susceptible) {
                    return fail(format!("node {} susceptible offset is stale", i));
                }
            }
        }

        let root = self.root_counts();
        for (i, list) in self.lists.iter().enumerate() {
            let compartment = Compartment::ALL[i];
            if list.len() as u64 != root.get(compartment) {
                return fail(format!(
                    "{} list holds {} entries but the root counts {}",
                    compartment,
                    list.len(),
                    root.get(compartment)
                ));
            }
            let mut per_leaf: HashMap<NodeId, u64> = HashMap::new();
            for &leaf in list {
                *per_leaf.entry(leaf).or_default() += 1;
            }
            for &leaf in &self.level_nodes[1] {
                let listed = per_leaf.get(&leaf).copied().unwrap_or(0);
                if listed != self.nodes[leaf.0].counts.get(compartment) {
                    return fail(format!(
                        "family {} has {} {} entries listed but counts {}",
                        leaf.0,
                        listed,
                        compartment,
                        self.nodes[leaf.0].counts.get(compartment)
                    ));
                }
            }
        }

        let mut offset = 0;
        for &leaf in &self.level_nodes[1] {
            let node = &self.nodes[leaf.0];
            if node.first_susceptible != offset {
                return fail(format!(
                    "family {} susceptible offset {} should be {}",
                    leaf.0, node.first_susceptible, offset
                ));
            }
            let range = offset..offset + node.counts.s as usize;
            if self.lists[0][range].iter().any(|&m| m != leaf) {
                return fail(format!("susceptibles of family {} are not contiguous", leaf.0));
            }
            offset += node.counts.s as usize;
        }

        for (i, node) in self.nodes.iter().enumerate() {
            let listed = node
                .roster_position
                .map(|p| self.roster.get(p) == Some(&NodeId(i)));
            match (node.counts.infectious() > 0, listed) {
                (true, Some(true)) | (false, None) => {}
                _ => return fail(format!("roster entry of node {} is inconsistent", i)),
            }
        }
        if self.roster.len() != self.nodes.iter().filter(|n| n.roster_position.is_some()).count() {
            return fail("roster holds nodes not marked as infected".to_string());
        }

        if self.forced_recovered.len() as u64 != self.tally.forcibly_recovered {
            return fail(format!(
                "{} forcibly recovered individuals held but tally is {}",
                self.forced_recovered.len(),
                self.tally.forcibly_recovered
            ));
        }
        Ok(())
    }
}
