use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Exp1;

use epitree_core::{
    Observer, RateConstants, RateUpdate, Result, RunState, SimulationConfig, SimulationEngine,
    Snapshot,
};

use crate::events::{ExogenousEvent, ExogenousEventQueue, ExogenousKind};
use crate::model::Epidemic;
use crate::rates::{RateTable, TransitionKind};
use crate::tree::{NodeId, PopulationTree};

/// Exact stochastic simulation of the epidemic on a population tree.
///
/// Each step draws the waiting time to the next internal event; if an
/// exogenous event comes first it is applied instead, otherwise one
/// transition is chosen in proportion to its propensity.
pub struct GillespieDriver {
    tree: PopulationTree,
    table: RateTable,
    epidemic: Epidemic,
    rate_update: RateUpdate,
    initial_rates: RateConstants,
    rates: RateConstants,
    // Merged once, copied into `pending` at every reset
    schedule: ExogenousEventQueue,
    pending: ExogenousEventQueue,
    horizon: f64,
    // Lowest level reported node by node in snapshots
    detail_level: Option<u32>,
    time: f64,
    state: RunState,
    rng: StdRng,
    // Family touched by the last internal transition, if the table may be
    // refreshed incrementally
    last_leaf: Option<NodeId>,
    steps: u64,
}

impl GillespieDriver {
    /// Build the population and event schedule described by `config`,
    /// seeding the random source from `config.seed`
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(config.seed))
    }

    pub fn with_rng(config: &SimulationConfig, mut rng: StdRng) -> Result<Self> {
        config.validate()?;
        let tree = PopulationTree::from_config(&config.hierarchy, &mut rng)?;
        let schedule = ExogenousEventQueue::merge(&config.imported, &config.rate_changes)?;

        log::info!(
            "Population of {} individuals in {} families ({} levels), {} exogenous events",
            tree.population(),
            tree.leaves().len(),
            tree.levels(),
            schedule.len() - 1
        );

        Ok(Self {
            tree,
            table: RateTable::new(),
            epidemic: Epidemic::new(config.model, config.stage_convention),
            rate_update: config.rate_update,
            initial_rates: config.rates.clone(),
            rates: config.rates.clone(),
            pending: schedule.clone(),
            schedule,
            horizon: config.horizon,
            detail_level: config.detail_level,
            time: 0.0,
            state: RunState::Running,
            rng,
            last_leaf: None,
            steps: 0,
        })
    }

    pub fn tree(&self) -> &PopulationTree {
        &self.tree
    }

    pub fn rate_table(&self) -> &RateTable {
        &self.table
    }

    /// Rate constants currently in effect
    pub fn rates(&self) -> &RateConstants {
        &self.rates
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn pending_events(&self) -> &ExogenousEventQueue {
        &self.pending
    }

    /// Internal transitions and exogenous events applied in this run
    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn refresh_rates(&mut self) {
        match (self.rate_update, self.last_leaf) {
            (RateUpdate::Incremental, Some(leaf)) => {
                self.table
                    .refresh_after(&self.tree, &self.rates, &self.epidemic, leaf)
            }
            _ => self
                .table
                .recompute_all(&self.tree, &self.rates, &self.epidemic),
        }
    }

    fn apply_exogenous(&mut self, event: ExogenousEvent) -> Result<()> {
        match event.kind {
            ExogenousKind::ImportedInfection {
                infected,
                recovered,
            } => {
                log::debug!(
                    "t = {}: imported infections {} (forcibly recovered {})",
                    event.time,
                    infected,
                    recovered
                );
                self.tree.apply_imported(infected, recovered, &mut self.rng)?;
            }
            ExogenousKind::RateChange(rates) => {
                log::debug!("t = {}: rate constants changed to {:?}", event.time, rates);
                self.rates = rates;
            }
        }
        if cfg!(debug_assertions) {
            self.tree.check_invariants()?;
        }
        // Forced moves touch arbitrary families, so rebuild next step
        self.last_leaf = None;
        Ok(())
    }

    fn apply_internal(&mut self, total: f64) -> Result<()> {
        let u = (1.0 - self.rng.gen::<f64>()) * total;
        let transition = *self.table.select(u)?;
        let leaf = match transition.kind {
            TransitionKind::Infection => {
                let s = self.tree.node(transition.node).counts().s;
                let k = self.rng.gen_range(0..s);
                self.tree
                    .infect_within(transition.node, k, self.epidemic.infection_target())?
            }
            TransitionKind::Progression { from, to } => {
                self.tree.advance(from, to, &mut self.rng)?
            }
        };
        self.last_leaf = Some(leaf);
        Ok(())
    }

    fn try_step(&mut self, observer: &mut dyn Observer) -> Result<RunState> {
        self.refresh_rates();
        let total = self.table.total();
        let dt = if total > 0.0 {
            self.rng.sample::<f64, _>(Exp1) / total
        } else {
            f64::INFINITY
        };
        let candidate = self.time + dt;
        let next_event = self.pending.peek().map_or(f64::INFINITY, |e| e.time);

        if next_event <= candidate && next_event <= self.horizon {
            self.time = next_event;
            observer.observe(self.time, &self.snapshot());
            // The horizon is finite, so the event due here is never the sentinel
            if let Some(event) = self.pending.pop() {
                self.apply_exogenous(event)?;
                self.steps += 1;
            }
            Ok(RunState::Running)
        } else if candidate > self.horizon {
            // Nothing else happens before the horizon
            self.time = self.horizon;
            observer.observe(self.time, &self.snapshot());
            if !self.pending.is_exhausted() {
                log::warn!(
                    "Horizon {} reached with {} exogenous events still queued",
                    self.horizon,
                    self.pending.len() - 1
                );
            }
            Ok(RunState::Stopped)
        } else {
            self.time = candidate;
            observer.observe(self.time, &self.snapshot());
            self.apply_internal(total)?;
            self.steps += 1;
            Ok(RunState::Running)
        }
    }

    /// Run `runs` independent realizations, handing each a fresh observer
    /// from `make_observer` and returning them in run order.
    ///
    /// The population structure is reused and the random stream continues
    /// from one run to the next.
    pub fn run_ensemble<O, F>(&mut self, runs: u32, mut make_observer: F) -> Result<Vec<O>>
    where
        O: Observer,
        F: FnMut(u32) -> O,
    {
        let mut observers = Vec::with_capacity(runs as usize);
        for run in 0..runs {
            let mut observer = make_observer(run);
            self.reset();
            self.run(&mut observer)?;
            log::info!("Run {}/{} finished", run + 1, runs);
            observers.push(observer);
        }
        Ok(observers)
    }
}

impl SimulationEngine for GillespieDriver {
    fn reset(&mut self) {
        self.tree.reset_to_all_susceptible();
        self.rates = self.initial_rates.clone();
        self.pending = self.schedule.clone();
        self.time = 0.0;
        self.state = RunState::Running;
        self.last_leaf = None;
        self.steps = 0;
    }

    fn step(&mut self, observer: &mut dyn Observer) -> Result<RunState> {
        if self.state == RunState::Stopped {
            return Ok(RunState::Stopped);
        }
        let result = self.try_step(observer);
        self.state = match result {
            Ok(state) => state,
            Err(_) => RunState::Stopped,
        };
        result
    }

    fn run(&mut self, observer: &mut dyn Observer) -> Result<()> {
        log::info!(
            "Starting run at t = {} with horizon {}",
            self.time,
            self.horizon
        );
        observer.observe(self.time, &self.snapshot());
        while self.step(observer)? == RunState::Running {}
        let counts = self.tree.root_counts();
        log::info!(
            "Run stopped at t = {} after {} steps: S = {}, R = {}, imported = {}",
            self.time,
            self.steps,
            counts.s,
            counts.r,
            self.tree.tally().imported
        );
        Ok(())
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn snapshot(&self) -> Snapshot {
        let mut snapshot = self.tree.snapshot(&self.rates);
        snapshot.detail = self.detail_level.map(|level| self.tree.level_detail(level));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{GridSampler, Trajectory};
    use epitree_core::{
        EpidemicModel, HierarchyConfig, ImportedCases, RateChange, SimulationError,
    };

    fn config(fanout: &[u32], beta: Vec<f64>) -> SimulationConfig {
        let mut config = SimulationConfig::new(
            HierarchyConfig::fixed(fanout),
            RateConstants::new(beta, 0.5, 0.5, 0.3, 0.3),
            60.0,
        );
        config.seed = 2024;
        config.imported = vec![ImportedCases::new(0.5, 2, 0)];
        config
    }

    #[test]
    fn test_imported_and_rate_change_applied_together() {
        let mut config = config(&[4, 5], vec![0.0, 0.0]);
        config.imported = vec![ImportedCases::new(5.0, 3, 0)];
        config.rate_changes = vec![RateChange::new(
            5.0,
            RateConstants::new(vec![0.4, 0.1], 0.5, 0.5, 0.3, 0.3),
        )];
        let mut driver = GillespieDriver::new(&config).unwrap();
        let mut trajectory = Trajectory::new();

        // Nothing can happen before the imported cases arrive
        driver.step(&mut trajectory).unwrap();
        assert_eq!(driver.time(), 5.0);
        assert_eq!(driver.tree().tally().imported, 3);
        assert_eq!(driver.rates().beta_at(1), 0.0);

        driver.step(&mut trajectory).unwrap();
        assert_eq!(driver.time(), 5.0);
        assert_eq!(driver.rates().beta_at(1), 0.4);
        assert!(driver.pending_events().is_exhausted());

        driver.step(&mut trajectory).unwrap();
        assert!(driver.time() > 5.0);
        let times: Vec<f64> = trajectory.points().iter().map(|(t, _)| *t).collect();
        assert_eq!(&times[..2], &[5.0, 5.0]);
        assert_eq!(trajectory.points()[1].1.infections_imported, 3);
    }

    #[test]
    fn test_run_conserves_population_and_stops_at_horizon() {
        let config = config(&[3, 4, 5], vec![0.8, 0.2, 0.05]);
        let mut driver = GillespieDriver::new(&config).unwrap();
        let mut trajectory = Trajectory::new();
        driver.run(&mut trajectory).unwrap();

        assert_eq!(driver.state(), RunState::Stopped);
        assert_eq!(driver.time(), 60.0);
        assert_eq!(trajectory.points().last().map(|(t, _)| *t), Some(60.0));
        for (_, snapshot) in trajectory.points() {
            assert_eq!(snapshot.counts.total(), 60);
            assert_eq!(snapshot.population, 60);
        }
        let times: Vec<f64> = trajectory.points().iter().map(|(t, _)| *t).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        driver.tree().check_invariants().unwrap();

        // Stopped drivers stay stopped
        assert_eq!(driver.step(&mut trajectory).unwrap(), RunState::Stopped);
    }

    #[test]
    fn test_incremental_updates_reproduce_full_updates() {
        let mut full = config(&[4, 6, 5], vec![0.9, 0.3, 0.02]);
        full.rate_changes = vec![RateChange::new(
            20.0,
            RateConstants::new(vec![0.5, 0.1, 0.01], 0.5, 0.5, 0.3, 0.3),
        )];
        let mut incremental = full.clone();
        incremental.rate_update = RateUpdate::Incremental;

        let a = GillespieDriver::new(&full)
            .unwrap()
            .run_ensemble(2, |_| Trajectory::new())
            .unwrap();
        let b = GillespieDriver::new(&incremental)
            .unwrap()
            .run_ensemble(2, |_| Trajectory::new())
            .unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!(x.len() > 2);
            assert_eq!(x.points(), y.points());
        }
    }

    #[test]
    fn test_sir_variant_never_uses_exposed_stages() {
        let mut config = config(&[5, 10], vec![1.0, 0.2]);
        config.model = EpidemicModel::Sir;
        let mut driver = GillespieDriver::new(&config).unwrap();
        let mut checked = 0;
        driver
            .run(&mut |_: f64, s: &Snapshot| {
                assert_eq!(s.counts.e1 + s.counts.e2 + s.counts.i2, 0);
                assert_eq!(s.counts.total(), 50);
                checked += 1;
            })
            .unwrap();
        assert!(checked > 1);
        assert!(driver.tree().tally().exposed_accumulated > 0 || driver.snapshot().counts.r > 0);
    }

    #[test]
    fn test_ensemble_runs_restart_from_susceptible() {
        let config = config(&[3, 3], vec![0.5, 0.1]);
        let mut driver = GillespieDriver::new(&config).unwrap();
        let samplers = driver
            .run_ensemble(3, |_| GridSampler::new(Trajectory::new(), 0.0, 60.0, 10.0))
            .unwrap();
        assert_eq!(samplers.len(), 3);
        for mut sampler in samplers {
            sampler.finish();
            let trajectory = sampler.into_inner();
            assert_eq!(trajectory.len(), 7);
            let (t0, first) = &trajectory.points()[0];
            assert_eq!(*t0, 0.0);
            assert_eq!(first.counts.s, 9);
            assert_eq!(first.infections_imported, 0);
            assert_eq!(trajectory.points()[6].0, 60.0);
        }
    }

    #[test]
    fn test_zero_total_rate_reports_at_horizon() {
        let mut config = config(&[3, 3], vec![0.0, 0.0]);
        config.imported.clear();
        let mut driver = GillespieDriver::new(&config).unwrap();
        let mut trajectory = Trajectory::new();
        driver.run(&mut trajectory).unwrap();

        let times: Vec<f64> = trajectory.points().iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![0.0, 60.0]);
        assert_eq!(driver.time(), 60.0);
        assert_eq!(driver.steps(), 0);
    }

    #[test]
    fn test_detail_level_reports_infectious_by_level() {
        let mut config = config(&[3, 4], vec![0.0, 0.0]);
        config.imported = vec![ImportedCases::new(5.0, 3, 0)];
        config.detail_level = Some(1);
        let mut driver = GillespieDriver::new(&config).unwrap();
        let mut trajectory = Trajectory::new();
        driver.step(&mut trajectory).unwrap();

        // Reported just before the imported cases arrive
        let before = trajectory.points()[0].1.detail.clone().unwrap();
        assert_eq!(before.node_infectious, vec![(2, vec![0]), (1, vec![0; 4])]);
        assert_eq!(before.level_stats[0].mean, 0.0);

        let detail = driver.snapshot().detail.unwrap();
        assert_eq!(detail.node_infectious[0], (2, vec![3]));
        let (level, families) = &detail.node_infectious[1];
        assert_eq!(*level, 1);
        assert_eq!(families.len(), 4);
        assert_eq!(families.iter().sum::<u64>(), 3);

        let stats = detail.level_stats[0];
        assert_eq!(stats.level, 1);
        assert!((stats.mean - 0.75).abs() < 1e-12);
        let variance = families
            .iter()
            .map(|&x| (x as f64 - 0.75).powi(2))
            .sum::<f64>()
            / 3.0;
        assert!((stats.variance - variance).abs() < 1e-12);

        config.detail_level = None;
        let driver = GillespieDriver::new(&config).unwrap();
        assert!(driver.snapshot().detail.is_none());
    }

    #[test]
    fn test_too_many_imported_cases_stop_the_run() {
        let mut config = config(&[2, 2], vec![0.1, 0.1]);
        config.imported = vec![ImportedCases::new(1.0, 10, 0)];
        let mut driver = GillespieDriver::new(&config).unwrap();
        let result = driver.run(&mut epitree_core::NullObserver);
        assert!(matches!(
            result,
            Err(SimulationError::InsufficientSusceptibles {
                requested: 10,
                available: 4
            })
        ));
        assert_eq!(driver.state(), RunState::Stopped);
        assert_eq!(driver.snapshot().counts.s, 4);
    }
}
