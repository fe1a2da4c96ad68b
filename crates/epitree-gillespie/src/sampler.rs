//! Observers that record a simulation's output.

use epitree_core::{Observer, Snapshot};

/// Records every notification it receives
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    points: Vec<(f64, Snapshot)>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[(f64, Snapshot)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// One row per point: the time followed by [`Snapshot::to_row`], then
    /// the level detail values when the snapshot carries them
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.points
            .iter()
            .map(|(time, snapshot)| {
                let mut row = vec![*time];
                row.extend(snapshot.to_row());
                if let Some(detail) = &snapshot.detail {
                    row.extend(detail.to_row());
                }
                row
            })
            .collect()
    }
}

impl Observer for Trajectory {
    fn observe(&mut self, time: f64, snapshot: &Snapshot) {
        self.points.push((time, snapshot.clone()));
    }
}

/// Re-emits the prevailing state on the regular grid `t0, t0 + dt, ...`
/// (up to `tmax`) to an inner observer.
///
/// Event-driven simulations report at irregular times with the state that
/// held up to that time; each grid point strictly before the reported time
/// receives that state.
#[derive(Clone, Debug)]
pub struct GridSampler<O> {
    inner: O,
    t0: f64,
    tmax: f64,
    dt: f64,
    next: u64,
    last: Option<Snapshot>,
}

impl<O: Observer> GridSampler<O> {
    pub fn new(inner: O, t0: f64, tmax: f64, dt: f64) -> Self {
        Self {
            inner,
            t0,
            tmax,
            dt,
            next: 0,
            last: None,
        }
    }

    fn grid_time(&self) -> f64 {
        self.t0 + self.next as f64 * self.dt
    }

    /// Emit every remaining grid point with the last state seen
    pub fn finish(&mut self) {
        if let Some(snapshot) = self.last.take() {
            while self.grid_time() <= self.tmax {
                let t = self.grid_time();
                self.inner.observe(t, &snapshot);
                self.next += 1;
            }
            self.last = Some(snapshot);
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: Observer> Observer for GridSampler<O> {
    fn observe(&mut self, time: f64, snapshot: &Snapshot) {
        while self.grid_time() < time && self.grid_time() <= self.tmax {
            let t = self.grid_time();
            self.inner.observe(t, snapshot);
            self.next += 1;
        }
        self.last = Some(snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epitree_core::{LevelDetail, LevelStats};

    fn with_susceptibles(s: u64) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.counts.s = s;
        snapshot
    }

    #[test]
    fn test_grid_sampler_emits_prevailing_state() {
        let mut sampler = GridSampler::new(Trajectory::new(), 0.0, 3.0, 1.0);
        sampler.observe(0.4, &with_susceptibles(10));
        sampler.observe(0.9, &with_susceptibles(9));
        sampler.observe(2.5, &with_susceptibles(8));
        sampler.observe(7.0, &with_susceptibles(7));

        let points = sampler.into_inner();
        let times: Vec<f64> = points.points().iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0, 3.0]);
        let s: Vec<u64> = points.points().iter().map(|(_, p)| p.counts.s).collect();
        assert_eq!(s, vec![10, 8, 8, 7]);
    }

    #[test]
    fn test_grid_point_at_event_time_waits() {
        let mut sampler = GridSampler::new(Trajectory::new(), 0.0, 2.0, 1.0);
        sampler.observe(1.0, &with_susceptibles(5));
        assert_eq!(sampler.inner().len(), 1);
        sampler.finish();
        assert_eq!(sampler.inner().len(), 3);
    }

    #[test]
    fn test_closure_observer_and_rows() {
        let mut seen = Vec::new();
        {
            let mut record = |t: f64, s: &Snapshot| seen.push((t, s.counts.s));
            let mut sampler = GridSampler::new(&mut record, 1.0, 2.0, 0.5);
            sampler.observe(10.0, &with_susceptibles(3));
        }
        assert_eq!(seen, vec![(1.0, 3), (1.5, 3), (2.0, 3)]);

        let mut trajectory = Trajectory::new();
        trajectory.observe(0.5, &with_susceptibles(4));
        let rows = trajectory.rows();
        assert_eq!(rows[0][0], 0.5);
        assert_eq!(rows[0][2], 4.0);
        assert_eq!(rows[0].len(), 1 + Snapshot::row_labels().len());
    }

    #[test]
    fn test_rows_append_level_detail() {
        let mut snapshot = with_susceptibles(6);
        snapshot.detail = Some(LevelDetail {
            level_stats: vec![LevelStats {
                level: 1,
                mean: 0.5,
                variance: 0.25,
            }],
            node_infectious: vec![(2, vec![1]), (1, vec![1, 0])],
        });
        let mut trajectory = Trajectory::new();
        trajectory.observe(1.0, &snapshot);
        let row = &trajectory.rows()[0];
        let base = 1 + Snapshot::row_labels().len();
        assert_eq!(&row[base..], &[0.5, 0.25, 1.0, 1.0, 0.0]);
    }
}
