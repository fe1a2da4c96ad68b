use serde::{Deserialize, Serialize};

use super::compartment::CompartmentCounts;

/// Aggregate state of the whole population, read off the hierarchy root
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Total population N
    pub population: u64,
    pub counts: CompartmentCounts,
    /// Cumulative imported infections
    pub infections_imported: u64,
    /// Cumulative infections attributed to the family level
    pub infections_close: u64,
    /// Cumulative infections attributed to the top (community) level
    pub infections_community: u64,
    /// Cumulative S→E transitions
    pub exposed_accumulated: u64,
    /// Individuals currently held in R by forced recovery
    pub forcibly_recovered: u64,
    /// Contact rate at level 2 (0 when the hierarchy has a single level)
    pub beta_out: f64,
    /// Mean infectious time `1/gamma1 + 1/gamma2`
    pub mean_infectious_time: f64,
    /// Per-level infectious counts, present when a detail level is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<LevelDetail>,
}

/// Mean and sample variance of `I1 + I2` over the nodes of one level
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelStats {
    pub level: u32,
    pub mean: f64,
    pub variance: f64,
}

/// Infectious counts broken down below the root
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelDetail {
    /// One entry per level from `levels - 1` down to 1
    pub level_stats: Vec<LevelStats>,
    /// `(level, I1 + I2 of every node at that level)` from the root level
    /// down to the detail level; nodes are in depth-first order
    pub node_infectious: Vec<(u32, Vec<u64>)>,
}

impl LevelDetail {
    /// Flattened values: mean and variance per level, then the node counts
    pub fn to_row(&self) -> Vec<f64> {
        let mut row = Vec::new();
        for stats in &self.level_stats {
            row.push(stats.mean);
            row.push(stats.variance);
        }
        for (_, counts) in &self.node_infectious {
            row.extend(counts.iter().map(|&c| c as f64));
        }
        row
    }
}

impl Snapshot {
    /// Values in reporting order: N, S, E1, E2, I1, I2, R, imported, close,
    /// community, beta_out
    pub fn to_row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(11);
        row.push(self.population as f64);
        row.extend(self.counts.to_vec().into_iter().map(|c| c as f64));
        row.push(self.infections_imported as f64);
        row.push(self.infections_close as f64);
        row.push(self.infections_community as f64);
        row.push(self.beta_out);
        row
    }

    pub fn row_labels() -> &'static [&'static str] {
        &[
            "N", "S", "E1", "E2", "I1", "I2", "R", "imported", "close", "community", "beta_out",
        ]
    }
}
