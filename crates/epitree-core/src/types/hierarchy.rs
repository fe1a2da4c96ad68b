use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// Number of direct descendants of a node at one hierarchy level
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OffspringSpec {
    /// Every node has exactly this many descendants
    Fixed(u32),
    /// Weights for 1, 2, ..., k descendants (need not be normalized)
    Weighted { weights: Vec<f64> },
}

impl OffspringSpec {
    pub fn validate(&self, level: usize) -> Result<()> {
        match self {
            OffspringSpec::Fixed(0) => Err(SimulationError::config(format!(
                "level {} has a fixed fan-out of zero",
                level
            ))),
            OffspringSpec::Fixed(_) => Ok(()),
            OffspringSpec::Weighted { weights } => {
                if weights.is_empty() {
                    return Err(SimulationError::config(format!(
                        "level {} has an empty offspring distribution",
                        level
                    )));
                }
                WeightedIndex::new(weights).map(|_| ()).map_err(|e| {
                    SimulationError::config(format!(
                        "level {} offspring weights are invalid: {}",
                        level, e
                    ))
                })
            }
        }
    }

    /// Prepare a sampler for this level
    pub fn sampler(&self) -> Result<OffspringSampler> {
        match self {
            OffspringSpec::Fixed(m) => Ok(OffspringSampler::Fixed(*m)),
            OffspringSpec::Weighted { weights } => WeightedIndex::new(weights)
                .map(OffspringSampler::Weighted)
                .map_err(|e| SimulationError::config(format!("invalid offspring weights: {}", e))),
        }
    }
}

/// Draws offspring counts for one level
#[derive(Clone, Debug)]
pub enum OffspringSampler {
    Fixed(u32),
    Weighted(WeightedIndex<f64>),
}

impl OffspringSampler {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match self {
            OffspringSampler::Fixed(m) => *m,
            OffspringSampler::Weighted(dist) => dist.sample(rng) as u32 + 1,
        }
    }
}

/// Shape of the population hierarchy.
///
/// `offspring[0]` describes level 1 (the number of individuals per family),
/// the last entry describes the root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    pub offspring: Vec<OffspringSpec>,
}

impl HierarchyConfig {
    /// Hierarchy where every level has a fixed fan-out (level 1 first)
    pub fn fixed(fanout: &[u32]) -> Self {
        Self {
            offspring: fanout.iter().map(|&m| OffspringSpec::Fixed(m)).collect(),
        }
    }

    /// Number of stored levels (individuals excluded)
    pub fn levels(&self) -> usize {
        self.offspring.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.offspring.is_empty() {
            return Err(SimulationError::config("hierarchy needs at least one level"));
        }
        for (i, spec) in self.offspring.iter().enumerate() {
            spec.validate(i + 1)?;
        }
        Ok(())
    }

    /// Samplers indexed by `level - 1`
    pub fn samplers(&self) -> Result<Vec<OffspringSampler>> {
        self.offspring.iter().map(OffspringSpec::sampler).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_weighted_sampler_stays_in_range() {
        let spec = OffspringSpec::Weighted {
            weights: vec![0.0, 1.0, 1.0],
        };
        let sampler = spec.sampler().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let m = sampler.sample(&mut rng);
            assert!(m == 2 || m == 3);
        }
    }

    #[test]
    fn test_validate_rejects_zero_fanout() {
        let config = HierarchyConfig::fixed(&[4, 0]);
        assert!(config.validate().is_err());
        assert!(HierarchyConfig { offspring: vec![] }.validate().is_err());
        assert!(HierarchyConfig::fixed(&[4, 3]).validate().is_ok());
    }

    #[test]
    fn test_offspring_spec_deserializes_both_forms() {
        let config: HierarchyConfig =
            serde_json::from_str(r#"{"offspring": [4, {"weights": [1.0, 2.0]}]}"#).unwrap();
        assert_eq!(config.offspring[0], OffspringSpec::Fixed(4));
        assert!(matches!(config.offspring[1], OffspringSpec::Weighted { .. }));
    }
}
