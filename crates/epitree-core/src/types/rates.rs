use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};

/// How the configured stage rates map onto the two-stage E and I chains
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageConvention {
    /// Each stage leaves at exactly the configured rate (`sigma1`, `sigma2`,
    /// `gamma1`, `gamma2`).
    #[default]
    #[serde(rename = "per_stage")]
    PerStage,
    /// Each stage leaves at twice the configured rate, so equal `sigma1` and
    /// `sigma2` give an Erlang-2 sojourn with mean `1/sigma`.
    #[serde(rename = "split_mean")]
    SplitMean,
}

impl StageConvention {
    pub fn stage_factor(self) -> f64 {
        match self {
            StageConvention::PerStage => 1.0,
            StageConvention::SplitMean => 2.0,
        }
    }
}

/// Rate constants in effect at some time.
///
/// `beta[0]` applies to level 1 (families), `beta[1]` to level 2 and so on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateConstants {
    pub beta: Vec<f64>,
    pub sigma1: f64,
    pub sigma2: f64,
    pub gamma1: f64,
    pub gamma2: f64,
}

impl RateConstants {
    pub fn new(beta: Vec<f64>, sigma1: f64, sigma2: f64, gamma1: f64, gamma2: f64) -> Self {
        Self {
            beta,
            sigma1,
            sigma2,
            gamma1,
            gamma2,
        }
    }

    /// Contact rate at hierarchy `level` (1-based); 0 past the configured levels
    pub fn beta_at(&self, level: u32) -> f64 {
        if level == 0 {
            return 0.0;
        }
        self.beta.get(level as usize - 1).copied().unwrap_or(0.0)
    }

    /// Mean time spent infectious, `1/gamma1 + 1/gamma2`
    pub fn mean_infectious_time(&self) -> f64 {
        1.0 / self.gamma1 + 1.0 / self.gamma2
    }

    /// Check the constants against a hierarchy with `levels` levels
    pub fn validate(&self, levels: usize) -> Result<()> {
        if self.beta.len() != levels {
            return Err(SimulationError::config(format!(
                "expected {} beta values (one per level), got {}",
                levels,
                self.beta.len()
            )));
        }

        let named = [
            ("sigma1", self.sigma1),
            ("sigma2", self.sigma2),
            ("gamma1", self.gamma1),
            ("gamma2", self.gamma2),
        ];
        for (i, beta) in self.beta.iter().enumerate() {
            if !beta.is_finite() || *beta < 0.0 {
                return Err(SimulationError::config(format!(
                    "beta at level {} must be finite and non-negative, got {}",
                    i + 1,
                    beta
                )));
            }
        }
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(SimulationError::config(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}
