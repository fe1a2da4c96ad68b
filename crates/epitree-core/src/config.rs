//! Simulation configuration.
//!
//! A configuration is built once (usually from JSON) and passed by reference
//! to the population tree, the rate table and the driver.
//!
//! ```json
//! {
//!   "hierarchy": { "offspring": [4, {"weights": [0, 1, 1]}, 10] },
//!   "rates": { "beta": [0.5, 0.05, 0.001], "sigma1": 0.4, "sigma2": 0.4,
//!              "gamma1": 0.2, "gamma2": 0.2 },
//!   "horizon": 120.0,
//!   "runs": 10,
//!   "seed": 42,
//!   "imported_file": "imported.dat"
//! }
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::series;
use crate::types::{HierarchyConfig, ImportedCases, RateChange, RateConstants, StageConvention};

/// Epidemic model variant run on the hierarchy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpidemicModel {
    /// S → E1 → E2 → I1 → I2 → R
    #[default]
    #[serde(rename = "SEEIIR")]
    Seeiir,
    /// S → I1 → R (E and I2 stay empty)
    #[serde(rename = "SIR")]
    Sir,
}

/// How the rate table is brought up to date after an internal transition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateUpdate {
    /// Rebuild every propensity after each event
    #[default]
    #[serde(rename = "full")]
    Full,
    /// Touch only the propensities on the path from the affected family to
    /// the root, falling back to a rebuild when the infected roster changed
    #[serde(rename = "incremental")]
    Incremental,
}

fn default_runs() -> u32 {
    1
}

fn default_sample_interval() -> f64 {
    1.0
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub hierarchy: HierarchyConfig,
    /// Rate constants in effect at t = 0
    pub rates: RateConstants,
    /// Simulated time span [0, horizon]
    pub horizon: f64,
    #[serde(default = "default_runs")]
    pub runs: u32,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub model: EpidemicModel,
    #[serde(default)]
    pub stage_convention: StageConvention,
    #[serde(default)]
    pub rate_update: RateUpdate,
    /// Reporting grid spacing used by samplers
    #[serde(default = "default_sample_interval")]
    pub sample_interval: f64,
    /// Lowest level whose per-node infectious counts go into snapshots;
    /// `None` leaves level detail out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_level: Option<u32>,
    #[serde(default)]
    pub imported: Vec<ImportedCases>,
    #[serde(default)]
    pub rate_changes: Vec<RateChange>,
    /// Text series appended to `imported` when the configuration is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_file: Option<PathBuf>,
    /// Text series appended to `rate_changes` when the configuration is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_changes_file: Option<PathBuf>,
}

impl SimulationConfig {
    /// Minimal configuration with no exogenous events
    pub fn new(hierarchy: HierarchyConfig, rates: RateConstants, horizon: f64) -> Self {
        Self {
            hierarchy,
            rates,
            horizon,
            runs: default_runs(),
            seed: 0,
            model: EpidemicModel::default(),
            stage_convention: StageConvention::default(),
            rate_update: RateUpdate::default(),
            sample_interval: default_sample_interval(),
            detail_level: None,
            imported: Vec::new(),
            rate_changes: Vec::new(),
            imported_file: None,
            rate_changes_file: None,
        }
    }

    /// Parse a configuration from a JSON string.
    ///
    /// Series file paths are resolved relative to the current directory.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: SimulationConfig = serde_json::from_str(json)?;
        config.load_series(Path::new("."))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    ///
    /// Series file paths are resolved relative to the file's directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut config: SimulationConfig = serde_json::from_reader(file)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.load_series(base)?;
        config.validate()?;
        log::info!(
            "Loaded configuration from {} ({} levels, {} imported records, {} rate changes)",
            path.display(),
            config.levels(),
            config.imported.len(),
            config.rate_changes.len()
        );
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn levels(&self) -> usize {
        self.hierarchy.levels()
    }

    /// Read the series files named in the configuration into the inline series
    pub fn load_series(&mut self, base: &Path) -> Result<()> {
        if let Some(file) = self.imported_file.take() {
            let path = base.join(&file);
            self.imported.extend(series::read_imported_cases(&path)?);
        }
        if let Some(file) = self.rate_changes_file.take() {
            let path = base.join(&file);
            let levels = self.levels();
            self.rate_changes
                .extend(series::read_rate_changes(&path, levels)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.hierarchy.validate()?;
        let levels = self.levels();
        self.rates.validate(levels)?;

        if !(self.horizon >= 0.0) || !self.horizon.is_finite() {
            return Err(SimulationError::config(format!(
                "horizon must be finite and non-negative, got {}",
                self.horizon
            )));
        }
        if self.runs == 0 {
            return Err(SimulationError::config("runs must be at least 1"));
        }
        if !(self.sample_interval > 0.0) {
            return Err(SimulationError::config(format!(
                "sample_interval must be positive, got {}",
                self.sample_interval
            )));
        }
        if let Some(level) = self.detail_level {
            if level == 0 || level as usize > levels {
                return Err(SimulationError::config(format!(
                    "detail_level must be between 1 and {}, got {}",
                    levels, level
                )));
            }
        }
        for change in &self.rate_changes {
            change.rates.validate(levels)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OffspringSpec;
    use tempfile::TempDir;

    const CONFIG: &str = r#"{
        "hierarchy": { "offspring": [5, 2] },
        "rates": { "beta": [0.5, 0.05], "sigma1": 0.2, "sigma2": 0.2,
                   "gamma1": 0.1, "gamma2": 0.1 },
        "horizon": 50.0,
        "imported": [ { "time": 1.0, "infected": 2 } ],
        "rate_update": "incremental"
    }"#;

    #[test]
    fn test_from_json_applies_defaults() {
        let config = SimulationConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.levels(), 2);
        assert_eq!(config.hierarchy.offspring[0], OffspringSpec::Fixed(5));
        assert_eq!(config.runs, 1);
        assert_eq!(config.model, EpidemicModel::Seeiir);
        assert_eq!(config.stage_convention, StageConvention::PerStage);
        assert_eq!(config.rate_update, RateUpdate::Incremental);
        assert_eq!(config.imported[0].recovered, 0);
    }

    #[test]
    fn test_validate_rejects_beta_shape_mismatch() {
        let json = CONFIG.replace("[0.5, 0.05]", "[0.5]");
        assert!(matches!(
            SimulationConfig::from_json(&json),
            Err(SimulationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_series_files_are_resolved_relative_to_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("imported.dat"), "# t I R\n0 1\n3 2 1\n").unwrap();
        std::fs::write(dir.path().join("rates.dat"), "2 0.4 0.04 0.2 0.2 0.1 0.1\n").unwrap();
        let json = CONFIG.replace(
            "\"imported\": [ { \"time\": 1.0, \"infected\": 2 } ],",
            "\"imported_file\": \"imported.dat\", \"rate_changes_file\": \"rates.dat\",",
        );
        std::fs::write(dir.path().join("config.json"), json).unwrap();

        let config = SimulationConfig::from_json_file(dir.path().join("config.json")).unwrap();
        assert_eq!(config.imported.len(), 2);
        assert_eq!(config.imported[1], ImportedCases::new(3.0, 2, 1));
        assert_eq!(config.rate_changes.len(), 1);
        assert_eq!(config.rate_changes[0].rates.beta, vec![0.4, 0.04]);
        assert!(config.imported_file.is_none());
    }

    #[test]
    fn test_detail_level_must_name_a_level() {
        let json = CONFIG.replace("\"horizon\": 50.0,", "\"horizon\": 50.0, \"detail_level\": 2,");
        let config = SimulationConfig::from_json(&json).unwrap();
        assert_eq!(config.detail_level, Some(2));

        let json = CONFIG.replace("\"horizon\": 50.0,", "\"horizon\": 50.0, \"detail_level\": 3,");
        assert!(matches!(
            SimulationConfig::from_json(&json),
            Err(SimulationError::InvalidConfiguration(_))
        ));
    }
}
