//! Python bindings for epitree-core configuration.

use pyo3::prelude::*;

use epitree_core::SimulationConfig;

use crate::to_py_err;

/// Wrapper for epitree_core::SimulationConfig
#[pyclass(name = "SimulationConfig")]
#[derive(Clone)]
pub struct PySimulationConfig {
    pub inner: SimulationConfig,
}

#[pymethods]
impl PySimulationConfig {
    /// Load configuration from a JSON file; series files are resolved
    /// relative to it
    #[staticmethod]
    fn from_json_file(path: String) -> PyResult<Self> {
        let inner = SimulationConfig::from_json_file(path).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Load configuration from a JSON string
    #[staticmethod]
    fn from_json(json_str: String) -> PyResult<Self> {
        let inner = SimulationConfig::from_json(&json_str).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    fn to_json(&self) -> PyResult<String> {
        self.inner.to_json().map_err(to_py_err)
    }

    #[getter]
    fn horizon(&self) -> f64 {
        self.inner.horizon
    }

    #[getter]
    fn runs(&self) -> u32 {
        self.inner.runs
    }

    #[setter]
    fn set_runs(&mut self, runs: u32) -> PyResult<()> {
        if runs == 0 {
            return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(
                "runs must be at least 1",
            ));
        }
        self.inner.runs = runs;
        Ok(())
    }

    #[getter]
    fn seed(&self) -> u64 {
        self.inner.seed
    }

    #[setter]
    fn set_seed(&mut self, seed: u64) {
        self.inner.seed = seed;
    }

    #[getter]
    fn detail_level(&self) -> Option<u32> {
        self.inner.detail_level
    }

    #[getter]
    fn levels(&self) -> usize {
        self.inner.levels()
    }

    fn __repr__(&self) -> String {
        format!(
            "SimulationConfig(levels={}, horizon={}, runs={}, imported={}, rate_changes={})",
            self.inner.levels(),
            self.inner.horizon,
            self.inner.runs,
            self.inner.imported.len(),
            self.inner.rate_changes.len()
        )
    }
}
