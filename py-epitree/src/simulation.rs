//! Python bindings for the Gillespie driver.

use pyo3::prelude::*;

use epitree_core::{SimulationEngine, Snapshot};
use epitree_gillespie::{GillespieDriver, GridSampler, Trajectory};

use crate::config::PySimulationConfig;
use crate::python_output::PythonProgress;
use crate::to_py_err;

#[pyclass(name = "HierarchicalSimulation")]
pub struct PyHierarchicalSimulation {
    inner: GillespieDriver,
    runs: u32,
    horizon: f64,
    sample_interval: f64,
}

#[pymethods]
impl PyHierarchicalSimulation {
    /// Build the population hierarchy and event schedule of `config`
    #[new]
    fn new(config: PySimulationConfig) -> PyResult<Self> {
        let inner = GillespieDriver::new(&config.inner).map_err(to_py_err)?;
        Ok(Self {
            inner,
            runs: config.inner.runs,
            horizon: config.inner.horizon,
            sample_interval: config.inner.sample_interval,
        })
    }

    /// Run every configured realization and return, per run, one row per
    /// grid time `0, deltat, ... <= horizon`: `[t, N, S, E1, E2, I1, I2, R,
    /// imported, close, community, beta_out]`, followed by the level detail
    /// values when `detail_level` is configured
    #[pyo3(signature = (deltat=None, verbose=false))]
    fn run(
        &mut self,
        py: Python<'_>,
        deltat: Option<f64>,
        verbose: bool,
    ) -> PyResult<Vec<Vec<Vec<f64>>>> {
        let deltat = deltat.unwrap_or(self.sample_interval);
        if !(deltat > 0.0) {
            return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(
                "deltat must be positive",
            ));
        }

        let progress = PythonProgress::new(self.runs);
        if verbose {
            progress.header(py);
        }

        let horizon = self.horizon;
        let mut results = Vec::with_capacity(self.runs as usize);
        for run in 0..self.runs {
            let mut sampler = GridSampler::new(Trajectory::new(), 0.0, horizon, deltat);
            self.inner.reset();
            self.inner.run(&mut sampler).map_err(to_py_err)?;
            sampler.finish();
            if verbose {
                progress.run_finished(py, run, self.inner.time(), &self.inner.snapshot());
            }
            results.push(sampler.into_inner().rows());
        }
        Ok(results)
    }

    /// Labels of the columns returned by `run`
    #[staticmethod]
    fn columns() -> Vec<&'static str> {
        let mut labels = vec!["t"];
        labels.extend_from_slice(Snapshot::row_labels());
        labels
    }

    #[getter]
    fn population_size(&self) -> u64 {
        self.inner.tree().population()
    }

    #[getter]
    fn levels(&self) -> u32 {
        self.inner.tree().levels()
    }

    #[getter]
    fn families(&self) -> usize {
        self.inner.tree().leaves().len()
    }

    fn __repr__(&self) -> String {
        format!(
            "HierarchicalSimulation(population={}, levels={}, runs={})",
            self.inner.tree().population(),
            self.inner.tree().levels(),
            self.runs
        )
    }
}
