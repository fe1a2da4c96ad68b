use pyo3::prelude::*;

mod config;
mod python_output;
mod simulation;

use epitree_core::SimulationError;

/// Map simulation errors onto the closest Python exception
pub(crate) fn to_py_err(error: SimulationError) -> PyErr {
    match error {
        SimulationError::Io(e) => PyErr::new::<pyo3::exceptions::PyIOError, _>(e.to_string()),
        e @ (SimulationError::InvalidConfiguration(_)
        | SimulationError::Json(_)
        | SimulationError::Parse { .. }
        | SimulationError::MalformedInputSeries(_)) => {
            PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string())
        }
        e => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(e.to_string()),
    }
}

/// Configuration types.
fn core_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<config::PySimulationConfig>()?;
    Ok(())
}

/// Gillespie simulation on a population hierarchy.
fn gillespie_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<simulation::PyHierarchicalSimulation>()?;
    Ok(())
}

/// Stochastic epidemic simulation on hierarchical populations.
#[pymodule]
fn epitree_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let core_mod = PyModule::new(m.py(), "core")?;
    core_module(&core_mod)?;
    m.add_submodule(&core_mod)?;

    let gillespie_mod = PyModule::new(m.py(), "gillespie")?;
    gillespie_module(&gillespie_mod)?;
    m.add_submodule(&gillespie_mod)?;

    Ok(())
}
