//! Progress table written to Python's stdout.
//!
//! Rust's println! writes to the OS-level stdout, which does not show up in
//! Jupyter notebooks, so verbose output goes through `sys.stdout` instead.

use pyo3::prelude::*;

use epitree_core::Snapshot;

pub struct PythonProgress {
    runs: u32,
}

impl PythonProgress {
    pub fn new(runs: u32) -> Self {
        Self { runs }
    }

    fn write(&self, py: Python<'_>, message: &str) {
        if let Err(e) = py
            .import("sys")
            .and_then(|sys| sys.getattr("stdout"))
            .and_then(|stdout| {
                stdout.call_method1("write", (format!("{}\n", message),))?;
                stdout.call_method0("flush")
            })
        {
            eprintln!("Failed to write to Python stdout: {}", e);
            eprintln!("{}", message);
        }
    }

    pub fn header(&self, py: Python<'_>) {
        let separator = "=".repeat(78);
        self.write(py, &separator);
        self.write(
            py,
            &format!(
                "{:>9} | {:>10} | {:>10} | {:>10} | {:>10} | {:>12}",
                "Run", "Final t", "S", "I", "R", "Imported"
            ),
        );
        self.write(py, &separator);
    }

    /// One table row for a finished run
    pub fn run_finished(&self, py: Python<'_>, run: u32, time: f64, snapshot: &Snapshot) {
        self.write(
            py,
            &format!(
                "{:>9} | {:>10.3} | {:>10} | {:>10} | {:>10} | {:>12}",
                format!("{}/{}", run + 1, self.runs),
                time,
                snapshot.counts.s,
                snapshot.counts.infectious(),
                snapshot.counts.r,
                snapshot.infections_imported
            ),
        );
    }
}
