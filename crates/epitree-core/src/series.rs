//! Readers for the whitespace-separated exogenous series files.
//!
//! Lines starting with `#` and blank lines are ignored.
//!
//! Imported infections, one record per line:
//! ```text
//! # time  cumulative_I  [cumulative_R]
//! 0.0     1
//! 10.0    4   2
//! ```
//!
//! Rate changes, one record per line, for a hierarchy with `L` levels:
//! ```text
//! # time  beta_1 ... beta_L  sigma1 sigma2 gamma1 gamma2
//! 0.0     0.5 0.05           0.2 0.2 0.1 0.1
//! ```

use std::fs;
use std::path::Path;

use crate::error::{Result, SimulationError};
use crate::types::{ImportedCases, RateChange, RateConstants};

fn records(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            None
        } else {
            Some((i + 1, line.split_whitespace().collect()))
        }
    })
}

fn parse_field<T: std::str::FromStr>(field: &str, line: usize, what: &str) -> Result<T> {
    field.parse::<T>().map_err(|_| SimulationError::Parse {
        line,
        message: format!("cannot read {} from '{}'", what, field),
    })
}

/// Parse an imported-infections series
pub fn parse_imported_cases(text: &str) -> Result<Vec<ImportedCases>> {
    let mut series = Vec::new();
    for (line, fields) in records(text) {
        if fields.len() != 2 && fields.len() != 3 {
            return Err(SimulationError::Parse {
                line,
                message: format!("expected 2 or 3 fields, found {}", fields.len()),
            });
        }
        let time: f64 = parse_field(fields[0], line, "time")?;
        let infected: u64 = parse_field(fields[1], line, "cumulative infected")?;
        let recovered: u64 = match fields.get(2) {
            Some(field) => parse_field(field, line, "cumulative recovered")?,
            None => 0,
        };
        series.push(ImportedCases::new(time, infected, recovered));
    }
    Ok(series)
}

/// Parse a rate-change series for a hierarchy with `levels` levels
pub fn parse_rate_changes(text: &str, levels: usize) -> Result<Vec<RateChange>> {
    let expected = 1 + levels + 4;
    let mut series = Vec::new();
    for (line, fields) in records(text) {
        if fields.len() != expected {
            return Err(SimulationError::Parse {
                line,
                message: format!(
                    "expected {} fields (time, {} betas, sigma1, sigma2, gamma1, gamma2), found {}",
                    expected,
                    levels,
                    fields.len()
                ),
            });
        }
        let values = fields
            .iter()
            .map(|f| parse_field::<f64>(f, line, "rate value"))
            .collect::<Result<Vec<f64>>>()?;
        let beta = values[1..=levels].to_vec();
        let stages = &values[levels + 1..];
        series.push(RateChange::new(
            values[0],
            RateConstants::new(beta, stages[0], stages[1], stages[2], stages[3]),
        ));
    }
    Ok(series)
}

pub fn read_imported_cases(path: &Path) -> Result<Vec<ImportedCases>> {
    parse_imported_cases(&fs::read_to_string(path)?)
}

pub fn read_rate_changes(path: &Path, levels: usize) -> Result<Vec<RateChange>> {
    parse_rate_changes(&fs::read_to_string(path)?, levels)
}
