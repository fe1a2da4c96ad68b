use serde::{Deserialize, Serialize};

use super::rates::RateConstants;

/// One record of the imported-infections series.
///
/// Both counts are cumulative since the start of the run: `infected` must
/// never decrease, `recovered` may go down to return forcibly recovered
/// individuals to the susceptible pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportedCases {
    pub time: f64,
    pub infected: u64,
    #[serde(default)]
    pub recovered: u64,
}

impl ImportedCases {
    pub fn new(time: f64, infected: u64, recovered: u64) -> Self {
        Self {
            time,
            infected,
            recovered,
        }
    }
}

/// Replacement of the full rate-constant vector at `time`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateChange {
    pub time: f64,
    pub rates: RateConstants,
}

impl RateChange {
    pub fn new(time: f64, rates: RateConstants) -> Self {
        Self { time, rates }
    }
}
