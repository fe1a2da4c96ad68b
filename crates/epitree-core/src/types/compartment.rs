use std::fmt;

use serde::{Deserialize, Serialize};

/// Epidemiological state of an individual.
///
/// Exposed and infectious periods are split in two stages each, so that the
/// sojourn times are Erlang distributed rather than memoryless.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compartment {
    #[serde(rename = "S")]
    Susceptible,
    #[serde(rename = "E1")]
    Exposed1,
    #[serde(rename = "E2")]
    Exposed2,
    #[serde(rename = "I1")]
    Infectious1,
    #[serde(rename = "I2")]
    Infectious2,
    #[serde(rename = "R")]
    Recovered,
}

impl Compartment {
    pub const ALL: [Compartment; 6] = [
        Compartment::Susceptible,
        Compartment::Exposed1,
        Compartment::Exposed2,
        Compartment::Infectious1,
        Compartment::Infectious2,
        Compartment::Recovered,
    ];

    /// Position of the compartment's membership list, `None` for R.
    ///
    /// Recovered individuals are never picked at random, so no list is kept
    /// for them.
    pub fn list_index(self) -> Option<usize> {
        match self {
            Compartment::Susceptible => Some(0),
            Compartment::Exposed1 => Some(1),
            Compartment::Exposed2 => Some(2),
            Compartment::Infectious1 => Some(3),
            Compartment::Infectious2 => Some(4),
            Compartment::Recovered => None,
        }
    }

    pub fn is_infectious(self) -> bool {
        matches!(self, Compartment::Infectious1 | Compartment::Infectious2)
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Compartment::Susceptible => "S",
            Compartment::Exposed1 => "E1",
            Compartment::Exposed2 => "E2",
            Compartment::Infectious1 => "I1",
            Compartment::Infectious2 => "I2",
            Compartment::Recovered => "R",
        }
    }
}

impl fmt::Display for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Number of individuals in each compartment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompartmentCounts {
    #[serde(rename = "S")]
    pub s: u64,
    #[serde(rename = "E1")]
    pub e1: u64,
    #[serde(rename = "E2")]
    pub e2: u64,
    #[serde(rename = "I1")]
    pub i1: u64,
    #[serde(rename = "I2")]
    pub i2: u64,
    #[serde(rename = "R")]
    pub r: u64,
}

impl CompartmentCounts {
    /// All `n` individuals susceptible
    pub fn all_susceptible(n: u64) -> Self {
        Self {
            s: n,
            ..Self::default()
        }
    }

    pub fn get(&self, compartment: Compartment) -> u64 {
        match compartment {
            Compartment::Susceptible => self.s,
            Compartment::Exposed1 => self.e1,
            Compartment::Exposed2 => self.e2,
            Compartment::Infectious1 => self.i1,
            Compartment::Infectious2 => self.i2,
            Compartment::Recovered => self.r,
        }
    }

    pub fn get_mut(&mut self, compartment: Compartment) -> &mut u64 {
        match compartment {
            Compartment::Susceptible => &mut self.s,
            Compartment::Exposed1 => &mut self.e1,
            Compartment::Exposed2 => &mut self.e2,
            Compartment::Infectious1 => &mut self.i1,
            Compartment::Infectious2 => &mut self.i2,
            Compartment::Recovered => &mut self.r,
        }
    }

    pub fn total(&self) -> u64 {
        self.s + self.e1 + self.e2 + self.i1 + self.i2 + self.r
    }

    /// Individuals currently able to infect others (I1 + I2)
    pub fn infectious(&self) -> u64 {
        self.i1 + self.i2
    }

    pub fn add(&mut self, other: &CompartmentCounts) {
        self.s += other.s;
        self.e1 += other.e1;
        self.e2 += other.e2;
        self.i1 += other.i1;
        self.i2 += other.i2;
        self.r += other.r;
    }

    /// Counts in the order S, E1, E2, I1, I2, R
    pub fn to_vec(&self) -> Vec<u64> {
        Compartment::ALL.iter().map(|&c| self.get(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_mut_matches_get() {
        let mut counts = CompartmentCounts::all_susceptible(10);
        *counts.get_mut(Compartment::Susceptible) -= 3;
        *counts.get_mut(Compartment::Infectious2) += 3;
        assert_eq!(counts.get(Compartment::Susceptible), 7);
        assert_eq!(counts.infectious(), 3);
        assert_eq!(counts.total(), 10);
    }

    #[test]
    fn test_serde_uses_short_names() {
        let counts = CompartmentCounts::all_susceptible(4);
        let json = serde_json::to_string(&counts).unwrap();
        assert!(json.contains("\"S\":4"));
        let state: Compartment = serde_json::from_str("\"I2\"").unwrap();
        assert_eq!(state, Compartment::Infectious2);
    }
}
