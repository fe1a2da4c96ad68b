//! Time-ordered queue of events imposed from outside the simulation.

use std::collections::VecDeque;

use epitree_core::{ImportedCases, RateChange, RateConstants, Result, SimulationError};

#[derive(Clone, Debug, PartialEq)]
pub enum ExogenousKind {
    /// Cumulative imported infections and forcibly recovered individuals
    ImportedInfection { infected: u64, recovered: u64 },
    /// Full replacement of the rate constants
    RateChange(RateConstants),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExogenousEvent {
    pub time: f64,
    pub kind: ExogenousKind,
}

impl ExogenousEvent {
    /// Terminal entry placed after every real event
    pub fn sentinel() -> Self {
        Self {
            time: f64::INFINITY,
            kind: ExogenousKind::ImportedInfection {
                infected: 0,
                recovered: 0,
            },
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.time == f64::INFINITY
    }
}

#[derive(Clone, Debug)]
pub struct ExogenousEventQueue {
    events: VecDeque<ExogenousEvent>,
}

fn check_time(time: f64, previous: f64, series: &str, index: usize) -> Result<()> {
    if !time.is_finite() || time < 0.0 {
        return Err(SimulationError::malformed(format!(
            "{} record {} has invalid time {}",
            series, index, time
        )));
    }
    if time < previous {
        return Err(SimulationError::malformed(format!(
            "{} record {} at time {} comes before the previous record at {}",
            series, index, time, previous
        )));
    }
    Ok(())
}

impl ExogenousEventQueue {
    /// Queue holding only the sentinel
    pub fn empty() -> Self {
        Self {
            events: VecDeque::from(vec![ExogenousEvent::sentinel()]),
        }
    }

    /// Merge the two time-sorted series into one queue.
    ///
    /// On equal times imported infections come before rate changes. Both
    /// series must be sorted by time and cumulative imported infections may
    /// not decrease.
    pub fn merge(imported: &[ImportedCases], rate_changes: &[RateChange]) -> Result<Self> {
        let mut previous = 0.0;
        let mut previous_infected = 0;
        for (i, record) in imported.iter().enumerate() {
            check_time(record.time, previous, "imported series", i)?;
            if record.infected < previous_infected {
                return Err(SimulationError::malformed(format!(
                    "cumulative imported infections drop from {} to {} at time {}",
                    previous_infected, record.infected, record.time
                )));
            }
            previous = record.time;
            previous_infected = record.infected;
        }
        let mut previous = 0.0;
        for (i, change) in rate_changes.iter().enumerate() {
            check_time(change.time, previous, "rate series", i)?;
            previous = change.time;
        }

        let mut events = VecDeque::with_capacity(imported.len() + rate_changes.len() + 1);
        let mut imported = imported.iter().peekable();
        let mut rate_changes = rate_changes.iter().peekable();
        loop {
            let take_imported = match (imported.peek(), rate_changes.peek()) {
                (Some(i), Some(r)) => i.time <= r.time,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let event = if take_imported {
                imported.next().map(|i| ExogenousEvent {
                    time: i.time,
                    kind: ExogenousKind::ImportedInfection {
                        infected: i.infected,
                        recovered: i.recovered,
                    },
                })
            } else {
                rate_changes.next().map(|r| ExogenousEvent {
                    time: r.time,
                    kind: ExogenousKind::RateChange(r.rates.clone()),
                })
            };
            events.extend(event);
        }
        events.push_back(ExogenousEvent::sentinel());

        Ok(Self { events })
    }

    pub fn peek(&self) -> Option<&ExogenousEvent> {
        self.events.front()
    }

    pub fn pop(&mut self) -> Option<ExogenousEvent> {
        self.events.pop_front()
    }

    /// Number of queued events, sentinel included
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// True when only the sentinel (or nothing) is left
    pub fn is_exhausted(&self) -> bool {
        self.peek().map_or(true, ExogenousEvent::is_sentinel)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExogenousEvent> {
        self.events.iter()
    }
}

impl Default for ExogenousEventQueue {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(beta: f64) -> RateConstants {
        RateConstants::new(vec![beta], 0.2, 0.2, 0.1, 0.1)
    }

    #[test]
    fn test_merge_orders_imported_first_on_ties() {
        let imported = vec![ImportedCases::new(5.0, 3, 0)];
        let changes = vec![RateChange::new(5.0, rates(0.3))];
        let queue = ExogenousEventQueue::merge(&imported, &changes).unwrap();

        let events: Vec<_> = queue.iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0].kind,
            ExogenousKind::ImportedInfection {
                infected: 3,
                recovered: 0
            }
        );
        assert_eq!(events[1].kind, ExogenousKind::RateChange(rates(0.3)));
        assert!(events[2].is_sentinel());
    }

    #[test]
    fn test_merged_queue_is_monotone() {
        let imported = vec![
            ImportedCases::new(0.0, 1, 0),
            ImportedCases::new(2.0, 1, 0),
            ImportedCases::new(7.5, 4, 1),
        ];
        let changes = vec![
            RateChange::new(1.0, rates(0.2)),
            RateChange::new(2.0, rates(0.3)),
            RateChange::new(9.0, rates(0.4)),
        ];
        let mut queue = ExogenousEventQueue::merge(&imported, &changes).unwrap();
        assert_eq!(queue.len(), 7);

        let times: Vec<f64> = queue.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0, 2.0, 7.5, 9.0, f64::INFINITY]);
        assert!(matches!(
            queue.iter().nth(2).map(|e| &e.kind),
            Some(ExogenousKind::ImportedInfection { .. })
        ));

        while !queue.is_exhausted() {
            queue.pop();
        }
        assert_eq!(queue.len(), 1);
        assert!(queue.peek().unwrap().is_sentinel());
    }

    #[test]
    fn test_merge_rejects_malformed_series() {
        let unsorted = vec![ImportedCases::new(3.0, 1, 0), ImportedCases::new(1.0, 2, 0)];
        assert!(matches!(
            ExogenousEventQueue::merge(&unsorted, &[]),
            Err(SimulationError::MalformedInputSeries(_))
        ));

        let decreasing = vec![ImportedCases::new(1.0, 4, 0), ImportedCases::new(2.0, 2, 0)];
        assert!(matches!(
            ExogenousEventQueue::merge(&decreasing, &[]),
            Err(SimulationError::MalformedInputSeries(_))
        ));

        let negative = vec![RateChange::new(-1.0, rates(0.1))];
        assert!(ExogenousEventQueue::merge(&[], &negative).is_err());
    }

    #[test]
    fn test_empty_queue_holds_sentinel() {
        let queue = ExogenousEventQueue::merge(&[], &[]).unwrap();
        assert_eq!(queue.len(), 1);
        assert!(queue.is_exhausted());
        assert!(ExogenousEventQueue::default().is_exhausted());
    }
}
