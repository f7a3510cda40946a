//! Search policies over the frequency/voltage grid
//!
//! A [`SearchCursor`] holds the candidate under test and decides, from how
//! the trial went, which candidate comes next.

use serde::{Deserialize, Serialize};

use crate::data::{CandidateConfig, OutcomeTag, SweepRange};

/// Order in which the grid is explored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPolicy {
    /// For each frequency, find the lowest stable voltage, then move on
    #[default]
    FrequencyFirst,
    /// Hold voltage and climb frequency; raise voltage when unstable
    ClimbFrequency,
}

/// How a trial ended, as far as the search is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgement {
    Stable,
    Unstable,
    /// No higher voltage may be tried at this frequency
    Ceiling,
}

/// What the cursor did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    NextCandidate,
    /// The frequency ran out of voltages; the search may go on
    FrequencyExhausted,
    Done,
}

#[derive(Debug, Clone)]
pub struct SearchCursor {
    range: SweepRange,
    current: Option<CandidateConfig>,
}

impl SearchCursor {
    pub fn new(range: &SweepRange) -> Self {
        Self {
            range: range.clone(),
            current: Some(CandidateConfig::new(
                range.frequency_min_mhz,
                range.voltage_min_mv,
            )),
        }
    }

    pub fn policy(&self) -> SearchPolicy {
        self.range.policy
    }

    pub fn current(&self) -> Option<CandidateConfig> {
        self.current
    }

    fn next_frequency(&self, f: u32) -> Option<u32> {
        f.checked_add(self.range.frequency_step_mhz)
            .filter(|n| *n <= self.range.frequency_max_mhz)
    }

    fn next_voltage(&self, v: u32) -> Option<u32> {
        v.checked_add(self.range.voltage_step_mv)
            .filter(|n| *n <= self.range.voltage_max_mv)
    }

    /// Outcome tag for a stable trial of `candidate`
    pub fn stable_tag(&self, candidate: CandidateConfig) -> OutcomeTag {
        match self.range.policy {
            SearchPolicy::FrequencyFirst => OutcomeTag::StableMinVoltage,
            SearchPolicy::ClimbFrequency => {
                if self.next_frequency(candidate.frequency_mhz).is_none() {
                    OutcomeTag::FreqLimitReached
                } else {
                    OutcomeTag::Stable
                }
            }
        }
    }

    /// Move past the current candidate.
    pub fn advance(&mut self, judgement: Judgement) -> Advance {
        let current = match self.current {
            Some(c) => c,
            None => return Advance::Done,
        };

        let (next, exhausted) = match (self.range.policy, judgement) {
            (SearchPolicy::FrequencyFirst, Judgement::Stable) => (self.first_voltage_of_next(current), false),
            (SearchPolicy::FrequencyFirst, Judgement::Unstable) => {
                match self.next_voltage(current.core_voltage_mv) {
                    Some(v) => (Some(CandidateConfig::new(current.frequency_mhz, v)), false),
                    None => (self.first_voltage_of_next(current), true),
                }
            }
            (SearchPolicy::FrequencyFirst, Judgement::Ceiling) => (self.first_voltage_of_next(current), true),

            (SearchPolicy::ClimbFrequency, Judgement::Stable) => (
                self.next_frequency(current.frequency_mhz)
                    .map(|f| CandidateConfig::new(f, current.core_voltage_mv)),
                false,
            ),
            (SearchPolicy::ClimbFrequency, Judgement::Unstable) => {
                match self.next_voltage(current.core_voltage_mv) {
                    Some(v) => (Some(CandidateConfig::new(current.frequency_mhz, v)), false),
                    None => (None, true),
                }
            }
            (SearchPolicy::ClimbFrequency, Judgement::Ceiling) => (None, true),
        };

        self.current = next;
        match (exhausted, next) {
            (true, _) => Advance::FrequencyExhausted,
            (false, Some(_)) => Advance::NextCandidate,
            (false, None) => Advance::Done,
        }
    }

    fn first_voltage_of_next(&self, current: CandidateConfig) -> Option<CandidateConfig> {
        self.next_frequency(current.frequency_mhz)
            .map(|f| CandidateConfig::new(f, self.range.voltage_min_mv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(policy: SearchPolicy) -> SweepRange {
        SweepRange {
            voltage_min_mv: 1100,
            voltage_max_mv: 1150,
            voltage_step_mv: 25,
            frequency_min_mhz: 600,
            frequency_max_mhz: 650,
            frequency_step_mhz: 25,
            policy,
        }
    }

    fn c(f: u32, v: u32) -> Option<CandidateConfig> {
        Some(CandidateConfig::new(f, v))
    }

    #[test]
    fn test_frequency_first_stable_moves_to_next_frequency() {
        let mut cur = SearchCursor::new(&range(SearchPolicy::FrequencyFirst));
        assert_eq!(cur.current(), c(600, 1100));
        assert_eq!(cur.advance(Judgement::Stable), Advance::NextCandidate);
        assert_eq!(cur.current(), c(625, 1100));
        assert_eq!(cur.advance(Judgement::Unstable), Advance::NextCandidate);
        assert_eq!(cur.current(), c(625, 1125));
        assert_eq!(cur.advance(Judgement::Stable), Advance::NextCandidate);
        assert_eq!(cur.current(), c(650, 1100));
    }

    #[test]
    fn test_frequency_first_exhausts_voltage() {
        let mut cur = SearchCursor::new(&range(SearchPolicy::FrequencyFirst));
        cur.advance(Judgement::Unstable);
        cur.advance(Judgement::Unstable);
        assert_eq!(cur.current(), c(600, 1150));
        assert_eq!(cur.advance(Judgement::Unstable), Advance::FrequencyExhausted);
        assert_eq!(cur.current(), c(625, 1100));
    }

    #[test]
    fn test_frequency_first_ends_after_last_frequency() {
        let mut cur = SearchCursor::new(&range(SearchPolicy::FrequencyFirst));
        cur.advance(Judgement::Stable);
        cur.advance(Judgement::Stable);
        assert_eq!(cur.advance(Judgement::Stable), Advance::Done);
        assert_eq!(cur.current(), None);
        assert_eq!(cur.advance(Judgement::Stable), Advance::Done);
    }

    #[test]
    fn test_declined_voltage_exhausts_frequency() {
        let mut cur = SearchCursor::new(&range(SearchPolicy::FrequencyFirst));
        assert_eq!(cur.advance(Judgement::Ceiling), Advance::FrequencyExhausted);
        assert_eq!(cur.current(), c(625, 1100));
    }

    #[test]
    fn test_climb_frequency_walk() {
        let mut cur = SearchCursor::new(&range(SearchPolicy::ClimbFrequency));
        assert_eq!(cur.stable_tag(CandidateConfig::new(600, 1100)), OutcomeTag::Stable);
        cur.advance(Judgement::Stable);
        assert_eq!(cur.current(), c(625, 1100));
        cur.advance(Judgement::Unstable);
        assert_eq!(cur.current(), c(625, 1125));
        cur.advance(Judgement::Stable);
        assert_eq!(cur.current(), c(650, 1125));
        assert_eq!(
            cur.stable_tag(CandidateConfig::new(650, 1125)),
            OutcomeTag::FreqLimitReached
        );
        assert_eq!(cur.advance(Judgement::Stable), Advance::Done);
    }

    #[test]
    fn test_climb_frequency_stops_at_voltage_ceiling() {
        let mut cur = SearchCursor::new(&range(SearchPolicy::ClimbFrequency));
        cur.advance(Judgement::Unstable);
        cur.advance(Judgement::Unstable);
        assert_eq!(cur.advance(Judgement::Unstable), Advance::FrequencyExhausted);
        assert_eq!(cur.current(), None);
    }

    #[test]
    fn test_uneven_step_stays_inside_range() {
        let mut r = range(SearchPolicy::FrequencyFirst);
        r.voltage_step_mv = 40;
        let mut cur = SearchCursor::new(&r);
        cur.advance(Judgement::Unstable);
        assert_eq!(cur.current(), c(600, 1140));
        assert_eq!(cur.advance(Judgement::Unstable), Advance::FrequencyExhausted);
    }

    #[test]
    fn test_policy_serde_names() {
        let json = serde_json::to_string(&SearchPolicy::ClimbFrequency).unwrap();
        assert_eq!(json, "\"climb_frequency\"");
    }
}
