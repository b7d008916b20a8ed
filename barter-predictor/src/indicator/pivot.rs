//! Swing point detection shared by divergence, pattern and support/resistance analysis.

use serde::{Deserialize, Serialize};

/// A local extremum at `index`.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Pivot {
    pub index: usize,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pivots {
    pub highs: Vec<Pivot>,
    pub lows: Vec<Pivot>,
}

impl Pivots {
    /// Most recent two highs as (previous, recent).
    pub fn last_two_highs(&self) -> Option<(Pivot, Pivot)> {
        last_two(&self.highs)
    }

    /// Most recent two lows as (previous, recent).
    pub fn last_two_lows(&self) -> Option<(Pivot, Pivot)> {
        last_two(&self.lows)
    }
}

fn last_two(pivots: &[Pivot]) -> Option<(Pivot, Pivot)> {
    match pivots {
        [.., previous, recent] => Some((*previous, *recent)),
        _ => None,
    }
}

/// How neighbours equal to the candidate are treated.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Extremum {
    /// Any neighbour equal to the candidate disqualifies it.
    Strict,
    /// Equal neighbours are tolerated (flat tops and bottoms qualify).
    Inclusive,
}

/// Find swing highs and lows among the last `lookback` values, where each candidate
/// is compared against `radius` neighbours on both sides.
///
/// Non-finite values (warm-up gaps in a derived series) are never pivots and are
/// ignored as neighbours.
pub fn find_pivots(values: &[f64], lookback: usize, radius: usize, rule: Extremum) -> Pivots {
    let mut pivots = Pivots::default();
    let len = values.len();
    let start = (len - lookback.min(len)).max(radius);
    let end = len.saturating_sub(radius);

    for index in start..end {
        let value = values[index];
        if !value.is_finite() {
            continue;
        }

        let neighbours = values[index - radius..=index + radius]
            .iter()
            .enumerate()
            .filter(|(offset, neighbour)| *offset != radius && neighbour.is_finite())
            .map(|(_, neighbour)| *neighbour);

        let (mut is_high, mut is_low) = (true, true);
        for neighbour in neighbours {
            match rule {
                Extremum::Strict => {
                    is_high &= neighbour < value;
                    is_low &= neighbour > value;
                }
                Extremum::Inclusive => {
                    is_high &= neighbour <= value;
                    is_low &= neighbour >= value;
                }
            }
        }

        if is_high {
            pivots.highs.push(Pivot { index, value });
        }
        if is_low {
            pivots.lows.push(Pivot { index, value });
        }
    }

    pivots
}

/// Lowest value in `values[start..=end]`, or the last value when the range is invalid.
pub fn lowest_between(values: &[f64], start: usize, end: usize) -> f64 {
    extreme_between(values, start, end, f64::min)
}

/// Highest value in `values[start..=end]`, or the last value when the range is invalid.
pub fn highest_between(values: &[f64], start: usize, end: usize) -> f64 {
    extreme_between(values, start, end, f64::max)
}

fn extreme_between(values: &[f64], start: usize, end: usize, pick: fn(f64, f64) -> f64) -> f64 {
    let last = values.last().copied().unwrap_or_default();
    if start >= end || end >= values.len() {
        return last;
    }
    values[start..=end].iter().copied().fold(values[start], pick)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_pivots_strict() {
        //             0    1    2    3    4    5    6    7    8    9   10
        let values = [1.0, 2.0, 5.0, 2.0, 1.0, 0.5, 1.0, 2.0, 3.0, 2.0, 1.0];

        let pivots = find_pivots(&values, values.len(), 2, Extremum::Strict);

        assert_eq!(
            pivots.highs,
            vec![Pivot { index: 2, value: 5.0 }, Pivot { index: 8, value: 3.0 }]
        );
        assert_eq!(pivots.lows, vec![Pivot { index: 5, value: 0.5 }]);
    }

    #[test]
    fn test_find_pivots_flat_top() {
        let values = [1.0, 2.0, 3.0, 3.0, 2.0, 1.0];

        let strict = find_pivots(&values, values.len(), 2, Extremum::Strict);
        let inclusive = find_pivots(&values, values.len(), 2, Extremum::Inclusive);

        assert!(strict.highs.is_empty());
        assert_eq!(
            inclusive.highs.iter().map(|pivot| pivot.index).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn test_find_pivots_skips_non_finite() {
        let values = [f64::NAN, f64::NAN, 40.0, 30.0, 20.0, 30.0, 40.0];

        let pivots = find_pivots(&values, values.len(), 2, Extremum::Strict);

        assert_eq!(pivots.lows, vec![Pivot { index: 4, value: 20.0 }]);
        assert_eq!(pivots.highs, vec![Pivot { index: 2, value: 40.0 }]);
    }

    #[test]
    fn test_find_pivots_respects_lookback() {
        let values = [1.0, 2.0, 5.0, 2.0, 1.0, 0.5, 1.0, 2.0, 3.0, 2.0, 1.0];

        let pivots = find_pivots(&values, 7, 2, Extremum::Strict);

        assert!(pivots.highs.iter().all(|pivot| pivot.index >= 4));
        assert_eq!(pivots.lows, vec![Pivot { index: 5, value: 0.5 }]);
    }

    #[test]
    fn test_between() {
        struct TestCase {
            input: (usize, usize),
            expected: (f64, f64),
        }

        let values = [3.0, 1.0, 4.0, 1.5, 9.0, 2.0];
        let tests = vec![
            TestCase {
                // TC0: valid range
                input: (1, 3),
                expected: (1.0, 4.0),
            },
            TestCase {
                // TC1: inverted range falls back to last value
                input: (3, 1),
                expected: (2.0, 2.0),
            },
            TestCase {
                // TC2: out of bounds falls back to last value
                input: (2, 10),
                expected: (2.0, 2.0),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let (start, end) = test.input;
            let actual = (
                lowest_between(&values, start, end),
                highest_between(&values, start, end),
            );
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
