//! Pure indicator calculations over price slices (oldest first).
//!
//! Every function degrades on short input by shrinking its window and returns a
//! neutral sentinel instead of dividing by zero.

use serde::{Deserialize, Serialize};

/// Sample count below which RSI reports neutral and Bollinger Bands fall back to a
/// fixed band around the last price.
pub const MIN_SAMPLES: usize = 5;

/// Relative Strength Index over the trailing window.
///
/// Returns 50 below `max(period / 2, MIN_SAMPLES)` samples, 100 when the window has
/// gains but no losses.
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if prices.len() < (period / 2).max(MIN_SAMPLES) {
        return 50.0;
    }

    let window = period.min(prices.len() - 1).max(MIN_SAMPLES);
    let start = prices.len().saturating_sub(window).max(1);

    let (gains, losses) = prices[start - 1..]
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gains, losses), change| {
            if change > 0.0 {
                (gains + change, losses)
            } else {
                (gains, losses - change)
            }
        });

    let avg_gain = gains / window as f64;
    let avg_loss = losses / window as f64;

    if avg_loss == 0.0 {
        return if avg_gain > 0.0 { 100.0 } else { 50.0 };
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Exponential moving average seeded with the SMA of the trailing window.
///
/// EMA = (Price - EMA_prev) × α + EMA_prev, α = 2 / (window + 1)
pub fn ema(prices: &[f64], period: usize) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    if prices.len() < period / 3 {
        return mean(prices);
    }

    let window = period.min(prices.len()).max(1);
    let alpha = 2.0 / (window as f64 + 1.0);
    let recent = &prices[prices.len() - window..];

    recent
        .iter()
        .skip(1)
        .fold(mean(recent), |ema, price| (price - ema) * alpha + ema)
}

pub fn sma(prices: &[f64], period: usize) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    let window = period.min(prices.len()).max(1);
    mean(&prices[prices.len() - window..])
}

#[derive(Debug, Copy, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Middle = SMA, bands = middle ± multiplier × population std dev.
///
/// With fewer than [`MIN_SAMPLES`] samples the bands are `price × (1 ± fallback_pct)`.
pub fn bollinger(prices: &[f64], period: usize, multiplier: f64, fallback_pct: f64) -> BollingerBands {
    let Some(&last) = prices.last() else {
        return BollingerBands::default();
    };

    let window = period.min(prices.len()).max(1);
    if prices.len() < period && window < MIN_SAMPLES {
        return BollingerBands {
            upper: last * (1.0 + fallback_pct),
            middle: last,
            lower: last * (1.0 - fallback_pct),
        };
    }

    let recent = &prices[prices.len() - window..];
    let middle = mean(recent);
    let deviation = std_dev(recent) * multiplier.abs();

    BollingerBands {
        upper: middle + deviation,
        middle,
        lower: middle - deviation,
    }
}

/// Position of `price` relative to the bands: -1 at the lower band, 1 at the upper.
pub fn bb_position(price: f64, bands: &BollingerBands) -> f64 {
    let half_width = bands.upper - bands.middle;
    if bands.upper == bands.lower || half_width == 0.0 {
        return 0.0;
    }
    ((price - bands.middle) / half_width).clamp(-1.0, 1.0)
}

/// Population standard deviation of price over the trailing window.
pub fn volatility(prices: &[f64], period: usize) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }
    let window = period.min(prices.len()).max(1);
    std_dev(&prices[prices.len() - window..])
}

/// Percentage change between the last price and the price `period` samples earlier.
pub fn momentum(prices: &[f64], period: usize) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }
    let window = period.min(prices.len() - 1).max(1);
    let current = prices[prices.len() - 1];
    let past = prices[prices.len() - window - 1];

    if past == 0.0 {
        return 0.0;
    }
    (current - past) / past * 100.0
}

/// 1.0-capped EMA separation when fast, slow and trend EMAs are monotonically
/// ordered; a fixed 0.3 otherwise.
pub fn trend_strength(price: f64, ema_fast: f64, ema_slow: f64, ema_trend: f64) -> f64 {
    if ema_fast == 0.0 || ema_slow == 0.0 || ema_trend == 0.0 || price == 0.0 {
        return 0.0;
    }

    let aligned = (ema_fast > ema_slow && ema_slow > ema_trend)
        || (ema_fast < ema_slow && ema_slow < ema_trend);

    if aligned {
        ((ema_fast - ema_trend).abs() / price * 100.0).min(1.0)
    } else {
        0.3
    }
}

/// Population standard deviation of simple returns over the last `window` prices.
pub fn returns_volatility(prices: &[f64], window: usize) -> f64 {
    if window < 2 || prices.len() < window {
        return 0.0;
    }

    let returns = prices[prices.len() - window..]
        .windows(2)
        .map(|pair| if pair[0] == 0.0 { 0.0 } else { (pair[1] - pair[0]) / pair[0] })
        .collect::<Vec<_>>();

    std_dev(&returns)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = mean(values);
    let variance = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_rsi() {
        struct TestCase {
            input: Vec<f64>,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: empty input is neutral
                input: vec![],
                expected: 50.0,
            },
            TestCase {
                // TC1: four samples is below the floor
                input: vec![1.0, 2.0, 3.0, 4.0],
                expected: 50.0,
            },
            TestCase {
                // TC2: only gains
                input: (1..=20).map(f64::from).collect(),
                expected: 100.0,
            },
            TestCase {
                // TC3: flat prices
                input: vec![5.0; 20],
                expected: 50.0,
            },
            TestCase {
                // TC4: only losses
                input: (1..=20).rev().map(f64::from).collect(),
                expected: 0.0,
            },
            TestCase {
                // TC5: equal gains and losses
                input: (0..21).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect(),
                expected: 50.0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = rsi(&test.input, 14);
            assert!(approx_eq(actual, test.expected), "TC{} failed: {}", index, actual);
        }
    }

    #[test]
    fn test_rsi_always_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for len in 0..120 {
            let prices = (0..len)
                .map(|_| rng.random_range(90.0..110.0))
                .collect::<Vec<f64>>();
            let value = rsi(&prices, 14);
            assert!((0.0..=100.0).contains(&value), "len {} gave {}", len, value);
        }
    }

    #[test]
    fn test_ema() {
        struct TestCase {
            input: (Vec<f64>, usize),
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: empty
                input: (vec![], 9),
                expected: 0.0,
            },
            TestCase {
                // TC1: far below period falls back to average
                input: (vec![1.0, 3.0], 50),
                expected: 2.0,
            },
            TestCase {
                // TC2: constant series
                input: (vec![4.0; 30], 9),
                expected: 4.0,
            },
            TestCase {
                // TC3: window of three, α = 0.5, seeded at 2.0 then 2.0 and 2.5
                input: (vec![100.0, 1.0, 2.0, 3.0], 3),
                expected: 2.5,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = ema(&test.input.0, test.input.1);
            assert!(approx_eq(actual, test.expected), "TC{} failed: {}", index, actual);
        }
    }

    #[test]
    fn test_bollinger_ordering() {
        let mut rng = StdRng::seed_from_u64(11);
        for len in 0..60 {
            let prices = (0..len)
                .map(|_| rng.random_range(1.0..2.0))
                .collect::<Vec<f64>>();
            let bands = bollinger(&prices, 20, 2.0, 0.03);
            assert!(bands.lower <= bands.middle, "len {}", len);
            assert!(bands.middle <= bands.upper, "len {}", len);
        }
    }

    #[test]
    fn test_bollinger_fallback() {
        let bands = bollinger(&[100.0, 100.0, 100.0], 20, 2.0, 0.03);
        assert!(approx_eq(bands.upper, 103.0));
        assert!(approx_eq(bands.middle, 100.0));
        assert!(approx_eq(bands.lower, 97.0));
    }

    #[test]
    fn test_bb_position() {
        struct TestCase {
            input: f64,
            expected: f64,
        }

        let bands = BollingerBands {
            upper: 110.0,
            middle: 100.0,
            lower: 90.0,
        };

        let tests = vec![
            TestCase {
                // TC0: at middle
                input: 100.0,
                expected: 0.0,
            },
            TestCase {
                // TC1: half way to upper
                input: 105.0,
                expected: 0.5,
            },
            TestCase {
                // TC2: far above is clamped
                input: 1_000.0,
                expected: 1.0,
            },
            TestCase {
                // TC3: far below is clamped
                input: -50.0,
                expected: -1.0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = bb_position(test.input, &bands);
            assert!(approx_eq(actual, test.expected), "TC{} failed: {}", index, actual);
        }

        let flat = BollingerBands {
            upper: 100.0,
            middle: 100.0,
            lower: 100.0,
        };
        assert_eq!(bb_position(120.0, &flat), 0.0);
    }

    #[test]
    fn test_momentum() {
        struct TestCase {
            input: Vec<f64>,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: single sample
                input: vec![100.0],
                expected: 0.0,
            },
            TestCase {
                // TC1: shrinks window to available samples
                input: vec![100.0, 101.0],
                expected: 1.0,
            },
            TestCase {
                // TC2: zero base price
                input: vec![0.0, 5.0],
                expected: 0.0,
            },
            TestCase {
                // TC3: full window of ten
                input: (0..=12).map(|i| 100.0 + i as f64).collect(),
                expected: (112.0 - 102.0) / 102.0 * 100.0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = momentum(&test.input, 10);
            assert!(approx_eq(actual, test.expected), "TC{} failed: {}", index, actual);
        }
    }

    #[test]
    fn test_trend_strength() {
        struct TestCase {
            input: (f64, f64, f64, f64),
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0: bullish alignment
                input: (100.0, 100.5, 100.2, 100.0),
                expected: 0.5,
            },
            TestCase {
                // TC1: bearish alignment capped at 1
                input: (100.0, 97.0, 98.0, 99.0),
                expected: 1.0,
            },
            TestCase {
                // TC2: mixed ordering
                input: (100.0, 100.5, 99.0, 100.0),
                expected: 0.3,
            },
            TestCase {
                // TC3: zero EMA
                input: (100.0, 0.0, 99.0, 100.0),
                expected: 0.0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let (price, fast, slow, trend) = test.input;
            let actual = trend_strength(price, fast, slow, trend);
            assert!(approx_eq(actual, test.expected), "TC{} failed: {}", index, actual);
        }
    }

    #[test]
    fn test_volatility_and_returns_volatility() {
        assert_eq!(volatility(&[1.0], 20), 0.0);
        assert!(approx_eq(volatility(&[1.0, 3.0], 20), 1.0));

        assert_eq!(returns_volatility(&[1.0, 2.0], 10), 0.0);
        assert!(approx_eq(returns_volatility(&[100.0, 101.0, 102.01], 3), 0.0));
        assert!(returns_volatility(&[100.0, 110.0, 99.0, 120.0], 4) > 0.0);
    }
}
