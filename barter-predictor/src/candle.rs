//! Tick to OHLC candle aggregation.
//!
//! Uses tick timestamps (not wall clock) for bucket boundaries, so a replayed or
//! backfilled window aggregates identically to a live one.

use crate::{
    config::HorizonTiers,
    error::CandleError,
    instrument::MarketCategory,
    model::{Candle, Tick},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Candle and indicator settings selected for one (category, horizon) pair.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TimeframeConfig {
    pub candle_period_secs: u64,
    pub min_candles: usize,
    pub rsi_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_trend: usize,
    /// Window used for support/resistance levels.
    pub lookback: usize,
}

impl TimeframeConfig {
    pub const fn new(candle_period_secs: u64, min_candles: usize, lookback: usize) -> Self {
        Self {
            candle_period_secs,
            min_candles,
            rsi_period: 14,
            ema_fast: 9,
            ema_slow: 21,
            ema_trend: 50,
            lookback,
        }
    }

    pub fn candle_period_ms(&self) -> i64 {
        (self.candle_period_secs.max(1) * 1000) as i64
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeframeTable {
    pub forex: HorizonTiers<TimeframeConfig>,
    pub synthetic: HorizonTiers<TimeframeConfig>,
    /// Raw ticks required beyond `min_candles` before aggregation is attempted.
    pub forex_tick_margin: usize,
    pub synthetic_tick_margin: usize,
    /// Fraction of `min_candles` that must be present.
    pub min_candle_fraction: f64,
    /// Maximum fraction of zero-volume candles before the feed is considered frozen.
    pub max_zero_volume_fraction: f64,
}

impl TimeframeTable {
    pub fn select(&self, category: MarketCategory, horizon_secs: u32) -> &TimeframeConfig {
        if category.is_forex() {
            self.forex.select(horizon_secs)
        } else {
            self.synthetic.select(horizon_secs)
        }
    }

    pub fn minimum_ticks(&self, category: MarketCategory, timeframe: &TimeframeConfig) -> usize {
        let margin = if category.is_forex() {
            self.forex_tick_margin
        } else {
            self.synthetic_tick_margin
        };
        timeframe.min_candles + margin
    }

    /// Fails with `InsufficientData` when fewer than `min_candle_fraction` of the
    /// required candles exist, or `StaleData` when most candles saw no ticks.
    pub fn validate(&self, candles: &[Candle], min_candles: usize) -> Result<(), CandleError> {
        let required = (min_candles as f64 * self.min_candle_fraction) as usize;
        if candles.len() < required {
            return Err(CandleError::InsufficientData {
                candles: candles.len(),
                required,
            });
        }

        let zero_volume = candles.iter().filter(|candle| candle.tick_count == 0).count();
        if zero_volume as f64 > candles.len() as f64 * self.max_zero_volume_fraction {
            return Err(CandleError::StaleData {
                zero_volume,
                total: candles.len(),
            });
        }

        Ok(())
    }
}

impl Default for TimeframeTable {
    fn default() -> Self {
        Self {
            forex: HorizonTiers::new(
                [
                    (900, TimeframeConfig::new(60, 15, 50)),
                    (1800, TimeframeConfig::new(120, 18, 60)),
                ],
                TimeframeConfig::new(300, 20, 80),
            ),
            synthetic: HorizonTiers::new(
                [
                    (60, TimeframeConfig::new(5, 15, 40)),
                    (180, TimeframeConfig::new(10, 20, 50)),
                ],
                TimeframeConfig::new(30, 25, 60),
            ),
            forex_tick_margin: 5,
            synthetic_tick_margin: 10,
            min_candle_fraction: 0.8,
            max_zero_volume_fraction: 0.5,
        }
    }
}

/// Incremental candle builder. Emits the previous candle whenever a tick lands in a
/// different bucket.
#[derive(Debug)]
pub struct CandleAggregator {
    period_ms: i64,
    current: Option<Candle>,
}

impl CandleAggregator {
    pub fn new(period_ms: i64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            current: None,
        }
    }

    /// Truncate timestamp to the bucket start.
    #[inline]
    fn align(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let ms = timestamp.timestamp_millis();
        let aligned = ms - ms.rem_euclid(self.period_ms);
        DateTime::from_timestamp_millis(aligned).unwrap_or(timestamp)
    }

    /// Returns `Some(candle)` when a bucket completes.
    pub fn update(&mut self, tick: &Tick) -> Option<Candle> {
        let bucket = self.align(tick.timestamp);

        match self.current.as_mut() {
            Some(candle) if candle.period_start == bucket => {
                candle.high = candle.high.max(tick.price);
                candle.low = candle.low.min(tick.price);
                candle.close = tick.price;
                candle.tick_count += 1;
                None
            }
            _ => self
                .current
                .replace(Self::open(tick.instrument.clone(), tick.price, bucket)),
        }
    }

    /// Close the in-progress candle.
    pub fn flush(&mut self) -> Option<Candle> {
        self.current.take()
    }

    fn open(instrument: SmolStr, price: f64, bucket: DateTime<Utc>) -> Candle {
        Candle::new(instrument, price, price, price, price, 1, bucket)
    }
}

/// Group ticks into fixed-width candles. The trailing partial candle is included.
pub fn to_candles(ticks: &[Tick], period_ms: i64) -> Vec<Candle> {
    let mut aggregator = CandleAggregator::new(period_ms);
    let mut candles = ticks
        .iter()
        .filter_map(|tick| aggregator.update(tick))
        .collect::<Vec<_>>();
    candles.extend(aggregator.flush());
    candles
}

/// Project each candle close back into a synthetic tick for indicator reuse.
pub fn candles_to_ticks(candles: &[Candle]) -> Vec<Tick> {
    candles
        .iter()
        .map(|candle| Tick::new(candle.instrument.clone(), candle.close, candle.period_start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::SpikeSide;
    use chrono::TimeZone;

    fn tick_at(ms: i64, price: f64) -> Tick {
        Tick::new(
            "volatility_75_1s",
            price,
            Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap(),
        )
    }

    #[test]
    fn test_single_bucket_candle() {
        let ticks = vec![
            tick_at(0, 100.0),
            tick_at(1000, 103.0),
            tick_at(2000, 98.5),
            tick_at(4999, 101.0),
        ];

        let candles = to_candles(&ticks, 5000);

        assert_eq!(candles.len(), 1);
        let candle = &candles[0];
        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.high, 103.0);
        assert_eq!(candle.low, 98.5);
        assert_eq!(candle.close, 101.0);
        assert_eq!(candle.tick_count, 4);
    }

    #[test]
    fn test_bucket_transitions() {
        struct TestCase {
            input: Vec<Tick>,
            expected: Vec<(f64, f64, usize)>,
        }

        let tests = vec![
            TestCase {
                // TC0: empty input
                input: vec![],
                expected: vec![],
            },
            TestCase {
                // TC1: two buckets
                input: vec![tick_at(0, 1.0), tick_at(4000, 2.0), tick_at(5000, 3.0)],
                expected: vec![(1.0, 2.0, 2), (3.0, 3.0, 1)],
            },
            TestCase {
                // TC2: gap skips a bucket without emitting empty candles
                input: vec![tick_at(0, 1.0), tick_at(12_000, 2.0)],
                expected: vec![(1.0, 1.0, 1), (2.0, 2.0, 1)],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = to_candles(&test.input, 5000)
                .into_iter()
                .map(|candle| (candle.open, candle.close, candle.tick_count))
                .collect::<Vec<_>>();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_candle_alignment() {
        let mut aggregator = CandleAggregator::new(5000);
        assert!(aggregator.update(&tick_at(2_500, 1.0)).is_none());

        let candle = aggregator.flush().unwrap();
        assert_eq!(candle.period_start.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_candles_to_ticks_uses_close() {
        let candles = to_candles(&[tick_at(0, 1.0), tick_at(1000, 2.0)], 5000);
        let ticks = candles_to_ticks(&candles);

        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].price, 2.0);
        assert_eq!(ticks[0].timestamp, candles[0].period_start);
    }

    #[test]
    fn test_timeframe_select() {
        struct TestCase {
            input: (MarketCategory, u32),
            expected: (u64, usize),
        }

        let table = TimeframeTable::default();
        let tests = vec![
            TestCase {
                // TC0: one minute synthetic
                input: (MarketCategory::Volatility, 60),
                expected: (5, 15),
            },
            TestCase {
                // TC1: three minute crash/boom
                input: (MarketCategory::CrashBoom(SpikeSide::Boom), 180),
                expected: (10, 20),
            },
            TestCase {
                // TC2: long synthetic
                input: (MarketCategory::Volatility, 600),
                expected: (30, 25),
            },
            TestCase {
                // TC3: fifteen minute forex
                input: (MarketCategory::Forex, 900),
                expected: (60, 15),
            },
            TestCase {
                // TC4: thirty minute forex
                input: (MarketCategory::Forex, 1800),
                expected: (120, 18),
            },
            TestCase {
                // TC5: hour forex
                input: (MarketCategory::Forex, 3600),
                expected: (300, 20),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let timeframe = table.select(test.input.0, test.input.1);
            let actual = (timeframe.candle_period_secs, timeframe.min_candles);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_minimum_ticks() {
        let table = TimeframeTable::default();
        let synthetic = table.select(MarketCategory::Volatility, 60).clone();
        let forex = table.select(MarketCategory::Forex, 900).clone();

        assert_eq!(table.minimum_ticks(MarketCategory::Volatility, &synthetic), 25);
        assert_eq!(table.minimum_ticks(MarketCategory::Forex, &forex), 20);
    }

    #[test]
    fn test_validate() {
        struct TestCase {
            input: Vec<usize>,
            expected: Result<(), CandleError>,
        }

        let table = TimeframeTable::default();
        let candles = |volumes: &[usize]| {
            volumes
                .iter()
                .enumerate()
                .map(|(i, volume)| {
                    let mut candle = to_candles(&[tick_at(i as i64 * 5000, 1.0)], 5000)
                        .pop()
                        .unwrap();
                    candle.tick_count = *volume;
                    candle
                })
                .collect::<Vec<_>>()
        };

        let tests = vec![
            TestCase {
                // TC0: 12 of 15 required is exactly 80%
                input: vec![1; 12],
                expected: Ok(()),
            },
            TestCase {
                // TC1: 11 of 15 required
                input: vec![1; 11],
                expected: Err(CandleError::InsufficientData {
                    candles: 11,
                    required: 12,
                }),
            },
            TestCase {
                // TC2: majority zero volume
                input: [vec![0; 7], vec![1; 5]].concat(),
                expected: Err(CandleError::StaleData {
                    zero_volume: 7,
                    total: 12,
                }),
            },
            TestCase {
                // TC3: exactly half zero volume is tolerated
                input: [vec![0; 6], vec![1; 6]].concat(),
                expected: Ok(()),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = table.validate(&candles(&test.input), 15);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
