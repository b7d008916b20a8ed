//! Per-instrument request caps over a rolling one minute window.

use crate::{config::RateLimitConfig, error::PredictorError, instrument::MarketCategory};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Copy, Clone)]
struct Window {
    start: Instant,
    count: u32,
}

/// Counts requests per instrument. The first request opens a window, which resets
/// once `window` has elapsed since it opened.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<FnvHashMap<SmolStr, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Record one request, or refuse it with [`PredictorError::RateLimitExceeded`]
    /// once the instrument's cap is reached for the current window.
    pub fn try_acquire(&self, instrument: &SmolStr, category: MarketCategory) -> Result<(), PredictorError> {
        self.try_acquire_at(instrument, category, Instant::now())
    }

    pub fn try_acquire_at(
        &self,
        instrument: &SmolStr,
        category: MarketCategory,
        now: Instant,
    ) -> Result<(), PredictorError> {
        let limit = self.config.limit_for(category);
        let window_len = self.config.window();

        let mut windows = self.windows.lock();
        let window = windows.entry(instrument.clone()).or_insert(Window { start: now, count: 0 });

        if now.saturating_duration_since(window.start) >= window_len {
            *window = Window { start: now, count: 0 };
        }

        if window.count >= limit {
            warn!(%instrument, limit, "prediction rate limit exceeded");
            return Err(PredictorError::RateLimitExceeded {
                instrument: instrument.clone(),
                limit,
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Requests remaining in the instrument's current window.
    pub fn remaining_at(&self, instrument: &str, category: MarketCategory, now: Instant) -> u32 {
        let limit = self.config.limit_for(category);
        match self.windows.lock().get(instrument) {
            Some(window) if now.saturating_duration_since(window.start) < self.config.window() => {
                limit.saturating_sub(window.count)
            }
            _ => limit,
        }
    }

    /// Drop windows that have fully elapsed. Returns the number removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    pub fn prune_at(&self, now: Instant) -> usize {
        let window_len: Duration = self.config.window();
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, window| now.saturating_duration_since(window.start) < window_len);
        before - windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    #[test]
    fn test_cap_per_category() {
        struct TestCase {
            input: (&'static str, MarketCategory),
            expected: u32,
        }

        let tests = vec![
            TestCase {
                // TC0: synthetic index
                input: ("volatility_75_1s", MarketCategory::Volatility),
                expected: 30,
            },
            TestCase {
                // TC1: currency pair
                input: ("frxEURUSD", MarketCategory::Forex),
                expected: 20,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let limiter = limiter();
            let now = Instant::now();
            let (instrument, category) = test.input;
            let instrument = SmolStr::new(instrument);

            let accepted = (0..test.expected + 5)
                .take_while(|_| limiter.try_acquire_at(&instrument, category, now).is_ok())
                .count() as u32;

            assert_eq!(accepted, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_refusal_then_reset() {
        let limiter = limiter();
        let instrument = SmolStr::new("frxGBPUSD");
        let start = Instant::now();

        for _ in 0..20 {
            limiter.try_acquire_at(&instrument, MarketCategory::Forex, start).unwrap();
        }

        let refused = limiter
            .try_acquire_at(&instrument, MarketCategory::Forex, start + Duration::from_secs(59))
            .unwrap_err();
        assert!(refused.is_rate_limited());
        assert_eq!(
            refused,
            PredictorError::RateLimitExceeded {
                instrument: instrument.clone(),
                limit: 20
            }
        );

        let reset = start + Duration::from_secs(60);
        assert!(limiter.try_acquire_at(&instrument, MarketCategory::Forex, reset).is_ok());
        assert_eq!(limiter.remaining_at(&instrument, MarketCategory::Forex, reset), 19);
    }

    #[test]
    fn test_instruments_are_independent() {
        let limiter = limiter();
        let now = Instant::now();
        let busy = SmolStr::new("frxEURUSD");
        let quiet = SmolStr::new("frxUSDJPY");

        for _ in 0..20 {
            limiter.try_acquire_at(&busy, MarketCategory::Forex, now).unwrap();
        }

        assert!(limiter.try_acquire_at(&busy, MarketCategory::Forex, now).is_err());
        assert!(limiter.try_acquire_at(&quiet, MarketCategory::Forex, now).is_ok());
    }

    #[test]
    fn test_prune() {
        let limiter = limiter();
        let start = Instant::now();
        limiter
            .try_acquire_at(&SmolStr::new("crash_500"), MarketCategory::Volatility, start)
            .unwrap();
        limiter
            .try_acquire_at(
                &SmolStr::new("boom_500"),
                MarketCategory::Volatility,
                start + Duration::from_secs(30),
            )
            .unwrap();

        assert_eq!(limiter.prune_at(start + Duration::from_secs(61)), 1);
        assert_eq!(limiter.prune_at(start + Duration::from_secs(91)), 1);
        assert_eq!(limiter.prune_at(start + Duration::from_secs(91)), 0);
    }
}
