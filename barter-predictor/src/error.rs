use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// All caller-visible errors generated in `barter-predictor`.
///
/// Heuristic "no trade" outcomes are never errors, they are returned as a neutral
/// [`Prediction`](crate::model::Prediction) carrying a reason.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum PredictorError {
    #[error("rate limit exceeded for {instrument}: max {limit} predictions per minute")]
    RateLimitExceeded { instrument: SmolStr, limit: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PredictorError {
    /// Determine if the error is a transient per-instrument rate limit refusal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PredictorError::RateLimitExceeded { .. })
    }
}

/// Candle quality failures detected before any indicator runs.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum CandleError {
    #[error("insufficient_candles")]
    InsufficientData { candles: usize, required: usize },

    #[error("stale_data")]
    StaleData { zero_volume: usize, total: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_rate_limited() {
        struct TestCase {
            input: PredictorError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: rate limit refusal
                input: PredictorError::RateLimitExceeded {
                    instrument: SmolStr::new("volatility_75_1s"),
                    limit: 30,
                },
                expected: true,
            },
            TestCase {
                // TC1: configuration error
                input: PredictorError::InvalidConfig("max_ticks must be > 0".to_string()),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.is_rate_limited();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_error_display() {
        let error = PredictorError::RateLimitExceeded {
            instrument: SmolStr::new("frxEURUSD"),
            limit: 20,
        };
        assert_eq!(
            error.to_string(),
            "rate limit exceeded for frxEURUSD: max 20 predictions per minute"
        );
        assert_eq!(
            CandleError::StaleData {
                zero_volume: 6,
                total: 10
            }
            .to_string(),
            "stale_data"
        );
    }
}
