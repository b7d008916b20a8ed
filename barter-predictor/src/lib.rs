#![forbid(unsafe_code)]

//! # Barter-Predictor
//! Tick-driven directional prediction engine.
//!
//! Ticks for many instruments are kept in a bounded [`TickStore`](store::TickStore).
//! On request, the [`Predictor`](engine::Predictor) aggregates an instrument's ticks
//! into candles sized for the requested horizon, computes indicators, runs the
//! category's signal generators plus the cross-cutting divergence and chart pattern
//! detectors, and reduces every signal to one [`Prediction`](model::Prediction) by a
//! weighted consensus vote with quality filters.
//!
//! Accepted directional predictions are settled against the realised price once
//! their horizon elapses, feeding rolling per-instrument [`Stats`](model::Stats).
//!
//! ## Example
//! ```rust,no_run
//! use barter_predictor::{Predictor, PredictorConfig, Tick};
//! use chrono::Utc;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let predictor = Arc::new(Predictor::new(PredictorConfig::default()).unwrap());
//!     let _maintenance = predictor.spawn_maintenance();
//!
//!     predictor.add_tick(Tick::new("volatility_75_1s", 1234.56, Utc::now()));
//!
//!     match predictor.predict("volatility_75_1s", 60) {
//!         Ok(prediction) => println!("{} {:.2}: {}", prediction.direction, prediction.confidence, prediction.reason),
//!         Err(error) => eprintln!("{error}"),
//!     }
//! }
//! ```

/// Short-lived prediction memoisation.
pub mod cache;

/// Tick to candle aggregation and per-horizon timeframes.
pub mod candle;

/// Predictor configuration and threshold tables.
pub mod config;

/// Weighted voting, pre-filters and quality filters.
pub mod consensus;

/// Request-level prediction pipeline.
pub mod engine;

/// All [`Error`](std::error::Error)s generated in Barter-Predictor.
pub mod error;

/// Technical indicators, divergence and chart pattern detection.
pub mod indicator;

/// Instrument category tags and classification.
pub mod instrument;

/// Core data model.
pub mod model;

/// Quality ranking of directional predictions.
pub mod ranking;

/// Per-instrument request caps.
pub mod rate_limit;

/// Bounded tick storage.
pub mod store;

/// Category and cross-cutting signal generators.
pub mod strategy;

/// Settlement of accepted predictions and performance statistics.
pub mod tracker;

pub use config::PredictorConfig;
pub use engine::Predictor;
pub use error::PredictorError;
pub use instrument::{MarketCategory, MarketMode, SpikeSide};
pub use model::{Candle, DecisionOutcome, Direction, Prediction, Stats, Tick, TradeResult};
