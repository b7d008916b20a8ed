use barter_predictor::{Predictor, PredictorConfig, Tick};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::{future::Future, pin::pin, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    time::interval,
};
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, error, info, warn};

/// One line of the JSON-lines tick feed.
///
/// Missing timestamps are stamped on arrival.
#[derive(Debug, Clone, Deserialize)]
struct TickMessage {
    #[serde(alias = "symbol")]
    instrument: String,
    #[serde(alias = "quote")]
    price: f64,
    #[serde(default, alias = "epoch", with = "epoch_or_rfc3339")]
    timestamp: Option<DateTime<Utc>>,
}

impl From<TickMessage> for Tick {
    fn from(message: TickMessage) -> Self {
        Tick::new(
            message.instrument,
            message.price,
            message.timestamp.unwrap_or_else(Utc::now),
        )
    }
}

/// Accepts either unix seconds or an RFC3339 string.
mod epoch_or_rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Epoch(i64),
        Text(DateTime<Utc>),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Epoch(secs)) => DateTime::from_timestamp(secs, 0),
            Some(Raw::Text(timestamp)) => Some(timestamp),
            None => None,
        })
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    init_logging();

    info!("Starting barter-predictor server");

    let config = load_config();
    let horizon_secs: u32 = env_or("PREDICT_HORIZON_SECS", 60);
    let predict_interval_secs: u64 = env_or("PREDICT_INTERVAL_SECS", 30);

    let predictor = match Predictor::new(config) {
        Ok(predictor) => Arc::new(predictor),
        Err(error) => {
            error!(%error, "invalid predictor configuration");
            return;
        }
    };
    let maintenance = predictor.spawn_maintenance();

    info!(
        horizon_secs,
        predict_interval_secs, "Reading JSON-lines ticks from stdin"
    );

    let feed = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to listen for ctrl-c");
        }
    };
    run(
        &predictor,
        feed,
        shutdown,
        horizon_secs,
        Duration::from_secs(predict_interval_secs.max(1)),
    )
    .await;

    info!("{}", predictor.performance_summary());
    maintenance.iter().for_each(|handle| handle.abort());
}

/// Ingest `feed` and predict every `predict_interval` until `shutdown` completes.
///
/// Predictions continue after the feed closes so pending predictions still settle.
async fn run<Feed, Shutdown>(
    predictor: &Predictor,
    feed: Feed,
    shutdown: Shutdown,
    horizon_secs: u32,
    predict_interval: Duration,
) where
    Feed: Stream<Item = std::io::Result<String>>,
    Shutdown: Future<Output = ()>,
{
    let mut feed = pin!(feed);
    let mut shutdown = pin!(shutdown);
    let mut feed_open = true;
    let mut predict_timer = interval(predict_interval);

    loop {
        tokio::select! {
            line = feed.next(), if feed_open => match line {
                Some(Ok(line)) => ingest(predictor, &line),
                Some(Err(error)) => warn!(%error, "failed to read tick feed"),
                None => {
                    info!("Tick feed closed, continuing to predict and settle");
                    feed_open = false;
                }
            },
            _ = predict_timer.tick() => predict_cycle(predictor, horizon_secs),
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }
}

fn ingest(predictor: &Predictor, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match serde_json::from_str::<TickMessage>(line) {
        Ok(message) => {
            let category = predictor.add_tick(Tick::from(message));
            debug!(%category, "tick ingested");
        }
        Err(error) => warn!(%error, line, "skipping malformed tick"),
    }
}

fn predict_cycle(predictor: &Predictor, horizon_secs: u32) {
    let predictions = predictor.predict_all(horizon_secs);
    let directional = predictions
        .values()
        .filter(|prediction| prediction.is_directional())
        .count();

    info!(
        instruments = predictions.len(),
        directional,
        pending = predictor.tracker().pending_count(),
        "Prediction cycle complete"
    );

    for prediction in predictions.values().filter(|prediction| prediction.is_directional()) {
        info!(
            instrument = %prediction.instrument,
            direction = %prediction.direction,
            confidence = format!("{:.1}%", prediction.confidence * 100.0),
            price = prediction.current_price,
            "{}",
            prediction.reason
        );
    }
}

/// Default configuration with a handful of environment overrides.
fn load_config() -> PredictorConfig {
    let mut config = PredictorConfig::default();

    config.storage.max_ticks = env_or("MAX_TICKS", config.storage.max_ticks);
    config.storage.prediction_retention_hours = env_or(
        "PREDICTION_RETENTION_HOURS",
        config.storage.prediction_retention_hours,
    );
    config.rate_limit.synthetics_per_minute = env_or(
        "SYNTHETICS_PER_MINUTE",
        config.rate_limit.synthetics_per_minute,
    );
    config.rate_limit.forex_per_minute =
        env_or("FOREX_PER_MINUTE", config.rate_limit.forex_per_minute);
    config.tracking.stake = env_or("STAKE", config.tracking.stake);
    config.tracking.payout_ratio = env_or("PAYOUT_RATIO", config.tracking.payout_ratio);
    config.tracking.summary_interval_secs =
        env_or("SUMMARY_INTERVAL_SECS", config.tracking.summary_interval_secs);

    config
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_message_parsing() {
        struct TestCase {
            input: &'static str,
            expected: Option<(&'static str, f64, Option<i64>)>,
        }

        let tests = vec![
            TestCase {
                // TC0: canonical fields with unix seconds
                input: r#"{"instrument":"volatility_75_1s","price":1234.5,"timestamp":1700000000}"#,
                expected: Some(("volatility_75_1s", 1234.5, Some(1_700_000_000))),
            },
            TestCase {
                // TC1: feed style aliases with RFC3339
                input: r#"{"symbol":"frxEURUSD","quote":1.0855,"epoch":"2023-11-14T22:13:20Z"}"#,
                expected: Some(("frxEURUSD", 1.0855, Some(1_700_000_000))),
            },
            TestCase {
                // TC2: timestamp omitted
                input: r#"{"instrument":"crash_500","price":8000.0}"#,
                expected: Some(("crash_500", 8000.0, None)),
            },
            TestCase {
                // TC3: missing price
                input: r#"{"instrument":"crash_500"}"#,
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = serde_json::from_str::<TickMessage>(test.input)
                .ok()
                .map(|message| {
                    (
                        message.instrument,
                        message.price,
                        message.timestamp.map(|timestamp| timestamp.timestamp()),
                    )
                });
            let expected = test
                .expected
                .map(|(instrument, price, timestamp)| (instrument.to_string(), price, timestamp));
            assert_eq!(actual, expected, "TC{} failed", index);
        }
    }

    #[tokio::test]
    async fn test_run_ingests_feed_until_shutdown() {
        let predictor = Predictor::new(PredictorConfig::default()).unwrap();
        let feed = futures::stream::iter(
            [
                r#"{"instrument":"volatility_75_1s","price":1234.5,"timestamp":1700000000}"#,
                "not a tick",
                "",
                r#"{"symbol":"frxEURUSD","quote":1.0855}"#,
                r#"{"instrument":"volatility_75_1s","price":1234.7,"timestamp":1700000001}"#,
            ]
            .map(|line| Ok::<_, std::io::Error>(line.to_string())),
        );

        // Completes once every valid tick has been ingested, well after the feed closes
        let shutdown = async {
            while predictor.store().tick_count("volatility_75_1s") < 2
                || predictor.store().tick_count("frxEURUSD") < 1
            {
                tokio::task::yield_now().await;
            }
        };

        run(&predictor, feed, shutdown, 60, Duration::from_secs(60)).await;

        assert_eq!(predictor.store().latest_price("volatility_75_1s"), Some(1234.7));
        assert_eq!(predictor.store().latest_price("frxEURUSD"), Some(1.0855));
        assert_eq!(predictor.store().active_instruments().len(), 2);
    }
}
