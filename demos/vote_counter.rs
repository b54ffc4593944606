//! Counts votes delivered by nsqd and writes the totals to the poll
//! database every flush interval.

use std::sync::Arc;

use anyhow::Context;
use ballots::{
    shutdown::{shutdown_signal, Coordinator},
    sqlite::{open_pool, SqlitePollStore},
    transport::nsq::NsqConsumer,
    Aggregator, Config, Flusher, Tally, COUNTER_CHANNEL, VOTES_TOPIC,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let pool = open_pool(&config.database_url)
        .await
        .context("failed to open the poll database")?;
    let store = Arc::new(SqlitePollStore::new(pool.clone()));

    let tally = Arc::new(Tally::new());
    let aggregator = Arc::new(Aggregator::new(Arc::clone(&tally)));
    let subscription = NsqConsumer::subscribe(
        config.nsqd_addr.as_str(),
        VOTES_TOPIC,
        COUNTER_CHANNEL,
        config.max_in_flight,
        aggregator,
    )
    .await
    .context("failed to subscribe to nsqd")?;
    let flusher = Flusher::new(tally, store, config.flush_interval).run();

    Coordinator::new()
        .with_consumer(flusher, subscription)
        .run(shutdown_signal())
        .await;
    info!("Counter stopped");

    pool.close().await;
    Ok(())
}
