//! Reads votes from the stream and publishes them to nsqd until told to
//! stop.

use anyhow::Context;
use ballots::{
    shutdown::{shutdown_signal, Coordinator},
    source::{SourceContext, TweetStreamSource},
    sqlite::{open_pool, SqlitePollStore},
    transport::nsq::NsqProducer,
    vote_queue, Config, Publisher,
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
    let store = SqlitePollStore::new(pool.clone());
    // only options some poll offers are worth relaying
    let source = TweetStreamSource::from_store(
        &config.vote_stream_addr,
        &store,
        config.reconnect_interval,
    )
    .await?;

    let producer = NsqProducer::connect(config.nsqd_addr.as_str())
        .await
        .context("failed to connect to nsqd")?;
    let (votes, queue) = vote_queue(config.queue_capacity);
    let publisher = Publisher::new(producer).run(queue);
    let source = SourceContext::spawn(source, votes);

    let report = Coordinator::new()
        .with_producer(source, publisher)
        .run(shutdown_signal())
        .await;
    info!(?report, "Relay stopped");

    pool.close().await;
    Ok(())
}
