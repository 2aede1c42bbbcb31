//! AIS live position service

use ais_live::{
    config::AppConfig,
    context::{AppContext, SessionSettings},
    database,
    errors::AisLiveError,
    feed::FeedClient,
    ingest, server,
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), AisLiveError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let store = database::open(&config.database).await?;
    let ctx = AppContext::new(store.clone(), SessionSettings::try_from(&config.server)?);

    let listener = TcpListener::bind(config.server.bind).await?;
    let path = config.server.path.clone();
    let server_task = tokio::spawn(async move { server::serve(listener, ctx, &path).await });

    let feed = FeedClient::connect(&config.feed).await?;
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal");
    };

    // Ingestion owns the process lifetime; the feed ending is terminal
    let result = tokio::select! {
        result = ingest::run(feed, store.as_ref(), shutdown, config.feed.close_timeout) => {
            result.map(|stats| info!("Ingestion finished: {:?}", stats))
        }
        result = server_task => {
            match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(std::io::Error::other(e).into()),
            }
        }
    };

    if let Err(e) = &result {
        error!("AIS live service stopped: {}", e);
    }
    result
}
