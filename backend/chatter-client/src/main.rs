use anyhow::Context;
use chatter_client::config::LogFormat;
use chatter_client::view::render_feed;
use chatter_client::{
    Config, EngineConfig, FeedEngine, FeedEvent, HttpFeedGateway, Identity, Session,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,chatter_client=debug".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn render(engine: &FeedEngine, identity: &Identity) {
    println!("Chatter");
    for view in render_feed(&engine.snapshot(), identity) {
        for line in view.to_lines() {
            println!("{}", line);
        }
        println!();
    }
}

/// Chatter feed
///
/// Headless client that keeps the shared chatter feed in sync with the
/// contents API and prints it whenever it changes. Configuration is read from
/// `CHATTER_*` environment variables (and a `.env` file if present).
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);
    tracing::info!("Starting chatter-feed v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        base_url = %config.api.base_url,
        refresh_interval_secs = config.feed.refresh_interval.as_secs(),
        policy = ?config.feed.reconcile_policy,
        "Configuration loaded"
    );

    let gateway = HttpFeedGateway::from_config(&config).context("Failed to build API client")?;
    let engine = FeedEngine::new(
        Arc::new(gateway),
        EngineConfig {
            reconcile_policy: config.feed.reconcile_policy,
            ..Default::default()
        },
    );

    let identity = match &config.session {
        Some(session) => Identity::logged_in(
            Session::new(session.user_id.clone(), session.username.clone())
                .context("Invalid session configuration")?,
        ),
        None => Identity::anonymous(),
    };

    engine.on_error(|err| {
        tracing::debug!(transient = err.is_transient(), "Feed error observed: {}", err);
    });

    let mut events = engine.subscribe();
    let poller = engine.start_polling(config.feed.refresh_interval);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            event = events.recv() => match event {
                Ok(FeedEvent::RefreshFailed { .. }) | Ok(FeedEvent::MutationFailed { .. }) => {}
                Ok(_) => render(&engine, &identity),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Render loop lagged behind feed events");
                    render(&engine, &identity);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    engine.shutdown();
    poller.shutdown().await;
    tracing::info!("chatter-feed stopped");

    Ok(())
}
