use throttletalk_server::{ServerConfig, VoiceRelay};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let config = ServerConfig::resolve(std::env::args().skip(1), |var| std::env::var(var).ok())?;
    info!(
        host = %config.host,
        port = config.port,
        max_channels = config.max_channels,
        max_participants = config.max_participants_per_channel,
        "starting throttletalk relay"
    );

    let relay = VoiceRelay::bind(config).await?;
    relay.run(shutdown_signal()).await;

    info!("clean shutdown");
    Ok(())
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                error!(%err, "sigterm handler unavailable, falling back to ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
