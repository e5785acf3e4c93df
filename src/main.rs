use eyre::WrapErr;
use nightscout_exporter::{Config, exporter, init_tracing, shutdown_signal};
use tokio::{net::TcpListener, select};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Loaded before tracing so that RUST_LOG and LOG_FORMAT can come from it.
    let dotenv = dotenvy::dotenv();

    let provider = init_tracing()?;

    // A missing .env file is fine; everything can come from the environment.
    match dotenv {
        Err(err) if !err.not_found() => warn!(%err, "ignoring unreadable .env file"),
        _ => {}
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "invalid configuration");
            return Err(err).wrap_err("failed to load configuration");
        }
    };
    info!(
        endpoint = %config.source_label(),
        standard = %config.standard,
        token = config.nightscout_token.is_some(),
        timeout_secs = config.request_timeout.as_secs_f64(),
        "starting nightscout exporter"
    );

    let exposition = exporter(&config)?;
    let listener = TcpListener::bind(config.listen_address.as_str())
        .await
        .wrap_err_with(|| format!("failed to bind {}", config.listen_address))?;

    let served = select! {
        res = exposition.serve(listener) => res.wrap_err("exposition server stopped"),
        _ = shutdown_signal() => {
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    };

    // Give the batch exporter a chance to flush remaining spans.
    if let Some(provider) = provider {
        provider.shutdown()?;
    }
    served
}
