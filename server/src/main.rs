use anyhow::Context;
use crosstalk_config::load as load_config;
use crosstalk_gateway::build_router;
use crosstalk_runtime::{shutdown_signal, telemetry, RelayServices};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to set tracing subscriber")?;

    info!("starting Crosstalk relay");

    let config = load_config().context("failed to load configuration")?;
    let services = RelayServices::initialise(&config);
    let app = build_router(services.state);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server error")?;

    info!("relay shut down");
    Ok(())
}
