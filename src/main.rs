use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use beam_light_server::config::{DataPaths, ServerConfig};
use beam_light_server::wallet::store;
use beam_light_server::{logging, server, supervisor::Supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Usage: beam-light-server [port]
    let port_override: Option<u16> = std::env::args().nth(1).and_then(|p| p.parse().ok());

    let mut config = ServerConfig::load();
    if let Some(port) = port_override {
        config.listen_port = port;
    }

    let paths = DataPaths::resolve(&config);
    paths.ensure().context("creating data directories")?;

    logging::init_logger(paths.logs.clone())
        .map_err(|e| anyhow::anyhow!("logging init failed: {}", e))?;

    let supervisor = Arc::new(Supervisor::new(config.clone()).context("initializing supervisor")?);
    supervisor.reconcile();

    let wallets = store::list_wallets(&paths);
    log::info!("BEAM Light Wallet control server v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Data dir: {}", paths.root.display());
    log::info!(
        "Wallets: {}",
        if wallets.is_empty() {
            "none".to_string()
        } else {
            wallets.join(", ")
        }
    );
    log::info!(
        "Control API: http://127.0.0.1:{}/api/status",
        config.listen_port
    );

    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
    let result = server::serve(supervisor.clone(), addr).await;

    // The API has stopped accepting requests; bring the processes down too
    supervisor.shutdown();

    result
}
