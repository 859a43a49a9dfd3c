//! PocketGrant wallet companion: entry point.
//!
//! Serves the grant flows (create, claim, gift, request, admin verify,
//! provider management) over a small Axum REST API, tracking every write
//! through its transaction lifecycle. A background task indexes the
//! contract's `ProgramCreated` and `Claimed` events into SQLite.

mod abi;
mod api;
mod chain;
mod classify;
mod config;
mod context;
mod db;
mod errors;
mod events;
mod flows;
mod guards;
mod indexer;
mod notify;
mod reads;
mod routes;
mod rpc;
mod sponsor;
#[cfg(test)]
mod testutil;
mod tx;
mod types;
mod units;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use api::ApiState;
use config::Config;
use context::AppContext;
use flows::FlowEnv;
use indexer::Indexer;
use rpc::RpcChain;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load optional .env file (ignored if missing) so RUST_LOG can live there.
    let _ = dotenvy::dotenv();

    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(
        chain_id = config.chain_id,
        grant = %config.grant_address,
        wallet = config.wallet_rpc_url.is_some(),
        sponsored = config.paymaster_url.is_some(),
        "PocketGrant starting"
    );

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared by network reads, wallet calls and the indexer.
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    let chain = Arc::new(RpcChain::new(client, &config));

    let ctx = AppContext::init(config.clone());
    let env = FlowEnv::new(ctx, chain.clone());
    let shutdown = CancellationToken::new();

    // ─── Background indexer ───────────────────────────────
    let indexer = Indexer::new(pool.clone(), chain, &config);
    let indexer_task = tokio::spawn(indexer.run(shutdown.clone()));

    // ─── REST API ─────────────────────────────────────────
    let app = api::router(Arc::new(ApiState { env, pool }));

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    indexer_task.await?;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler, run until killed.
        tracing::error!("Could not listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
    shutdown.cancel();
}
