//! Claim market service entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

use claim_market::api::{create_router, AppState};
use claim_market::auth::AllowList;
use claim_market::config::Config;
use claim_market::market::MarketEngine;
use claim_market::metrics;
use claim_market::oracle::{LocalOracle, LocalOracleConfig, OracleAdapter};
use claim_market::treasury::InMemoryTreasury;

/// Binary prediction market engine.
#[derive(Parser, Debug)]
#[command(name = "claim-market")]
#[command(about = "Binary prediction market engine with optimistic-oracle resolution")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine, the HTTP API and the oracle liveness driver (default).
    Serve {
        /// HTTP server port; overrides PORT.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();
    let config = Config::load();

    // Initialize logging; defaults apply until the configuration loads
    let (directive, json) = match &config {
        Ok(c) => (c.log_filter(args.verbose), c.log_json),
        Err(_) if args.verbose => ("claim_market=debug,info".to_string(), false),
        Err(_) => ("info".to_string(), false),
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(config),
        Some(Command::Serve { port }) => cmd_serve(config, port).await,
        None => cmd_serve(config, None).await,
    }
}

/// Check configuration validity.
fn cmd_check_config(loaded: Result<Config, envy::Error>) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("CLAIM MARKET - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match loaded {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    let authorized = config.authorized()?;
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Engine Address: {}", config.engine()?);
    println!("  Oracle Address: {}", config.oracle()?);
    println!("  Authorized Callers: {}", authorized.len());
    println!("  Bond Currency: {}", config.bond_currency);
    println!("  Oracle Minimum Bond: {}", config.oracle_minimum_bond);
    println!("  Liveness: {}s", config.assertion_liveness_seconds);
    println!("  Identifier: {}", config.assertion_identifier);
    println!("  Venue Fee: {} bps", config.amm_fee_bps);
    println!("  Virtual Liquidity: {}", config.amm_virtual_liquidity);
    println!("  Initial Balance: {}", config.initial_balance);
    println!("  Log Filter: {} (json: {})", config.rust_log, config.log_json);
    if authorized.is_empty() {
        println!("  WARNING: AUTHORIZED_CALLERS is empty; every mutating call will be rejected");
    }
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Run the engine behind the HTTP surface until shutdown.
async fn cmd_serve(loaded: Result<Config, envy::Error>, port_override: Option<u16>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = loaded.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    let port = port_override.unwrap_or(config.port);
    let engine_address = config.engine()?;
    let oracle_address = config.oracle()?;
    let callers = config.authorized()?;
    info!(
        engine = %engine_address,
        oracle = %oracle_address,
        authorized = callers.len(),
        fee_bps = config.amm_fee_bps,
        "Configuration loaded successfully"
    );

    // Initialize metrics
    let prometheus = PrometheusBuilder::new().install_recorder()?;
    metrics::init_metrics();

    let treasury = Arc::new(InMemoryTreasury::new(engine_address));
    if config.initial_balance > 0 {
        for caller in &callers {
            treasury.deposit(*caller, u128::from(config.initial_balance))?;
        }
        info!(accounts = callers.len(), amount = config.initial_balance, "Funded authorized callers");
    }

    let oracle = Arc::new(LocalOracle::with_config(
        oracle_address,
        Arc::new(treasury.account(oracle_address)),
        LocalOracleConfig {
            minimum_bond: u128::from(config.oracle_minimum_bond),
            ..Default::default()
        },
    ));
    let authorized: AllowList = callers.into_iter().collect();
    let engine = Arc::new(RwLock::new(MarketEngine::new(
        config.engine_config()?,
        Arc::new(authorized),
        oracle.clone(),
        treasury.clone(),
    )));

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let state = AppState::new(engine.clone())
        .with_oracle(oracle.clone())
        .with_treasury(treasury)
        .with_metrics(prometheus);
    let router = create_router(state);
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let interval = Duration::from_secs(config.oracle_poll_interval_seconds);
    tokio::select! {
        _ = drive_liveness(engine, oracle, interval) => {}
        _ = shutdown_signal() => info!("Shutdown signal received"),
    }

    match server.await {
        Ok(Ok(())) => info!("HTTP server stopped"),
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }
    Ok(())
}

/// Deliver resolution callbacks for assertions whose liveness has passed.
async fn drive_liveness(engine: Arc<RwLock<MarketEngine>>, oracle: Arc<LocalOracle>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let callbacks = oracle.expired();
        if callbacks.is_empty() {
            continue;
        }

        let mut engine = engine.write().await;
        for callback in callbacks {
            match engine.handle_callback(oracle.address(), callback) {
                Ok(()) => debug!(assertion = %callback.assertion(), "callback delivered"),
                Err(e) if e.is_fatal() => error!(error = %e, "callback hit an integrity violation"),
                Err(e) => warn!(error = %e, assertion = %callback.assertion(), "callback rejected"),
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
