//! Pay-per-scan token risk analysis from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Pay for and run a basic scan of a token on Ethereum
//! memescan scan 0x6982508145454ce325ddbe47a25d4ec3d2311933 --chain 1
//!
//! # Fetch the analysis again for a purchase that already went through
//! memescan retry-analysis 0x... --token 0x... --chain 1 --tier basic
//!
//! # Follow market data until Ctrl-C
//! memescan prices --watch
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - path to the JSON configuration file (default: `memescan.json`)
//! - `MEMESCAN_PRIVATE_KEY`, `MEMESCAN_BACKEND_URL`, `MEMESCAN_API_KEY` - override the file
//! - `RUST_LOG` - log level filter (default: `info`)

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::TxHash;
use clap::{Parser, Subcommand};
use memescan::chain::ChainId;
use memescan::gateway::PaymentTokenGateway;
use memescan::orchestrator::ScanRequest;
use memescan::proto::{PurchaseReceipt, ScanTier, parse_token_address};
use memescan_cli::app::{self, App};
use memescan_cli::config::{DEFAULT_CONFIG_PATH, MemescanConfig};
use memescan_cli::prompt::TerminalPrompt;
use memescan_cli::render;
use memescan_cli::util::SigDown;
use memescan_http::feed::MarketFeed;

#[derive(Debug, Parser)]
#[command(name = "memescan", version, about = "Pay for and read token risk scans")]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Approve every wallet prompt without asking.
    #[arg(short = 'y', long)]
    yes: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pay for a scan and print the report.
    Scan {
        /// Token contract address.
        token: String,
        /// Chain the token lives on.
        #[arg(long, default_value_t = 1)]
        chain: ChainId,
        /// Scan tier (basic or full).
        #[arg(long, default_value = "basic")]
        tier: ScanTier,
    },
    /// Request the analysis for an already paid purchase.
    RetryAnalysis {
        /// Purchase transaction hash.
        transaction: TxHash,
        /// Token contract address.
        #[arg(long)]
        token: String,
        /// Chain the token lives on.
        #[arg(long)]
        chain: ChainId,
        /// Scan tier that was paid for.
        #[arg(long)]
        tier: ScanTier,
    },
    /// Show past scans.
    History {
        /// Show the full report of one purchase.
        #[arg(long)]
        tx: Option<TxHash>,
    },
    /// Show current tier prices from the purchase contract.
    Price,
    /// Show the wallet's payment token balance.
    Balance,
    /// Switch the wallet to another chain, adding it first if needed.
    Switch {
        /// Target chain id.
        chain: ChainId,
    },
    /// List known chains.
    Chains,
    /// Show platform statistics.
    Stats,
    /// Show crypto spot prices.
    Prices {
        /// Keep refreshing until interrupted.
        #[arg(long)]
        watch: bool,
    },
    /// Show trending tokens.
    Trending,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    #[cfg(feature = "telemetry")]
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        #[cfg(feature = "telemetry")]
        tracing::error!("memescan failed: {e}");
        #[cfg(not(feature = "telemetry"))]
        let _ = writeln!(io::stderr(), "memescan failed: {e}");
        std::process::exit(1);
    }
}

fn emit(text: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes())?;
    out.flush()
}

fn build(config: MemescanConfig, assume_yes: bool) -> Result<App, app::AppError> {
    App::build(config, Arc::new(TerminalPrompt::new(assume_yes)))
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = MemescanConfig::load_from(&cli.config)?;
    #[cfg(feature = "telemetry")]
    tracing::debug!(
        path = %cli.config.display(),
        settlement = config.settlement_chain,
        backend = %config.backend_url,
        "Loaded configuration"
    );

    match cli.command {
        Command::Scan { token, chain, tier } => {
            let app = build(config, cli.yes)?;
            app.session().connect().await?;
            let orchestrator = app.orchestrator()?;
            let request = ScanRequest {
                token_address: token,
                chain_id: chain,
                tier,
            };
            match orchestrator.purchase_and_analyze(&request).await {
                Ok(outcome) => emit(&render::outcome(&outcome, app.settlement()))?,
                Err(err) => {
                    emit(&render::failure(&err, app.settlement()))?;
                    return Err(err.into());
                }
            }
        }
        Command::RetryAnalysis {
            transaction,
            token,
            chain,
            tier,
        } => {
            if let Some(entry) = app::history_store(&config).find_by_transaction(&transaction) {
                emit("Already analyzed; showing the saved report.\n")?;
                emit(&render::report(&entry.report))?;
                return Ok(());
            }
            let token_address = parse_token_address(&token)?;
            let app = build(config, cli.yes)?;
            let connection = app.session().connect().await?;
            let receipt = PurchaseReceipt {
                transaction_hash: transaction,
                buyer: connection.address,
                token_address,
                chain_id: chain,
                tier,
            };
            let orchestrator = app.orchestrator()?;
            match orchestrator.retry_analysis(&receipt).await {
                Ok(outcome) => emit(&render::outcome(&outcome, app.settlement()))?,
                Err(err) => {
                    emit(&render::failure(&err, app.settlement()))?;
                    return Err(err.into());
                }
            }
        }
        Command::History { tx } => {
            let registry = config.registry()?;
            let store = app::history_store(&config);
            match tx {
                Some(hash) => match store.find_by_transaction(&hash) {
                    Some(entry) => emit(&render::report(&entry.report))?,
                    None => emit(&format!("No scan recorded for {hash}.\n"))?,
                },
                None => emit(&render::history(&store.load_all(), &registry))?,
            }
        }
        Command::Price => {
            let app = build(config, cli.yes)?;
            let orchestrator = app.orchestrator()?;
            for tier in [ScanTier::Basic, ScanTier::Full] {
                let line = match orchestrator.tier_price(tier).await {
                    Ok(price) => format!("{tier:<6} {price}\n"),
                    Err(err) => format!(
                        "{tier:<6} {} (contract unavailable: {err})\n",
                        tier.display_fallback_price()
                    ),
                };
                emit(&line)?;
            }
        }
        Command::Balance => {
            let app = build(config, cli.yes)?;
            let connection = app.session().connect().await?;
            let token = app.payment_token()?;
            let balance = token.balance(connection.address).await?;
            let symbol = token
                .symbol()
                .await
                .unwrap_or_else(|_| app.config().payment_token.to_uppercase());
            emit(&format!("{}\n", render::balance(&balance, &symbol)))?;
        }
        Command::Switch { chain } => {
            let app = build(config, cli.yes)?;
            app.session().connect().await?;
            app.session().switch_chain(chain).await?;
            let name = app
                .registry()
                .by_chain_id(chain)
                .map_or_else(|| chain.to_string(), ToString::to_string);
            emit(&format!("Wallet is on {name}.\n"))?;
        }
        Command::Chains => {
            let registry = config.registry()?;
            let lines: String = registry
                .chains()
                .into_iter()
                .map(|chain| {
                    let marker = if chain.chain_id == config.settlement_chain {
                        "  (payments)"
                    } else {
                        ""
                    };
                    format!("{:>6}  {}{marker}\n", chain.chain_id, chain.name)
                })
                .collect();
            emit(&lines)?;
        }
        Command::Stats => {
            let stats = app::backend_client(&config)?.stats().await?;
            emit(&render::stats(&stats))?;
        }
        Command::Prices { watch: false } => {
            let prices = app::backend_client(&config)?.crypto_prices().await?;
            emit(&render::prices(&prices))?;
        }
        Command::Prices { watch: true } => {
            let client = app::backend_client(&config)?;
            let sig_down = SigDown::try_new()?;
            let cancel = sig_down.cancellation_token();
            let (mut snapshots, feed) = MarketFeed::new(client).spawn(cancel.clone());
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let prices = snapshots.borrow_and_update().prices.clone();
                        emit(&render::prices(&prices))?;
                        emit("\n")?;
                    }
                }
            }
            sig_down.shutdown().await;
            feed.await?;
        }
        Command::Trending => {
            let trending = app::backend_client(&config)?.trending().await?;
            emit(&render::trending(&trending))?;
        }
    }
    Ok(())
}
