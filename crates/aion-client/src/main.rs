//! aion-client: wallet session and chain allocation tooling for AION.
//!
//! Usage:
//!   aion-client [OPTIONS] <COMMAND>
//!
//! Commands:
//!   classify     Classify a market into a chain tier (no I/O)
//!   chain-info   Show the chain assigned to a market
//!   chains       Show the backend chain registry
//!   balance      Show the platform balance of an address
//!   session      Connect a wallet and follow session events until Ctrl-C
//!
//! Options:
//!   -c, --config <FILE>         Config file path (default: config/client.toml)
//!   --backend-url <URL>         Backend API URL (overrides config)
//!   --provider-url <URL>        Wallet JSON-RPC URL (overrides config)
//!   --log-level <LEVEL>         Log level (overrides config)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use aion_common::{Address, MarketAllocationInput};

use aion_client::allocation::ChainAllocator;
use aion_client::api::{ChainClient, WalletClient};
use aion_client::config::ClientConfig;
use aion_client::provider::{RpcWalletProvider, WalletProvider};
use aion_client::session::{Session, SessionManager, SessionNotice};

/// CLI arguments for aion-client.
#[derive(Parser, Debug)]
#[command(name = "aion-client")]
#[command(about = "AION wallet session and chain allocation client")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/client.toml")]
    config: PathBuf,

    /// Backend API URL (overrides config file)
    #[arg(long)]
    backend_url: Option<String>,

    /// Wallet JSON-RPC URL (overrides config file)
    #[arg(long)]
    provider_url: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a market into a chain tier
    Classify {
        /// Total stake placed on the market
        #[arg(long)]
        stake: Decimal,

        /// Number of participants
        #[arg(long)]
        participants: u64,
    },

    /// Show the chain assigned to a market
    ChainInfo {
        market_id: String,
    },

    /// Show the backend chain registry
    Chains,

    /// Show the platform balance of a wallet address
    Balance {
        address: Address,
    },

    /// Connect a wallet and follow session events until Ctrl-C
    Session,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let args = Args::parse();

    let config_found = args.config.exists();
    let mut config = if config_found {
        ClientConfig::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        ClientConfig::default()
    };

    config.apply_env_overrides();
    config.apply_cli_overrides(args.backend_url, args.provider_url, args.log_level);

    init_logging(&config.log_level)?;
    if !config_found {
        warn!("Config file not found at {:?}, using defaults", args.config);
    }

    config.validate().context("Configuration validation failed")?;

    match args.command {
        Command::Classify {
            stake,
            participants,
        } => classify(&config, stake, participants),
        Command::ChainInfo { market_id } => chain_info(&config, &market_id).await,
        Command::Chains => chains(&config).await,
        Command::Balance { address } => balance(&config, address).await,
        Command::Session => follow_session(&config).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")
}

fn chain_client(config: &ClientConfig) -> Result<ChainClient> {
    let client =
        ChainClient::with_timeout(Some(config.backend.url.clone()), config.backend.request_timeout)
            .context("Failed to build chain client")?;
    Ok(client.with_api_key(config.backend.api_key.clone()))
}

fn classify(config: &ClientConfig, stake: Decimal, participants: u64) -> Result<()> {
    let input = MarketAllocationInput::new(stake, participants);
    let tier = aion_client::classify(&input, &config.allocation);
    println!("{} ({})", tier, tier.label());
    Ok(())
}

async fn chain_info(config: &ClientConfig, market_id: &str) -> Result<()> {
    let allocator = ChainAllocator::new(config.allocation, Arc::new(chain_client(config)?));
    let info = allocator
        .resolve_chain_info(market_id)
        .await
        .with_context(|| format!("Failed to resolve chain for market {}", market_id))?;

    println!("market:   {}", market_id);
    println!("tier:     {} ({})", info.tier, info.label());
    println!("chain_id: {}", info.chain_id);
    if let Some(app_id) = info.app_id.as_deref().filter(|id| !id.is_empty()) {
        println!("app_id:   {}", app_id);
    }
    Ok(())
}

async fn chains(config: &ClientConfig) -> Result<()> {
    let registry = chain_client(config)?
        .get_chains()
        .await
        .context("Failed to fetch chain registry")?;

    println!("main:      {}", registry.main_chain.chain_id);
    for chain in &registry.dedicated_chains {
        println!(
            "dedicated: {} (market {})",
            chain.chain_id,
            chain.market_id.as_deref().unwrap_or("-")
        );
    }
    println!(
        "thresholds: stake >= {}, participants >= {}",
        registry.thresholds.high_value_stake, registry.thresholds.high_volume_participants
    );
    if registry.thresholds != config.allocation {
        warn!(
            backend_stake = %registry.thresholds.high_value_stake,
            backend_participants = registry.thresholds.high_volume_participants,
            "Backend thresholds differ from local configuration"
        );
    }
    Ok(())
}

async fn balance(config: &ClientConfig, address: Address) -> Result<()> {
    let client = WalletClient::with_timeout(
        Some(config.backend.url.clone()),
        config.backend.request_timeout,
    )
    .context("Failed to build wallet client")?;
    let balance = client
        .get_balance(address)
        .await
        .with_context(|| format!("Failed to fetch balance for {}", address))?;

    println!("available: {}", balance.available);
    println!("staked:    {}", balance.staked);
    println!("rewards:   {}", balance.earned_rewards);
    println!("total:     {}", balance.total());
    Ok(())
}

async fn follow_session(config: &ClientConfig) -> Result<()> {
    let provider: Arc<dyn WalletProvider> = Arc::new(
        RpcWalletProvider::new(config.provider.rpc_config())
            .context("Failed to build wallet provider")?,
    );
    let balances = Arc::new(
        WalletClient::with_timeout(Some(config.backend.url.clone()), config.backend.request_timeout)
            .context("Failed to build wallet client")?,
    );

    let manager = SessionManager::new_shared(
        config.session.manager_config(),
        Some(provider),
        balances,
    );
    let mut notices = manager.notices();

    if config.session.restore_on_start {
        manager.restore().await.context("Session restore failed")?;
    }
    if !manager.is_connected() {
        info!("Requesting wallet connection");
        manager.connect().await.context("Wallet connection failed")?;
    }
    print_session(&manager.session());

    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(SessionNotice::ReloadRequired(chain_id)) => {
                    println!("wallet switched to chain {}, restart required", chain_id);
                    break;
                }
                Ok(notice) => {
                    println!("{:?}", notice);
                    print_session(&manager.session());
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Session notices lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    manager.shutdown();
    Ok(())
}

fn print_session(session: &Session) {
    println!("session:   {}", session);
    if let Some(native) = session.native_balance() {
        println!("native:    {}", native);
    }
    if let Some(balance) = session.platform_balance() {
        println!("platform:  {} available, {} staked", balance.available, balance.staked);
    }
}
