//! Whale Copy-Trading Bot
//!
//! Follows high win-rate whales on the swap feed, sizes every entry the same
//! and exits on profit, loss or holding-time rules.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use whale_copier::api::{
    DemoSignalSource, PaperExecutor, RandomWalkOracle, SignalSource, WhaleFeedClient,
    DEFAULT_FEED_URL,
};
use whale_copier::bot::{Bot, BotConfig};
use whale_copier::db::{Repository, SqliteRepository};
use whale_copier::models::Position;
use whale_copier::trading::{PositionLedger, TradingConfig};

/// Whale copy-trading bot CLI.
#[derive(Parser)]
#[command(name = "whalecopier")]
#[command(about = "Copy trades from high win-rate whales", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:./whalecopier.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusFilter {
    Open,
    Closed,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run {
        /// Use generated whale activity instead of the live feed
        #[arg(long)]
        demo: bool,

        /// Polling interval in seconds
        #[arg(short, long, default_value = "30")]
        interval: u64,

        /// Signals fetched per poll
        #[arg(short, long, default_value = "10")]
        batch: u32,

        /// Starting paper balance in SOL
        #[arg(long, default_value = "1")]
        balance: f64,

        /// Log decisions without trading
        #[arg(long)]
        dry_run: bool,

        /// Whale feed base URL
        #[arg(long, env = "WHALE_FEED_URL", default_value = DEFAULT_FEED_URL)]
        feed_url: String,

        /// Whale feed bearer token
        #[arg(long, env = "WHALE_FEED_TOKEN")]
        feed_token: Option<String>,
    },

    /// Show effective trading configuration
    Config,

    /// List stored positions
    Positions {
        #[arg(short, long, value_enum, default_value = "open")]
        status: StatusFilter,
    },

    /// Show performance over closed positions
    Performance,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let trading_config = TradingConfig::from_env().context("Invalid trading configuration")?;

    match cli.command {
        Commands::Run {
            demo,
            interval,
            batch,
            balance,
            dry_run,
            feed_url,
            feed_token,
        } => {
            info!(demo, interval, batch, dry_run, "Starting whale copy-trading bot");

            let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::new(&cli.database).await?);

            let bot_config = BotConfig {
                poll_interval_secs: interval,
                signal_batch_size: batch,
                dry_run,
                feed_url,
                feed_token,
                starting_balance: Decimal::try_from(balance)?,
                trading_config: trading_config.clone(),
            };

            let source: Arc<dyn SignalSource> = if demo {
                Arc::new(DemoSignalSource::new())
            } else {
                Arc::new(WhaleFeedClient::new(
                    bot_config.feed_url.clone(),
                    bot_config.feed_token.clone(),
                )?)
            };

            let oracle = Arc::new(RandomWalkOracle::new(0.05));
            let executor = Arc::new(PaperExecutor::new(
                oracle.clone(),
                bot_config.starting_balance,
                trading_config.slippage_budget_bps,
                trading_config.priority_fee_budget,
            ));

            let mut bot = Bot::new(bot_config, repo, source, executor.clone(), oracle);
            bot.initialize().await?;
            executor.restore_holdings(&bot.ledger().snapshot()).await;

            println!("\n=== Whale Copy-Trading Bot ===");
            println!("Source:           {}", if demo { "DEMO (generated whales)" } else { "Live whale feed" });
            println!("Execution:        PAPER (simulated swaps)");
            println!("Polling interval: {}s", interval);
            println!("Starting balance: {} SOL", balance);
            println!("Mode:             {}", if dry_run { "DRY RUN (no trades)" } else { "TRADING" });
            println!("\nPress Ctrl+C to stop.\n");

            if let Err(e) = bot.run().await {
                tracing::error!(error = %e, "Bot error");
            }

            // Show final stats
            let stats = bot.get_stats().await;
            println!("\n{}", stats);
        }

        Commands::Config => {
            println!("\n{}", trading_config);
        }

        Commands::Positions { status } => {
            let repo = SqliteRepository::new(&cli.database).await?;

            let mut positions = Vec::new();
            if matches!(status, StatusFilter::Open | StatusFilter::All) {
                positions.extend(repo.load_open_positions().await?);
            }
            if matches!(status, StatusFilter::Closed | StatusFilter::All) {
                positions.extend(repo.load_closed_positions().await?);
            }

            if positions.is_empty() {
                println!("No positions found. Use 'whalecopier run' to start trading.");
                return Ok(());
            }

            print_positions(&positions);
        }

        Commands::Performance => {
            let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::new(&cli.database).await?);
            let ledger = PositionLedger::new(repo);

            let metrics = ledger.load_performance_metrics().await?;
            if metrics.total_trades == 0 {
                println!("No closed positions yet.");
                return Ok(());
            }
            println!("\n{}", metrics);
        }
    }

    Ok(())
}

fn print_positions(positions: &[Position]) {
    println!(
        "\n{:<8} {:<8} {:<16} {:>12} {:>12} {:>9} {:<18}",
        "STATUS", "SYMBOL", "ADDRESS", "ENTRY $", "VALUE $", "P&L %", "REASON"
    );
    println!("{}", "-".repeat(89));

    for pos in positions {
        println!(
            "{:<8} {:<8} {:<16} {:>12.2} {:>12.2} {:>8.1}% {:<18}",
            pos.status.as_str(),
            truncate(&pos.symbol, 8),
            pos.short_address(),
            pos.entry_value_usd,
            pos.current_value_usd,
            pos.pnl_percentage,
            pos.close_reason.as_deref().unwrap_or("-")
        );
    }
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
