use anyhow::Result;
use clap::{Parser, Subcommand};
use erc20_watcher::config::Config;
use erc20_watcher::query::commands::{
    TokenDisplay, TransactionQuery, cmd_stats, cmd_transactions, cmd_windows,
};
use erc20_watcher::query::formatters::OutputFormat;
use erc20_watcher::repository::{Database, TransactionRepository, WindowRepository};

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Inspect recorded transfers and scan history", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Most recent scan windows
    Windows {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Stored transfers, newest first
    Transactions {
        #[arg(long)]
        from_block: Option<u64>,

        #[arg(long)]
        to_block: Option<u64>,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;

    let db = Database::new(&config.database_path().to_string_lossy())?;
    let transaction_repo = TransactionRepository::new(db.clone());
    let window_repo = WindowRepository::new(db);
    let token = TokenDisplay {
        symbol: &config.token_symbol,
        decimals: config.token_decimals,
    };

    match cli.command {
        Commands::Windows { limit } => {
            cmd_windows(&window_repo, limit, &format)?;
        }
        Commands::Transactions {
            from_block,
            to_block,
            limit,
            offset,
        } => {
            let query = TransactionQuery {
                from_block,
                to_block,
                limit,
                offset,
            };
            cmd_transactions(&transaction_repo, &token, query, &format)?;
        }
        Commands::Stats => {
            cmd_stats(&transaction_repo, &window_repo, &token, &format)?;
        }
    }

    Ok(())
}
