//! shoestore CLI
//!
//! Signs in against the local mock backend and reads or writes its tables.

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use shoestore_cli::context::AppContext;
use shoestore_cli::data_cmd::QueryArgs;
use shoestore_cli::{auth_cmd, data_cmd};
use shoestore_core::config::load_config;
use shoestore_core::tracing_init::{default_filter, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "shoestore")]
#[command(version, about = "Shoe store back-office client (offline backend)", long_about = None)]
struct Cli {
    /// Mock store database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email and password.
    Login {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Sign out of the current session.
    Logout,
    /// Show the current session and profile.
    Status,
    /// Read rows from a table.
    Query(QueryArgs),
    /// Insert a JSON object or array of objects into a table.
    Insert { table: String, json: String },
    /// Drop a table's stored rows so it is re-seeded on next access.
    Reset { table: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().ok();
    let config = load_config(cwd.as_deref())?;
    init_tracing(&default_filter(&config.log_level), cli.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting shoestore CLI");

    let ctx = AppContext::open(config, cli.db).await?;
    let mut out = io::stdout();

    match cli.command {
        Command::Login { email, password } => {
            auth_cmd::login(&ctx, &email, &password, &mut out).await
        }
        Command::Logout => auth_cmd::logout(&ctx, &mut out).await,
        Command::Status => auth_cmd::status(&ctx, &mut out).await,
        Command::Query(args) => data_cmd::query(&ctx.database(), args, &mut out).await,
        Command::Insert { table, json } => {
            data_cmd::insert(&ctx.database(), &table, &json, &mut out).await
        }
        Command::Reset { table } => data_cmd::reset(&ctx.tables, &table, &mut out).await,
    }
}
