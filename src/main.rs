mod commands;
mod render;
mod utils;

use agenda_core::{Agenda, AgendaConfig, DateWindow, EventId, RelationKind};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "agenda")]
#[command(about = "Browse community events, like them and confirm your attendance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and remember the session
    Login { email: String },
    /// Forget the saved session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List events
    Events {
        /// Only show events whose title or description contains this text
        #[arg(short, long)]
        search: Option<String>,

        /// Date window: week, month or all
        #[arg(short, long, default_value = "all")]
        range: DateWindow,
    },
    /// Like or unlike an event
    Like { id: i64 },
    /// Confirm or cancel attendance to an event
    Confirm { id: i64 },
    /// Show the events you are attending, soonest first
    Agenda,
    /// Show the events you liked
    Liked,
    /// Print changes as they happen
    Watch {
        /// Seconds between background refreshes
        #[arg(short, long, default_value_t = 60)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = AgendaConfig::load()?;
    let agenda = Agenda::connect(&config)?;

    match cli.command {
        Commands::Login { email } => commands::account::login(&agenda, &email).await,
        Commands::Logout => commands::account::logout(&agenda),
        Commands::Whoami => commands::account::whoami(&agenda).await,
        Commands::Events { search, range } => {
            commands::events::run(&agenda, search.as_deref(), range).await
        }
        Commands::Like { id } => commands::toggle::run(&agenda, RelationKind::Like, EventId(id)).await,
        Commands::Confirm { id } => {
            commands::toggle::run(&agenda, RelationKind::Confirm, EventId(id)).await
        }
        Commands::Agenda => commands::lists::agenda(&agenda).await,
        Commands::Liked => commands::lists::liked(&agenda).await,
        Commands::Watch { interval } => commands::watch::run(&agenda, interval).await,
    }
}

/// Logs go to stderr so they never mix with command output.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agenda=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
