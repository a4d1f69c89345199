// main.rs

mod api;
mod app;
mod cache;
mod collapsable;
mod config;
mod error;
mod models;
mod mutation;
mod parser;
mod routes;
mod server;
mod stats;
mod store;
mod tasks;
mod ui;

use crate::api::{HttpApi, LocalApi, TodoApi};
use crate::app::App;
use crate::cache::QueryCache;
use crate::config::{data_dir, Config};
use crate::mutation::MutationCoordinator;
use crate::routes::{share_url, Route};
use crate::store::Store;
use crate::ui::run_app;
use clap::{Parser, Subcommand};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dotenv::dotenv;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "todolist")]
#[command(about = "A shareable ToDo list: server and terminal client", long_about = None)]
#[command(version)]
struct Cli {
    /// API server the client talks to
    #[arg(long, global = true)]
    server: Option<String>,

    /// Read settings from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API backed by SQLite
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Create an empty list and print its share link
    New,
    /// Open the terminal client, optionally at a list id or shared link
    Open { route: Option<String> },
}

fn init_stdout_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();
}

// The terminal owns stdout while the client runs, so logs go to a file.
fn init_file_logging() -> io::Result<()> {
    let dir = data_dir();
    fs::create_dir_all(&dir)?;
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("todolist.log"))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn open(config: &Config, route: Route) -> Result<(), Box<dyn std::error::Error>> {
    let api: Arc<dyn TodoApi> = Arc::new(HttpApi::new(&config.server_url));
    let cache = QueryCache::new(api.clone());
    let (coordinator, failures) = MutationCoordinator::new(api, cache);
    let app = App::new(route, &config.share_url, coordinator, failures);

    // Setup terminal UI
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    terminal.hide_cursor()?;

    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path, cli.server)?,
        None => Config::load(cli.server)?,
    };

    match cli.command.unwrap_or(Command::Open { route: None }) {
        Command::Serve { bind, database } => {
            init_stdout_logging();
            let bind = bind.unwrap_or(config.bind);
            let database = database.unwrap_or(config.database);
            info!(database = %database.display(), "opening store");
            let store = Arc::new(Store::open(&database)?);
            server::serve(bind, Arc::new(LocalApi::new(store))).await?;
        }
        Command::New => {
            init_stdout_logging();
            let created = HttpApi::new(&config.server_url).create_todolist().await?;
            println!("{}", share_url(&config.share_url, &Route::List(created.id)));
        }
        Command::Open { route } => {
            init_file_logging()?;
            let route = match route {
                Some(raw) => Route::parse(&raw).ok_or_else(|| format!("not a list id or link: {}", raw))?,
                None => Route::Home,
            };
            open(&config, route).await?;
        }
    }

    Ok(())
}
