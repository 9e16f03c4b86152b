mod models;
mod screens;
mod services;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use services::board::SlideDeck;
use services::config_loader::{self, BoardConfig};
use services::poll_loop::{PollEvent, PollLoop, spawn_poll_loop};
use services::roster::Roster;
use services::runtime_log::RuntimeLogStore;
use services::score_source::HttpScoreSource;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cyberboard", version, about = "Competition scoreboard for registered teams")]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml", value_name = "PATH")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the scoring API and print the board
    Run,
    /// Register a team by id (NN-NNNN)
    AddTeam {
        id: String,
        #[arg(long)]
        alias: Option<String>,
    },
    /// Remove a team and forget its runtime history
    RemoveTeam { id: String },
    /// Show the registered teams
    ListTeams,
}

fn init_tracing() -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = fs::create_dir_all("logs");
    let file_appender = tracing_appender::rolling::daily("logs", "cyberboard.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_target(true);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(err) = init_result {
        eprintln!("tracing init failed: {err}");
        return None;
    }

    Some(file_guard)
}

fn run_board(config: &BoardConfig) -> Result<()> {
    let roster = Roster::load(&config.state_dir)?;
    let store = RuntimeLogStore::load(&config.state_dir);
    let source = HttpScoreSource::new(&config.api_base_url, config.request_timeout())?;

    let teams = roster.teams().to_vec();
    let mut deck = SlideDeck::new(&teams);
    let poll_loop = PollLoop::new(source, teams, store);
    let mut board = poll_loop.current_board();
    let handle = spawn_poll_loop(poll_loop, config.poll_interval());

    let slide_interval = config.slide_interval();
    let mut slide_shown_at = Instant::now();
    loop {
        let wait = slide_interval.saturating_sub(slide_shown_at.elapsed());
        match handle.events.recv_timeout(wait) {
            Ok(PollEvent::Started { teams }) => {
                info!(
                    "Polling {} every {:?} for {} teams",
                    config.api_base_url,
                    config.poll_interval(),
                    teams
                );
            }
            Ok(PollEvent::Updated { tick, board: fresh }) => {
                info!("Board updated on tick {}", tick);
                board = *fresh;
                print!("{}", screens::leaderboard::render_leaderboard(&board));
            }
            Ok(PollEvent::Skipped { tick, message }) => {
                debug!("Keeping previous board after tick {}: {}", tick, message);
            }
            Ok(PollEvent::Failed { message }) => bail!(message),
            Err(RecvTimeoutError::Timeout) => {
                let slide = deck.advance().clone();
                print!("{}", screens::leaderboard::render_slide(&board, &slide));
                slide_shown_at = Instant::now();
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Poll loop stopped");
                break;
            }
        }
    }

    handle.stop();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing();
    info!("Starting cyberboard");

    let config = config_loader::load_board_config(&cli.config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run => run_board(&config),
        Commands::AddTeam { id, alias } => {
            let mut roster = Roster::load(&config.state_dir)?;
            let team = roster.add(&id, alias.as_deref())?.clone();
            roster.save()?;
            println!("Added {} ({})", team.id, team.alias.as_deref().unwrap_or("no alias"));
            Ok(())
        }
        Commands::RemoveTeam { id } => {
            let mut roster = Roster::load(&config.state_dir)?;
            if !roster.remove(&id) {
                bail!("Team {id} is not registered");
            }
            roster.save()?;

            let mut store = RuntimeLogStore::load(&config.state_dir);
            if store.forget_team(&id) {
                store
                    .save()
                    .with_context(|| format!("failed to prune runtime log for {id}"))?;
            }
            println!("Removed {id}");
            Ok(())
        }
        Commands::ListTeams => {
            let roster = Roster::load(&config.state_dir)?;
            if roster.teams().is_empty() {
                println!("No teams added yet");
            }
            for team in roster.teams() {
                println!("{}\t{}", team.id, team.alias.as_deref().unwrap_or("None"));
            }
            Ok(())
        }
    }
}
