//! Seekwell CLI - headless front end for the playback core
//!
//! Features:
//! - Quality catalog inspection
//! - Headless playback with resume and quality switching
//! - Saved position management

use clap::{Parser, Subcommand};
use seekwell_core::CoreConfig;
use std::path::{Path, PathBuf};

mod commands;
mod output;
mod player;

/// Default configuration file, overridden by `--config` or `SEEKWELL_CONFIG`
const DEFAULT_CONFIG_FILE: &str = "seekwell.toml";

/// Seekwell CLI - adaptive playback toolkit
#[derive(Parser)]
#[command(name = "seekwell")]
#[command(version)]
#[command(
    about = "Inspect qualities, play headlessly and manage resume positions",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and list the qualities of a video
    Qualities {
        /// Video identifier
        video_id: String,
    },

    /// Load a video through the headless engine
    Play {
        /// Video identifier
        video_id: String,

        /// Switch to this quality after loading
        #[arg(short, long)]
        quality: Option<u32>,

        /// Bypass failure cooldowns
        #[arg(long)]
        force: bool,

        /// Seconds to keep playing while saving positions
        #[arg(short, long, default_value = "0")]
        watch: u64,
    },

    /// Manage saved resume positions
    Positions {
        #[command(subcommand)]
        action: PositionsAction,
    },

    /// Show the effective configuration
    Config,
}

#[derive(Subcommand)]
enum PositionsAction {
    /// List saved positions
    List,

    /// Show the saved position of a video
    Get {
        video_id: String,
    },

    /// Save a position by hand
    Set {
        video_id: String,

        /// Offset in milliseconds
        offset_ms: i64,

        /// Media duration in milliseconds (defaults to the offset)
        #[arg(short, long)]
        duration_ms: Option<i64>,
    },

    /// Forget the position of a video
    Remove {
        video_id: String,
    },

    /// Forget every saved position
    Clear,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CoreConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("SEEKWELL_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    tracing::debug!(path = %path.display(), "Loading configuration");
    Ok(CoreConfig::from_toml_file(&path)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    seekwell_core::init();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Qualities { video_id } => {
            commands::qualities(&config, &video_id, &cli.format).await?;
        }
        Commands::Play { video_id, quality, force, watch } => {
            commands::play(&config, &video_id, quality, force, watch, &cli.format).await?;
        }
        Commands::Positions { action } => match action {
            PositionsAction::List => commands::positions_list(&config, &cli.format).await?,
            PositionsAction::Get { video_id } => {
                commands::positions_get(&config, &video_id, &cli.format).await?
            }
            PositionsAction::Set { video_id, offset_ms, duration_ms } => {
                commands::positions_set(&config, &video_id, offset_ms, duration_ms).await?
            }
            PositionsAction::Remove { video_id } => {
                commands::positions_remove(&config, &video_id).await?
            }
            PositionsAction::Clear => commands::positions_clear(&config).await?,
        },
        Commands::Config => {
            commands::show_config(&config, &cli.format)?;
        }
    }

    Ok(())
}
