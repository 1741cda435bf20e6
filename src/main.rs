//! Binary entrypoint for the Starfall CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml` and create the data directory
//! - `status` - print registered player count and content table sizes
//! - `start [--seed <n>]` - open the store, load content and run the console gateway
//!
//! The console gateway reads `<player_id> <command...>` lines from stdin and prints
//! each reply. Idle encounters are swept once per second.
//!
//! See the library crate docs for module-level details: `starfall::`.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use starfall::config::Config;
use starfall::game::{CommandProcessor, ContentTables, GameStore, GameStoreBuilder, PlayerId};
use starfall::logutil::escape_log;

#[derive(Parser)]
#[command(name = "starfall")]
#[command(about = "A text RPG server with gathering, crafting, hunts and dungeon crawls")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the game server with a console gateway on stdin/stdout
    Start {
        /// Seed the random source for a reproducible session
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Initialize a new configuration file
    Init,
    /// Show player and content statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            info!("Initializing new Starfall configuration");
            Config::create_default(&cli.config).await?;
            let cfg = Config::load(&cli.config).await?;
            tokio::fs::create_dir_all(&cfg.storage.data_dir).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let store = GameStore::open(config.storage.db_path())?;
            let content = ContentTables::load_dir(&config.content.dir)?;
            println!("{}", config.game.name);
            println!("Registered players: {}", store.player_count()?);
            println!(
                "Content: {} mobs, {} areas, {} items, {} gear templates, {} recipes, {} dungeon floors, {} quests",
                content.mobs.len(),
                content.areas.len(),
                content.items.len(),
                content.item_templates.len(),
                content.recipes.len(),
                content.dungeon_floors.len(),
                content.quests.len()
            );
        }
        Commands::Start { seed } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting Starfall v{}", env!("CARGO_PKG_VERSION"));

            let store = GameStoreBuilder::new(config.storage.db_path())
                .clear_stale_flags()
                .open()?;
            let content = ContentTables::load_dir(&config.content.dir)?;
            info!(
                "Loaded {} mobs, {} items and {} dungeon floors from {}",
                content.mobs.len(),
                content.items.len(),
                content.dungeon_floors.len(),
                config.content.dir
            );
            let mut processor =
                CommandProcessor::new(Arc::new(store), Arc::new(content), config.game_rules())
                    .with_start(&config.game.start_area, &config.game.start_subarea);
            if let Some(seed) = seed {
                info!("Using fixed random seed {}", seed);
                processor = processor.with_seed(seed);
            }
            run_console(Arc::new(processor)).await?;
            info!("Starfall stopped");
        }
    }

    Ok(())
}

/// Split `<player_id> <command...>`.
fn split_console_line(line: &str) -> Option<(PlayerId, &str)> {
    let (id, rest) = line.trim().split_once(char::is_whitespace)?;
    let id = id.parse::<PlayerId>().ok()?;
    Some((id, rest.trim()))
}

async fn run_console(processor: Arc<CommandProcessor>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sweep = tokio::time::interval(Duration::from_secs(1));
    println!("Enter commands as: <player_id> <command>. Ctrl-D to quit.");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match split_console_line(&line) {
                    Some((player, command)) => {
                        let worker = processor.clone();
                        let command = command.to_string();
                        match tokio::task::spawn_blocking(move || worker.handle(player, &command)).await {
                            Ok(reply) => println!("[{}] {}", player, reply),
                            Err(e) => error!("command task for player {} failed: {}", player, e),
                        }
                    }
                    None => {
                        warn!("ignoring malformed console line: {}", escape_log(&line));
                        println!("Usage: <player_id> <command>");
                    }
                }
            }
            now = sweep.tick() => {
                let worker = processor.clone();
                match tokio::task::spawn_blocking(move || worker.sweep(now.into_std())).await {
                    Ok(notices) => {
                        for (player, notice) in notices {
                            println!("[{}] {}", player, notice);
                        }
                    }
                    Err(e) => error!("sweep task failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });
    match log_file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Echo to the console only in the foreground
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::split_console_line;

    #[test]
    fn console_lines_carry_a_player_id() {
        assert_eq!(split_console_line("12 hunt auto"), Some((12, "hunt auto")));
        assert_eq!(split_console_line("  7   attack  "), Some((7, "attack")));
        assert_eq!(split_console_line("bob hunt"), None);
        assert_eq!(split_console_line("12"), None);
    }
}
