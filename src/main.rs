//! Binary entrypoint for the Fablekit CLI.
//!
//! Commands:
//! - `init` - write a starter `fablekit.toml`
//! - `play [--slot <name>]` - play the bundled demo world, optionally restoring a slot
//! - `slots` - list saved slots
//! - `inspect <slot>` - print a stored snapshot tree as JSON
//! - `status` - print configuration summary and stored slot count
//!
//! See the library crate docs for module‑level details: `fablekit::`.
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use fablekit::config::Config;
use fablekit::demo;
use fablekit::fiction::{
    Direction, EndReason, Examinable, MoveOutcome, Reaction, TakeOutcome,
};
use fablekit::logutil::escape_log;
use fablekit::metrics;
use fablekit::session::{HostSignal, Session};
use fablekit::storage::{open_store, unpack, SlotStore};

const DEFAULT_SLOT: &str = "quick";

#[derive(Parser)]
#[command(name = "fablekit")]
#[command(about = "Interactive fiction with durable save games")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "fablekit.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Play the bundled demo world
    Play {
        /// Restore this slot before the first turn
        #[arg(short, long)]
        slot: Option<String>,
    },
    /// List saved slots
    Slots,
    /// Print the snapshot tree stored in a slot
    Inspect {
        /// Slot name
        slot: String,
    },
    /// Show configuration and stored slots
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            let config = Config::load(&cli.config).await?;
            tokio::fs::create_dir_all(&config.storage.save_dir).await?;
            println!("Wrote {} (saves go to {})", cli.config, config.storage.save_dir);
        }
        Commands::Play { slot } => {
            let config = loaded_or_default(pre_config, &cli.config)?;
            play(config, slot).await?;
        }
        Commands::Slots => {
            let config = loaded_or_default(pre_config, &cli.config)?;
            let store = open_configured_store(&config)?;
            let slots = store.list()?;
            if slots.is_empty() {
                println!("No saved slots in {}", config.storage.save_dir);
            }
            for slot in slots {
                println!("{}", slot);
            }
        }
        Commands::Inspect { slot } => {
            let config = loaded_or_default(pre_config, &cli.config)?;
            let store = open_configured_store(&config)?;
            let bytes = store.read(&slot)?;
            let transform = config.storage.transform();
            let (envelope, tree) = unpack(&slot, bytes, transform.as_ref())?;
            println!(
                "# snapshot {} written {} ({}, schema v{}, {} nodes)",
                envelope.snapshot_id,
                envelope.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                envelope.format.as_str(),
                envelope.schema_version,
                tree.node_count()
            );
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        Commands::Status => {
            let config = loaded_or_default(pre_config, &cli.config)?;
            println!("Fablekit v{}", env!("CARGO_PKG_VERSION"));
            println!("Game:     {}", config.game.title);
            println!(
                "Storage:  {} ({} backend, {} format, compress={})",
                config.storage.save_dir,
                config.storage.backend,
                config.storage.format,
                config.storage.compress
            );
            match open_configured_store(&config).and_then(|s| Ok(s.list()?)) {
                Ok(slots) => println!("Slots:    {}", slots.len()),
                Err(e) => println!("Slots:    unavailable ({})", e),
            }
        }
    }

    Ok(())
}

fn loaded_or_default(pre_config: Option<Config>, path: &str) -> Result<Config> {
    let config = match pre_config {
        Some(config) => config,
        None => {
            warn!("No usable config at {}; using defaults", path);
            Config::default()
        }
    };
    config.validate()?;
    Ok(config)
}

fn open_configured_store(config: &Config) -> Result<Arc<dyn SlotStore>> {
    Ok(open_store(config.storage.backend()?, &config.storage.save_dir)?)
}

async fn play(config: Config, slot: Option<String>) -> Result<()> {
    let store = open_configured_store(&config)?;
    let (session, mut signals) = Session::new(demo::world_builder(), store)?;
    let mut session = session
        .with_format(config.storage.snapshot_format()?)
        .with_transform(config.storage.transform());
    info!("Starting {} v{}", config.game.title, env!("CARGO_PKG_VERSION"));

    println!("{}\n", config.game.title);
    if let Some(slot) = slot {
        run_io(&mut session, &mut signals, |s| s.begin_load(&slot)).await;
    }
    println!("{}", session.game().describe_current_room());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        while let Some(done) = session.poll() {
            println!("{}", done.message);
        }
        print_prompt();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        log::debug!("input: {}", escape_log(&line));
        if !turn(&mut session, &mut signals, &line).await {
            break;
        }
        if session.game().is_complete() && session.game().ended.is_none() {
            println!("The light turns over the water. You have finished.");
            session.end(EndReason::ApplicationExit);
        }
        if drain_signals(&mut signals) {
            break;
        }
    }

    if let Some(slot) = config.game.autosave_slot.as_deref() {
        if !session.game().is_complete() {
            run_io(&mut session, &mut signals, |s| s.begin_save(slot)).await;
        }
    }

    let counters = metrics::snapshot();
    info!(
        "session counters: {} saves, {} loads, {} rejected, {} entities reattached",
        counters.saves_completed,
        counters.loads_completed,
        counters.rejected,
        counters.entities_reattached
    );
    println!("\n{}", counters);
    Ok(())
}

fn print_prompt() {
    use std::io::Write;
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Returns true when the game has ended.
fn drain_signals(signals: &mut UnboundedReceiver<HostSignal>) -> bool {
    let mut ended = false;
    while let Ok(signal) = signals.try_recv() {
        match signal {
            HostSignal::GameEnded(reason) => {
                info!("game ended: {:?}", reason);
                ended = true;
            }
            HostSignal::Rejected { message, .. } => println!("{}", message),
            HostSignal::FrameUpdated | HostSignal::OperationCompleted { .. } => {}
        }
    }
    ended
}

async fn run_io<F>(session: &mut Session, signals: &mut UnboundedReceiver<HostSignal>, start: F)
where
    F: FnOnce(&mut Session) -> Result<(), fablekit::fiction::FictionError>,
{
    match start(session) {
        Ok(()) => {
            if let Some(done) = session.wait().await {
                println!("{}", done.message);
            }
        }
        Err(e) => println!("{}", e),
    }
    drain_signals(signals);
}

fn print_reaction(reaction: Reaction) {
    match reaction {
        Reaction::Inform(text) | Reaction::Error(text) => println!("{}", text),
        Reaction::Silent => {}
    }
}

/// Run one line of input. Returns false when the player quits.
async fn turn(
    session: &mut Session,
    signals: &mut UnboundedReceiver<HostSignal>,
    line: &str,
) -> bool {
    let (verb, rest) = match line.split_once(' ') {
        Some((verb, rest)) => (verb.to_ascii_lowercase(), rest.trim()),
        None => (line.to_ascii_lowercase(), ""),
    };

    if let Ok(direction) = verb.parse::<Direction>() {
        if rest.is_empty() {
            go(session, direction);
            return true;
        }
    }

    match verb.as_str() {
        "quit" | "q" => {
            session.end(EndReason::ApplicationExit);
            return false;
        }
        "look" | "l" => println!("{}", session.game().describe_current_room()),
        "go" => match rest.parse::<Direction>() {
            Ok(direction) => go(session, direction),
            Err(_) => println!("Go where?"),
        },
        "examine" | "x" => println!("{}", examine(session, rest)),
        "take" | "get" => match session.game_mut().take(rest) {
            TakeOutcome::Taken(name) => println!("Taken: {}.", name),
            TakeOutcome::NotFound => println!("You see no {} here.", rest),
            TakeOutcome::NotTakeable => println!("You can't take that."),
        },
        "unlock" => match rest.parse::<Direction>() {
            Ok(direction) => unlock(session, direction),
            Err(_) => println!("Unlock which way?"),
        },
        "talk" => match session.game_mut().talk_to(rest) {
            Some(line) => println!("\"{}\"", line),
            None => println!("No answer."),
        },
        "inventory" | "i" => {
            let items: Vec<&str> = session
                .game()
                .player
                .items
                .iter()
                .map(|i| i.core.name.as_str())
                .collect();
            if items.is_empty() {
                println!("You carry nothing.");
            } else {
                println!("You carry: {}", items.join(", "));
            }
        }
        "save" => {
            let slot = if rest.is_empty() { DEFAULT_SLOT } else { rest };
            run_io(session, signals, |s| s.begin_save(slot)).await;
        }
        "load" => {
            let slot = if rest.is_empty() { DEFAULT_SLOT } else { rest };
            run_io(session, signals, |s| s.begin_load(slot)).await;
            println!("{}", session.game().describe_current_room());
        }
        "new" => match session.new_game() {
            Ok(()) => println!("{}", session.game().describe_current_room()),
            Err(e) => println!("{}", e),
        },
        "help" | "?" => println!(
            "look, go <dir> (n/s/e/w/u/d), examine <thing>, take <item>, unlock <dir>, \
             talk <name>, inventory, save [slot], load [slot], new, quit"
        ),
        _ => {
            let game = session.game_mut();
            let reaction = game
                .invoke_command(line, "")
                .or_else(|| game.invoke_command(&verb, rest));
            match reaction {
                Some(reaction) => print_reaction(reaction),
                None => println!("I don't know how to '{}'.", line),
            }
        }
    }
    session.refresh();
    true
}

fn go(session: &mut Session, direction: Direction) {
    match session.game_mut().move_player(direction) {
        MoveOutcome::Moved => println!("{}", session.game().describe_current_room()),
        MoveOutcome::Locked => println!("The way {} is locked.", direction),
        MoveOutcome::NoExit | MoveOutcome::NoRoom => println!("You can't go {}.", direction),
        MoveOutcome::NoLocation => println!("You are nowhere."),
    }
}

fn unlock(session: &mut Session, direction: Direction) {
    if !demo::carried_key_opens(session.game(), direction) {
        println!("You have nothing that opens it.");
        return;
    }
    match session.game_mut().unlock_door(direction) {
        Ok(()) => println!("Unlocked."),
        Err(e) => {
            warn!("unlock {} failed: {}", direction, e);
            println!("It won't budge.");
        }
    }
}

fn examine(session: &Session, target: &str) -> String {
    let game = session.game();
    let Some(room) = game.overworld.current_room() else {
        return "You are nowhere.".to_string();
    };
    if target.is_empty() || target.eq_ignore_ascii_case("room") {
        return room.examine().description;
    }
    if let Some(item) = room.find_item(target).or_else(|| game.player.find_item(target)) {
        return item.examine().description;
    }
    if let Some(npc) = room
        .characters
        .iter()
        .find(|c| c.core.is_player_visible && c.core.name.eq_ignore_ascii_case(target))
    {
        return npc.examine().description;
    }
    if let Some(exit) = target.parse::<Direction>().ok().and_then(|d| room.exit(d)) {
        return exit.examine().description;
    }
    format!("You see no {} here.", target)
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Warn),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });
    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Echo to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stderr);
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
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
