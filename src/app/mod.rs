mod episode;
mod playback;
mod player;
mod remote;
mod runtime;
mod tui;


use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cli::{Cli, Command, Toggle};
use crate::config::Config;
use crate::db::{StoreScope, WatchStateStore};
use crate::logging::{init_file_logging, init_stderr_logging};
use crate::paths::log_file_path;

use self::episode::{format_clock, format_updated_at_display, truncate};
use self::playback::{AccessGate, FeedController, FeedMode, FeedSettings};
use self::remote::ApiClient;
use self::runtime::IoRuntime;

pub fn run(cli: Cli) -> Result<()> {
    let interactive = matches!(
        cli.command,
        None | Some(Command::Feed) | Some(Command::Watch { .. })
    );
    if !interactive {
        init_stderr_logging();
    } else if let Err(err) = log_file_path().and_then(|path| init_file_logging(&path)) {
        eprintln!("Warning: logging disabled: {err:#}");
    }
    let config = Config::from_env(cli.api_base)?;

    match cli.command {
        Some(Command::Marks) => run_marks(&open_store(&config)?),
        Some(Command::Mute { state }) => run_mute(&open_store(&config)?, state),
        Some(Command::ResetWatched) => run_reset_watched(&open_store(&config)?),
        Some(Command::Watch { work_id }) => run_player(&config, FeedMode::Episodes { work_id }),
        Some(Command::Feed) | None => run_player(&config, FeedMode::Discovery),
    }
}

fn open_store(config: &Config) -> Result<WatchStateStore> {
    WatchStateStore::open(
        &config.database_path,
        StoreScope::from_identity(config.has_identity()),
    )
}

fn run_player(config: &Config, mode: FeedMode) -> Result<()> {
    info!(?mode, api_base = %config.api_base, "starting feed");

    let store = open_store(config)?;
    let client = Arc::new(ApiClient::new(config));

    let gate = AccessGate::new(client.clone());
    let runtime = IoRuntime::new(client.clone(), client.clone(), client);
    let mut controller = FeedController::new(mode, store, gate, FeedSettings::from_config(config));
    tui::run_feed_tui(config, &mut controller, &runtime)
}

fn run_marks(store: &WatchStateStore) -> Result<()> {
    let marks = store.list_watch_marks();
    if marks.is_empty() {
        println!(
            "No watch marks stored for {} viewers yet. Run `reelstate watch <WORK_ID>` first.",
            store.scope().as_str()
        );
        return Ok(());
    }

    println!(
        "{:<28} {:<6} {:<10} {:<28}",
        "WORK ID", "EP", "AT", "UPDATED"
    );
    for mark in marks {
        println!(
            "{:<28} {:<6} {:<10} {:<28}",
            truncate(&mark.work_id, 28),
            mark.last_sequence,
            format_clock(mark.last_timestamp_seconds),
            format_updated_at_display(&mark.updated_at)
        );
    }
    Ok(())
}

fn run_mute(store: &WatchStateStore, state: Option<Toggle>) -> Result<()> {
    if let Some(state) = state {
        store.set_mute(state == Toggle::On);
        store.flush();
    }
    let muted = store.get_mute();
    println!("Autoplay starts {}.", if muted { "muted" } else { "with sound" });
    Ok(())
}

fn run_reset_watched(store: &WatchStateStore) -> Result<()> {
    store.reset_watched();
    store.flush();
    println!("Watched history cleared. The discovery feed will show everything again.");
    Ok(())
}
