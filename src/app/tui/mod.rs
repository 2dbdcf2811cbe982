mod actions;
mod render;
mod session;

use std::io;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::TableState;
use tracing::info;

use crate::config::Config;

use super::playback::{Direction, FeedController, Gesture, ResumeChoice};
use super::runtime::IoRuntime;

use self::actions::{
    NoticeDisplay, PlayerHost, describe_notice, feed_player_signal, flush_outbound, status_info,
};
use self::render::draw_feed;
use self::session::TerminalGuard;

const FRAME_INTERVAL: Duration = Duration::from_millis(100);
const SEEK_STEP_SECONDS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct PendingNotice {
    pub(super) title: &'static str,
    pub(super) message: String,
}

/// Drives a mounted controller until the viewer quits. The controller is
/// unmounted before returning, on success and on error alike.
pub(crate) fn run_feed_tui(
    config: &Config,
    controller: &mut FeedController,
    runtime: &IoRuntime,
) -> Result<()> {
    let mut guard = TerminalGuard::enter()?;
    let mut host = PlayerHost::new(config.player_bin.clone());

    controller.mount();
    let result = event_loop(controller, runtime, &mut host);

    controller.unmount();
    flush_outbound(controller, runtime, &mut host);
    host.stop_all();
    guard.leave()?;
    result
}

fn event_loop(
    controller: &mut FeedController,
    runtime: &IoRuntime,
    host: &mut PlayerHost,
) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to initialize terminal backend")?;
    terminal.clear()?;

    let mut table_state = TableState::default();
    let mut pending_notice = None::<PendingNotice>;
    let mut status = status_info("Loading...");

    loop {
        for completion in runtime.drain() {
            controller.apply(completion);
        }
        if let Some((ticket, signal)) = host.poll() {
            feed_player_signal(controller, ticket, signal);
        }
        controller.tick(Instant::now());
        flush_outbound(controller, runtime, host);

        for notice in controller.take_notices() {
            match describe_notice(&notice) {
                NoticeDisplay::Status(message) => status = message,
                NoticeDisplay::Modal(modal) => pending_notice = Some(modal),
            }
        }

        terminal.draw(|frame| {
            draw_feed(
                frame,
                controller,
                &mut table_state,
                &status,
                pending_notice.as_ref(),
            )
        })?;

        if !event::poll(FRAME_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        let gesture = match key.kind {
            KeyEventKind::Press => Gesture::Press,
            KeyEventKind::Repeat => Gesture::Repeat,
            KeyEventKind::Release => continue,
        };

        if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
            info!("viewer quit");
            return Ok(());
        }

        if controller.resume_offer().is_some() {
            match key.code {
                KeyCode::Char('r') | KeyCode::Enter => controller.choose_resume(ResumeChoice::Resume),
                KeyCode::Char('s') => controller.choose_resume(ResumeChoice::Restart),
                _ => {}
            }
            continue;
        }

        if pending_notice.take().is_some() {
            if key.code == KeyCode::Char('r') {
                controller.retry();
            }
            continue;
        }

        handle_key(controller, key, gesture, &mut status);
    }
}

fn handle_key(controller: &mut FeedController, key: KeyEvent, gesture: Gesture, status: &mut String) {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => controller.advance(Direction::Backward, gesture),
        KeyCode::Down | KeyCode::Char('j') => controller.advance(Direction::Forward, gesture),
        KeyCode::Char(' ') if gesture == Gesture::Press => controller.toggle_pause(),
        KeyCode::Left => controller.seek_by(-SEEK_STEP_SECONDS),
        KeyCode::Right => controller.seek_by(SEEK_STEP_SECONDS),
        KeyCode::Char('m') if gesture == Gesture::Press => {
            controller.toggle_mute();
            *status = status_info(if controller.is_muted() {
                "Muted."
            } else {
                "Sound on."
            });
        }
        KeyCode::Char('r') if gesture == Gesture::Press => {
            controller.retry();
            *status = status_info("Retrying...");
        }
        _ => {}
    }
}
