use std::path::PathBuf;

use tracing::{debug, warn};

use super::super::episode::format_clock;
use super::super::playback::{Boundary, FeedController, Notice, PlayerCommand};
use super::super::player::{ExternalPlayer, PlayerSignal};
use super::super::runtime::IoRuntime;
use super::PendingNotice;

pub(super) fn status_info(msg: &str) -> String {
    format!("INFO: {msg}")
}

pub(super) fn status_error(msg: &str) -> String {
    format!("ERROR: {msg}")
}

/// How a controller notice surfaces in the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum NoticeDisplay {
    Status(String),
    Modal(PendingNotice),
}

pub(super) fn describe_notice(notice: &Notice) -> NoticeDisplay {
    match notice {
        Notice::Boundary(Boundary::First) => {
            NoticeDisplay::Status(status_info("Already at the first episode."))
        }
        Notice::Boundary(Boundary::Last) => {
            NoticeDisplay::Status(status_info("No more episodes in this feed."))
        }
        Notice::ResumeOffer {
            sequence,
            timestamp_seconds,
        } => NoticeDisplay::Status(status_info(&format!(
            "Episode {sequence} was left at {}.",
            format_clock(*timestamp_seconds)
        ))),
        Notice::Blocked { item_id, decision } => NoticeDisplay::Status(status_info(&format!(
            "{} [{item_id}]",
            decision.prompt()
        ))),
        Notice::EndOfContent => NoticeDisplay::Modal(PendingNotice {
            title: "End Of Work",
            message: "You have reached the last episode.\n\nPress any key to continue."
                .to_string(),
        }),
        Notice::MediaSkipped { item_id, reason } => NoticeDisplay::Status(status_error(&format!(
            "Skipped {item_id}: {reason}"
        ))),
        Notice::FeedUnavailable => NoticeDisplay::Modal(PendingNotice {
            title: "Feed Unavailable",
            message: "Nothing could be loaded right now.\n\nPress r to retry or q to quit."
                .to_string(),
        }),
        Notice::FeedLoopRestarted => NoticeDisplay::Modal(PendingNotice {
            title: "All Caught Up",
            message: "You have watched everything loaded so far.\n\nStarting over from the top.\n\nPress any key to continue."
                .to_string(),
        }),
    }
}

pub(super) fn resume_prompt(sequence: u32, timestamp_seconds: u64) -> String {
    format!(
        "Continue episode {sequence} from {}?\n\n[r / Enter] Resume   [s] Start over",
        format_clock(timestamp_seconds)
    )
}

struct ActivePlayer {
    ticket: u64,
    player: ExternalPlayer,
}

/// Owns the one external player process, keyed by the activation ticket
/// that started it.
pub(super) struct PlayerHost {
    bin: PathBuf,
    active: Option<ActivePlayer>,
}

impl PlayerHost {
    pub(super) fn new(bin: PathBuf) -> Self {
        Self { bin, active: None }
    }

    /// Applies one command. A failure is returned with the ticket it belongs to
    /// so the controller can treat it as a media error.
    pub(super) fn execute(&mut self, command: PlayerCommand) -> Option<(u64, String)> {
        match command {
            PlayerCommand::Start {
                ticket,
                source,
                start_at,
                muted,
            } => {
                self.stop_all();
                match ExternalPlayer::start(&self.bin, &source.locator, start_at, muted) {
                    Ok(player) => {
                        self.active = Some(ActivePlayer { ticket, player });
                        None
                    }
                    Err(err) => Some((ticket, format!("{err:#}"))),
                }
            }
            PlayerCommand::Stop { ticket } => {
                if self.owns(ticket) {
                    self.stop_all();
                }
                None
            }
            PlayerCommand::Pause { ticket } => self.with_player(ticket, |p| p.pause()),
            PlayerCommand::Resume { ticket } => self.with_player(ticket, |p| p.resume()),
            PlayerCommand::Seek { ticket, position } => {
                self.with_player(ticket, |p| p.seek(position))
            }
            PlayerCommand::SetMuted { ticket, muted } => {
                self.with_player(ticket, |p| p.set_muted(muted))
            }
        }
    }

    pub(super) fn poll(&mut self) -> Option<(u64, PlayerSignal)> {
        let active = self.active.as_mut()?;
        let ticket = active.ticket;
        let signal = active.player.poll();
        if matches!(signal, PlayerSignal::Ended | PlayerSignal::Failed(_)) {
            self.active = None;
        }
        Some((ticket, signal))
    }

    pub(super) fn stop_all(&mut self) {
        if let Some(mut active) = self.active.take() {
            debug!(ticket = active.ticket, "stopping player");
            active.player.stop();
        }
    }

    fn owns(&self, ticket: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.ticket == ticket)
    }

    fn with_player(
        &mut self,
        ticket: u64,
        op: impl FnOnce(&mut ExternalPlayer) -> anyhow::Result<()>,
    ) -> Option<(u64, String)> {
        let active = self.active.as_mut().filter(|active| active.ticket == ticket)?;
        match op(&mut active.player) {
            Ok(()) => None,
            Err(err) => {
                warn!(ticket, error = %format!("{err:#}"), "player command failed");
                Some((ticket, format!("{err:#}")))
            }
        }
    }
}

/// Routes queued requests to the runtime and queued commands to the player
/// until the controller has nothing left to say.
pub(super) fn flush_outbound(
    controller: &mut FeedController,
    runtime: &IoRuntime,
    host: &mut PlayerHost,
) {
    loop {
        for request in controller.take_io_requests() {
            runtime.dispatch(request);
        }
        let commands = controller.take_player_commands();
        if commands.is_empty() {
            break;
        }
        for command in commands {
            if let Some((ticket, reason)) = host.execute(command) {
                controller.on_media_error(ticket, &reason);
            }
        }
    }
}

pub(super) fn feed_player_signal(
    controller: &mut FeedController,
    ticket: u64,
    signal: PlayerSignal,
) {
    match signal {
        PlayerSignal::Ready => controller.on_media_ready(ticket),
        PlayerSignal::Progress(seconds) => controller.on_time_update(ticket, seconds),
        PlayerSignal::Ended => controller.on_media_ended(ticket),
        PlayerSignal::Failed(reason) => controller.on_media_error(ticket, &reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::playback::{AccessDecision, PaymentKind, PlayableSource};

    #[test]
    fn boundary_and_gate_notices_go_to_the_status_line() {
        assert_eq!(
            describe_notice(&Notice::Boundary(Boundary::Last)),
            NoticeDisplay::Status("INFO: No more episodes in this feed.".to_string())
        );
        let blocked = Notice::Blocked {
            item_id: "i-1".to_string(),
            decision: AccessDecision::RequiresPayment(PaymentKind::Subscription),
        };
        assert_eq!(
            describe_notice(&blocked),
            NoticeDisplay::Status("INFO: Subscribe to unlock this episode. [i-1]".to_string())
        );
    }

    #[test]
    fn resume_offer_is_echoed_on_the_status_line() {
        let offer = Notice::ResumeOffer {
            sequence: 3,
            timestamp_seconds: 47,
        };
        assert_eq!(
            describe_notice(&offer),
            NoticeDisplay::Status("INFO: Episode 3 was left at 0:47.".to_string())
        );
        assert!(resume_prompt(3, 47).starts_with("Continue episode 3 from 0:47?"));
    }

    #[test]
    fn terminal_notices_open_a_modal() {
        for notice in [
            Notice::EndOfContent,
            Notice::FeedUnavailable,
            Notice::FeedLoopRestarted,
        ] {
            assert!(matches!(describe_notice(&notice), NoticeDisplay::Modal(_)));
        }
    }

    #[test]
    fn failed_start_is_reported_against_its_ticket() {
        let mut host = PlayerHost::new(PathBuf::from("/nonexistent/reelstate-player"));
        let failure = host.execute(PlayerCommand::Start {
            ticket: 7,
            source: PlayableSource {
                locator: "https://cdn.example/ep1.mp4".to_string(),
            },
            start_at: 0,
            muted: true,
        });
        assert!(matches!(failure, Some((7, _))));
        assert!(host.poll().is_none());
    }

    #[test]
    fn commands_for_other_tickets_are_ignored() {
        let mut host = PlayerHost::new(PathBuf::from("mpv"));
        assert_eq!(host.execute(PlayerCommand::Pause { ticket: 3 }), None);
        assert_eq!(host.execute(PlayerCommand::Stop { ticket: 3 }), None);
        assert!(host.poll().is_none());
    }
}
