use super::{ContentItem, ViewCheckpoint, ViewTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

impl PlaybackState {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Loading => "LOADING",
            Self::Playing => "PLAYING",
            Self::Paused => "PAUSED",
            Self::Ended => "ENDED",
            Self::Error => "ERROR",
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Error)
    }
}

/// Lifecycle of the single active item. Transition methods return whether
/// the transition was taken; invalid transitions leave the state untouched.
#[derive(Debug)]
pub(crate) struct PlaybackSession {
    item: ContentItem,
    ticket: u64,
    state: PlaybackState,
    initial_time: u64,
    position: f64,
    tracker: ViewTracker,
    failure: Option<String>,
}

impl PlaybackSession {
    pub(crate) fn new(item: ContentItem, ticket: u64, initial_time: u64) -> Self {
        Self {
            item,
            ticket,
            state: PlaybackState::Idle,
            initial_time,
            position: initial_time as f64,
            tracker: ViewTracker::new(),
            failure: None,
        }
    }

    pub(crate) fn item(&self) -> &ContentItem {
        &self.item
    }

    pub(crate) fn ticket(&self) -> u64 {
        self.ticket
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.state
    }

    pub(crate) fn initial_time(&self) -> u64 {
        self.initial_time
    }

    pub(crate) fn position(&self) -> f64 {
        self.position
    }

    pub(crate) fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn load(&mut self) -> bool {
        self.transition(PlaybackState::Idle, PlaybackState::Loading)
    }

    pub(crate) fn media_ready(&mut self) -> bool {
        self.transition(PlaybackState::Loading, PlaybackState::Playing)
    }

    pub(crate) fn pause(&mut self) -> bool {
        self.transition(PlaybackState::Playing, PlaybackState::Paused)
    }

    pub(crate) fn resume(&mut self) -> bool {
        self.transition(PlaybackState::Paused, PlaybackState::Playing)
    }

    pub(crate) fn media_ended(&mut self) -> bool {
        self.transition(PlaybackState::Playing, PlaybackState::Ended)
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = PlaybackState::Error;
        self.failure = Some(reason.into());
        true
    }

    /// Reports progress while playing and yields a checkpoint when the
    /// tracker crosses one.
    pub(crate) fn time_update(&mut self, seconds: f64) -> Option<ViewCheckpoint> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        if seconds.is_finite() && seconds >= 0.0 {
            self.position = seconds;
        }
        let timestamp_seconds = self.tracker.on_time_update(seconds)?;
        Some(ViewCheckpoint {
            item_id: self.item.item_id.clone(),
            work_id: self.item.parent_work_id.clone(),
            sequence: self.item.sequence,
            timestamp_seconds,
        })
    }

    pub(crate) fn seek(&mut self, seconds: f64) -> bool {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return false;
        }
        self.position = seconds.max(0.0);
        true
    }

    /// Forced reset when the feed moves away. Checkpoint tracking always
    /// restarts so a later activation of the same item starts clean.
    pub(crate) fn deactivate(&mut self) {
        self.tracker.reset();
        if !self.state.is_terminal() {
            self.state = PlaybackState::Idle;
            self.position = self.initial_time as f64;
        }
    }

    fn transition(&mut self, from: PlaybackState, to: PlaybackState) -> bool {
        if self.state != from {
            return false;
        }
        self.state = to;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ContentItem {
        ContentItem {
            item_id: "i-7".to_string(),
            parent_work_id: "w-1".to_string(),
            sequence: 2,
            is_premium: false,
            coin_price: None,
            stream_ref: "stream-7".to_string(),
        }
    }

    #[test]
    fn follows_load_play_pause_end_lifecycle() {
        let mut session = PlaybackSession::new(item(), 1, 0);
        assert_eq!(session.state(), PlaybackState::Idle);
        assert!(!session.media_ready(), "cannot become ready before loading");
        assert!(session.load());
        assert!(session.media_ready());
        assert!(session.pause());
        assert!(!session.media_ended(), "paused media does not end naturally");
        assert!(session.resume());
        assert!(session.media_ended());
        assert_eq!(session.state(), PlaybackState::Ended);
        assert!(!session.fail("late error"), "terminal states stay put");
    }

    #[test]
    fn error_is_reachable_from_loading() {
        let mut session = PlaybackSession::new(item(), 1, 0);
        session.load();
        assert!(session.fail("404"));
        assert_eq!(session.state(), PlaybackState::Error);
        assert_eq!(session.failure(), Some("404"));
    }

    #[test]
    fn checkpoints_carry_item_identity_and_only_flow_while_playing() {
        let mut session = PlaybackSession::new(item(), 1, 0);
        session.load();
        assert_eq!(session.time_update(5.0), None, "loading ignores progress");
        session.media_ready();
        let checkpoint = session.time_update(4.0).expect("confirmed view");
        assert_eq!(
            checkpoint,
            ViewCheckpoint {
                item_id: "i-7".to_string(),
                work_id: "w-1".to_string(),
                sequence: 2,
                timestamp_seconds: 4,
            }
        );
        session.pause();
        assert_eq!(session.time_update(30.0), None);
    }

    #[test]
    fn deactivation_resets_state_and_tracking() {
        let mut session = PlaybackSession::new(item(), 1, 47);
        session.load();
        session.media_ready();
        assert!(session.time_update(48.0).is_some());
        session.deactivate();
        assert_eq!(session.state(), PlaybackState::Idle);
        assert_eq!(session.position(), 47.0);

        session.load();
        session.media_ready();
        assert_eq!(
            session.time_update(48.0).map(|cp| cp.timestamp_seconds),
            Some(48),
            "tracking restarts after deactivation"
        );
    }
}
