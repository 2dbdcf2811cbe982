use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::super::episode::order_episodes;
use super::{
    AccessDecision, AccessGate, CoinDebit, ContentItem, FeedEntry, GateStep, PlayableSource,
    PlaybackSession, PlaybackState, ViewCheckpoint, WorkEpisodes,
};
use crate::config::{
    Config, DEFAULT_DEBIT_TIMEOUT_SECS, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_PAGE_SIZE,
    PREFETCH_DISTANCE,
};
use crate::db::{WatchMark, WatchStateStore};
use crate::error::{EngineError, RemoteError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FeedMode {
    /// Continuous feed of first episodes across works; watched items are skipped.
    Discovery,
    /// Every episode of one work in sequence order, with a resume offer.
    Episodes { work_id: String },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FeedSettings {
    pub(crate) page_size: usize,
    pub(crate) prefetch_distance: usize,
    pub(crate) fetch_timeout: Duration,
    pub(crate) debit_timeout: Duration,
}

impl FeedSettings {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.page_size.max(1),
            prefetch_distance: config.prefetch_distance,
            fetch_timeout: config.fetch_timeout,
            debit_timeout: config.debit_timeout,
        }
    }
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            prefetch_distance: PREFETCH_DISTANCE,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            debit_timeout: Duration::from_secs(DEFAULT_DEBIT_TIMEOUT_SECS),
        }
    }
}

/// One navigable position: an item plus the work attributes the gate needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FeedSlot {
    pub(crate) work_id: String,
    pub(crate) title: String,
    pub(crate) age_limit: u8,
    pub(crate) item: ContentItem,
}

impl From<FeedEntry> for FeedSlot {
    fn from(entry: FeedEntry) -> Self {
        Self {
            work_id: entry.work_id,
            title: entry.title,
            age_limit: entry.age_limit,
            item: entry.first_item,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

/// A held key produces one `Press` followed by `Repeat`s; both belong to the
/// same navigation gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gesture {
    Press,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Boundary {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResumeChoice {
    Resume,
    Restart,
}

/// I/O the controller wants performed off the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IoRequest {
    FetchFeedPage { cursor: usize, count: usize },
    FetchWorkEpisodes { work_id: String },
    CheckAccess {
        ticket: u64,
        item: ContentItem,
        age_limit: u8,
    },
    DebitCoins { ticket: u64, item_id: String },
    RecordCheckpoint(ViewCheckpoint),
    ResolveMedia { ticket: u64, stream_ref: String },
}

/// Instructions for the player owning the active media handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlayerCommand {
    Start {
        ticket: u64,
        source: PlayableSource,
        start_at: u64,
        muted: bool,
    },
    Stop {
        ticket: u64,
    },
    Pause {
        ticket: u64,
    },
    Resume {
        ticket: u64,
    },
    Seek {
        ticket: u64,
        position: u64,
    },
    SetMuted {
        ticket: u64,
        muted: bool,
    },
}

#[derive(Debug)]
pub(crate) enum Completion {
    FeedPage {
        cursor: usize,
        result: Result<Vec<FeedEntry>, RemoteError>,
    },
    WorkEpisodes {
        work_id: String,
        result: Result<WorkEpisodes, RemoteError>,
    },
    AccessChecked {
        ticket: u64,
        step: GateStep,
    },
    CoinDebit {
        ticket: u64,
        result: Result<CoinDebit, RemoteError>,
    },
    CheckpointRecorded {
        item_id: String,
        result: Result<(), RemoteError>,
    },
    MediaResolved {
        ticket: u64,
        result: Result<PlayableSource, RemoteError>,
    },
}

/// User-facing signals raised by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notice {
    Boundary(Boundary),
    ResumeOffer { sequence: u32, timestamp_seconds: u64 },
    Blocked { item_id: String, decision: AccessDecision },
    EndOfContent,
    MediaSkipped { item_id: String, reason: String },
    FeedUnavailable,
    FeedLoopRestarted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ResumeState {
    NotApplicable,
    AwaitingEpisodes,
    Offered(WatchMark),
    Decided,
}

/// Which remote answer an activation is waiting on before it may play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessStage {
    Checking,
    Debiting,
}

#[derive(Debug)]
struct PendingAccess {
    ticket: u64,
    stage: AccessStage,
    item: ContentItem,
    initial_time: u64,
    deadline: Instant,
}

/// Gate outcome standing in for playback at the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Blocked {
    pub(crate) item_id: String,
    pub(crate) decision: AccessDecision,
    initial_time: u64,
}

/// Why the cursor should move once the next page lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingAdvance {
    UserForward,
    AfterEnd { completed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arrival {
    Initial,
    Forward,
    Backward,
}

/// Owns the append-only item list, the active cursor and every in-flight
/// flag of one mounted feed. Construct on mount, call [`Self::unmount`] on
/// teardown. All I/O leaves through [`Self::take_io_requests`] and
/// [`Self::take_player_commands`]; results come back through
/// [`Self::apply`] and the `on_media_*` callbacks, tagged with the
/// activation ticket so late answers for an item no longer active are dropped.
pub(crate) struct FeedController {
    mode: FeedMode,
    store: WatchStateStore,
    gate: AccessGate,
    settings: FeedSettings,
    slots: Vec<FeedSlot>,
    fetched: usize,
    exhausted: bool,
    fetch_deadline: Option<Instant>,
    cursor: Option<usize>,
    active_ticket: u64,
    session: Option<PlaybackSession>,
    pending_access: Option<PendingAccess>,
    blocked: Option<Blocked>,
    boundary_latch: Option<Boundary>,
    advance_when_loaded: Option<PendingAdvance>,
    resume: ResumeState,
    muted: bool,
    title: Option<String>,
    io_requests: Vec<IoRequest>,
    player_commands: Vec<PlayerCommand>,
    notices: Vec<Notice>,
}

impl FeedController {
    pub(crate) fn new(
        mode: FeedMode,
        store: WatchStateStore,
        gate: AccessGate,
        settings: FeedSettings,
    ) -> Self {
        Self {
            mode,
            store,
            gate,
            settings,
            slots: Vec::new(),
            fetched: 0,
            exhausted: false,
            fetch_deadline: None,
            cursor: None,
            active_ticket: 0,
            session: None,
            pending_access: None,
            blocked: None,
            boundary_latch: None,
            advance_when_loaded: None,
            resume: ResumeState::NotApplicable,
            muted: true,
            title: None,
            io_requests: Vec::new(),
            player_commands: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub(crate) fn mount(&mut self) {
        self.muted = self.store.get_mute();
        match self.mode.clone() {
            FeedMode::Discovery => self.request_next_page(),
            FeedMode::Episodes { work_id } => {
                self.resume = ResumeState::AwaitingEpisodes;
                self.request_episodes(work_id);
            }
        }
    }

    /// Stops the active item, drops every in-flight answer and flushes the
    /// watch store.
    pub(crate) fn unmount(&mut self) {
        self.deactivate_current();
        self.fetch_deadline = None;
        self.advance_when_loaded = None;
        self.store.flush();
        info!("feed unmounted");
    }

    pub(crate) fn mode(&self) -> &FeedMode {
        &self.mode
    }

    pub(crate) fn store(&self) -> &WatchStateStore {
        &self.store
    }

    pub(crate) fn slots(&self) -> &[FeedSlot] {
        &self.slots
    }

    pub(crate) fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub(crate) fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub(crate) fn blocked(&self) -> Option<&Blocked> {
        self.blocked.as_ref()
    }

    pub(crate) fn pending_access(&self) -> Option<AccessStage> {
        self.pending_access.as_ref().map(|pending| pending.stage)
    }

    pub(crate) fn resume_offer(&self) -> Option<&WatchMark> {
        match &self.resume {
            ResumeState::Offered(mark) => Some(mark),
            _ => None,
        }
    }

    pub(crate) fn is_fetching(&self) -> bool {
        self.fetch_deadline.is_some()
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub(crate) fn is_muted(&self) -> bool {
        self.muted
    }

    pub(crate) fn work_title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn active_ticket(&self) -> u64 {
        self.active_ticket
    }

    pub(crate) fn take_io_requests(&mut self) -> Vec<IoRequest> {
        std::mem::take(&mut self.io_requests)
    }

    pub(crate) fn take_player_commands(&mut self) -> Vec<PlayerCommand> {
        std::mem::take(&mut self.player_commands)
    }

    pub(crate) fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub(crate) fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::FeedPage { cursor, result } => self.on_feed_page(cursor, result),
            Completion::WorkEpisodes { work_id, result } => self.on_work_episodes(work_id, result),
            Completion::AccessChecked { ticket, step } => self.on_access_checked(ticket, step),
            Completion::CoinDebit { ticket, result } => self.on_coin_debit(ticket, result),
            Completion::CheckpointRecorded { item_id, result } => {
                if let Err(err) = result {
                    let err = EngineError::CheckpointEmitFailed(err);
                    debug!(%item_id, error = %err, "checkpoint not recorded");
                }
            }
            Completion::MediaResolved { ticket, result } => self.on_media_resolved(ticket, result),
        }
    }

    /// Expires in-flight page fetches, access checks and coin debits past
    /// their deadline.
    pub(crate) fn tick(&mut self, now: Instant) {
        if let Some(deadline) = self.fetch_deadline
            && now >= deadline
        {
            warn!("feed fetch timed out");
            self.fetch_deadline = None;
            if self.cursor.is_none() {
                self.notices.push(Notice::FeedUnavailable);
            }
        }

        let access_expired = self
            .pending_access
            .as_ref()
            .is_some_and(|pending| now >= pending.deadline);
        if access_expired && let Some(pending) = self.pending_access.take() {
            warn!(
                item_id = %pending.item.item_id,
                stage = ?pending.stage,
                "access answer timed out"
            );
            self.block(
                pending.item.item_id,
                AccessDecision::PaymentError,
                pending.initial_time,
            );
        }
    }

    pub(crate) fn advance(&mut self, direction: Direction, gesture: Gesture) {
        if gesture == Gesture::Press {
            self.boundary_latch = None;
        }
        if self.resume_offer().is_some() {
            return;
        }
        let Some(cursor) = self.cursor else {
            return;
        };

        let target = match direction {
            Direction::Forward => (cursor + 1 < self.slots.len()).then_some(cursor + 1),
            Direction::Backward => cursor.checked_sub(1),
        };
        if let Some(target) = target {
            self.boundary_latch = None;
            let arrival = match direction {
                Direction::Forward => Arrival::Forward,
                Direction::Backward => Arrival::Backward,
            };
            self.arrive(target, arrival);
            return;
        }

        if direction == Direction::Forward && self.more_pages_possible() {
            self.advance_when_loaded
                .get_or_insert(PendingAdvance::UserForward);
            self.request_next_page();
            return;
        }

        let boundary = match direction {
            Direction::Forward => Boundary::Last,
            Direction::Backward => Boundary::First,
        };
        if self.boundary_latch != Some(boundary) {
            self.boundary_latch = Some(boundary);
            self.notices.push(Notice::Boundary(boundary));
        }
    }

    /// Answers the resume offer. Only the first answer per entry counts.
    pub(crate) fn choose_resume(&mut self, choice: ResumeChoice) {
        let ResumeState::Offered(mark) = &self.resume else {
            return;
        };
        let mark = mark.clone();
        self.resume = ResumeState::Decided;
        match choice {
            ResumeChoice::Resume => {
                let index = self
                    .slots
                    .iter()
                    .position(|slot| slot.item.sequence == mark.last_sequence)
                    .unwrap_or(0);
                info!(
                    work_id = %mark.work_id,
                    sequence = mark.last_sequence,
                    at = mark.last_timestamp_seconds,
                    "resuming"
                );
                self.activate(index, mark.last_timestamp_seconds);
            }
            ResumeChoice::Restart => {
                info!(work_id = %mark.work_id, "restarting from the first episode");
                self.activate(0, 0);
            }
        }
    }

    /// Re-evaluates a blocked gate, or re-requests content that failed to load.
    pub(crate) fn retry(&mut self) {
        if let Some(blocked) = self.blocked.take()
            && let Some(cursor) = self.cursor
        {
            debug!(item_id = %blocked.item_id, "re-evaluating gate");
            self.gate.refresh();
            self.activate(cursor, blocked.initial_time);
            return;
        }
        match self.mode.clone() {
            FeedMode::Episodes { work_id } if self.slots.is_empty() => {
                self.request_episodes(work_id)
            }
            FeedMode::Episodes { .. } => {}
            FeedMode::Discovery => self.request_next_page(),
        }
    }

    pub(crate) fn toggle_pause(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let ticket = session.ticket();
        if session.pause() {
            self.player_commands.push(PlayerCommand::Pause { ticket });
        } else if session.resume() {
            self.player_commands.push(PlayerCommand::Resume { ticket });
        }
    }

    pub(crate) fn seek_by(&mut self, delta_seconds: i64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let target = (session.position() + delta_seconds as f64).max(0.0).floor();
        if session.seek(target) {
            self.player_commands.push(PlayerCommand::Seek {
                ticket: session.ticket(),
                position: target as u64,
            });
        }
    }

    pub(crate) fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        self.store.set_mute(self.muted);
        if let Some(session) = self.session.as_ref()
            && matches!(
                session.state(),
                PlaybackState::Playing | PlaybackState::Paused
            )
        {
            self.player_commands.push(PlayerCommand::SetMuted {
                ticket: session.ticket(),
                muted: self.muted,
            });
        }
    }

    pub(crate) fn on_media_ready(&mut self, ticket: u64) {
        if let Some(session) = self.live_session(ticket) {
            session.media_ready();
        }
    }

    pub(crate) fn on_time_update(&mut self, ticket: u64, seconds: f64) {
        let Some(session) = self.live_session(ticket) else {
            return;
        };
        let Some(checkpoint) = session.time_update(seconds) else {
            return;
        };
        self.store.set_watch_mark(
            &checkpoint.work_id,
            checkpoint.sequence,
            checkpoint.timestamp_seconds,
        );
        self.io_requests.push(IoRequest::RecordCheckpoint(checkpoint));
    }

    pub(crate) fn on_media_ended(&mut self, ticket: u64) {
        let Some(session) = self.live_session(ticket) else {
            return;
        };
        if !session.media_ended() {
            return;
        }
        let item_id = session.item().item_id.clone();
        self.store.mark_watched(&item_id);
        debug!(%item_id, "item watched to the end");
        self.move_past_current(true);
    }

    pub(crate) fn on_media_error(&mut self, ticket: u64, reason: &str) {
        let Some(session) = self.live_session(ticket) else {
            return;
        };
        if !session.fail(reason) {
            return;
        }
        let item_id = session.item().item_id.clone();
        let err = EngineError::MediaLoadFailed(reason.to_string());
        warn!(%item_id, error = %err, "skipping item");
        self.player_commands.push(PlayerCommand::Stop { ticket });
        self.notices.push(Notice::MediaSkipped {
            item_id,
            reason: reason.to_string(),
        });
        self.move_past_current(false);
    }

    fn live_session(&mut self, ticket: u64) -> Option<&mut PlaybackSession> {
        if ticket != self.active_ticket {
            debug!(ticket, active = self.active_ticket, "ignoring media signal for inactive item");
            return None;
        }
        self.session
            .as_mut()
            .filter(|session| session.ticket() == ticket)
    }

    fn on_feed_page(&mut self, cursor: usize, result: Result<Vec<FeedEntry>, RemoteError>) {
        if !matches!(self.mode, FeedMode::Discovery) || cursor != self.fetched {
            debug!(cursor, fetched = self.fetched, "discarding superseded feed page");
            return;
        }
        self.fetch_deadline = None;

        let entries = match result {
            Ok(entries) => entries,
            Err(err) => {
                let err = EngineError::FeedFetchFailed(err);
                warn!(cursor, error = %err, "feed page unavailable");
                if self.cursor.is_none() {
                    self.notices.push(Notice::FeedUnavailable);
                }
                return;
            }
        };

        if entries.is_empty() {
            info!(loaded = self.slots.len(), "feed exhausted");
            self.exhausted = true;
        }
        self.fetched += entries.len();
        let mut appended = 0;
        for entry in entries {
            let duplicate = self
                .slots
                .iter()
                .any(|slot| slot.item.item_id == entry.first_item.item_id);
            if duplicate {
                continue;
            }
            self.slots.push(FeedSlot::from(entry));
            appended += 1;
        }
        debug!(appended, loaded = self.slots.len(), "feed page appended");

        match self.cursor {
            None if !self.slots.is_empty() => self.arrive(0, Arrival::Initial),
            None => {
                if self.exhausted {
                    self.notices.push(Notice::FeedUnavailable);
                }
            }
            Some(cursor) if self.advance_when_loaded.is_some() => {
                let pending = self.advance_when_loaded.take();
                if cursor + 1 < self.slots.len() {
                    self.arrive(cursor + 1, Arrival::Forward);
                } else if pending == Some(PendingAdvance::AfterEnd { completed: true }) {
                    self.arrive(cursor, Arrival::Forward);
                } else {
                    self.boundary_latch = Some(Boundary::Last);
                    self.notices.push(Notice::Boundary(Boundary::Last));
                }
            }
            Some(_) if appended > 0 => self.maybe_prefetch(),
            Some(_) => {}
        }
    }

    fn on_work_episodes(&mut self, work_id: String, result: Result<WorkEpisodes, RemoteError>) {
        let FeedMode::Episodes { work_id: wanted } = &self.mode else {
            return;
        };
        if *wanted != work_id || !self.slots.is_empty() {
            debug!(%work_id, "discarding episode list");
            return;
        }
        self.fetch_deadline = None;

        let work = match result {
            Ok(work) => work,
            Err(err) => {
                let err = EngineError::FeedFetchFailed(err);
                warn!(%work_id, error = %err, "episode list unavailable");
                self.notices.push(Notice::FeedUnavailable);
                return;
            }
        };

        let episodes = order_episodes(&work.work_id, work.episodes);
        self.title = Some(work.title.clone());
        self.slots = episodes
            .into_iter()
            .map(|item| FeedSlot {
                work_id: work.work_id.clone(),
                title: work.title.clone(),
                age_limit: work.age_limit,
                item,
            })
            .collect();
        self.exhausted = true;
        if self.slots.is_empty() {
            self.notices.push(Notice::FeedUnavailable);
            return;
        }

        if self.resume != ResumeState::AwaitingEpisodes {
            return;
        }
        match self.store.get_watch_mark(&work_id) {
            Some(mark)
                if mark.last_sequence > 1
                    && self
                        .slots
                        .iter()
                        .any(|slot| slot.item.sequence == mark.last_sequence) =>
            {
                self.notices.push(Notice::ResumeOffer {
                    sequence: mark.last_sequence,
                    timestamp_seconds: mark.last_timestamp_seconds,
                });
                self.resume = ResumeState::Offered(mark);
            }
            _ => {
                self.resume = ResumeState::Decided;
                self.activate(0, 0);
            }
        }
    }

    /// Takes the pending access entry if it belongs to the live activation
    /// and is waiting on `stage`.
    fn take_pending_access(&mut self, ticket: u64, stage: AccessStage) -> Option<PendingAccess> {
        let current = self.pending_access.as_ref().is_some_and(|pending| {
            pending.ticket == ticket && pending.stage == stage && ticket == self.active_ticket
        });
        if !current {
            debug!(ticket, active = self.active_ticket, ?stage, "discarding stale access answer");
            return None;
        }
        self.pending_access.take()
    }

    fn on_access_checked(&mut self, ticket: u64, step: GateStep) {
        let Some(pending) = self.take_pending_access(ticket, AccessStage::Checking) else {
            return;
        };
        match step {
            GateStep::Decided(AccessDecision::Allowed) => {
                self.start_session(pending.ticket, pending.item, pending.initial_time)
            }
            GateStep::Decided(decision) => {
                self.block(pending.item.item_id, decision, pending.initial_time)
            }
            GateStep::NeedsCoinDebit => {
                let item_id = pending.item.item_id.clone();
                self.pending_access = Some(PendingAccess {
                    stage: AccessStage::Debiting,
                    deadline: Instant::now() + self.settings.debit_timeout,
                    ..pending
                });
                self.io_requests
                    .push(IoRequest::DebitCoins { ticket, item_id });
            }
        }
    }

    fn on_coin_debit(&mut self, ticket: u64, result: Result<CoinDebit, RemoteError>) {
        let Some(pending) = self.take_pending_access(ticket, AccessStage::Debiting) else {
            return;
        };
        match AccessGate::resolve_coin_debit(&pending.item.item_id, result) {
            AccessDecision::Allowed => {
                self.start_session(pending.ticket, pending.item, pending.initial_time)
            }
            decision => self.block(pending.item.item_id, decision, pending.initial_time),
        }
    }

    fn on_media_resolved(&mut self, ticket: u64, result: Result<PlayableSource, RemoteError>) {
        let muted = self.muted;
        let Some(session) = self.live_session(ticket) else {
            return;
        };
        if session.state() != PlaybackState::Loading {
            return;
        }
        match result {
            Ok(source) => {
                let start_at = session.initial_time();
                self.player_commands.push(PlayerCommand::Start {
                    ticket,
                    source,
                    start_at,
                    muted,
                });
            }
            Err(err) => self.on_media_error(ticket, &err.to_string()),
        }
    }

    fn request_next_page(&mut self) {
        if !self.more_pages_possible() || self.fetch_deadline.is_some() {
            return;
        }
        self.fetch_deadline = Some(Instant::now() + self.settings.fetch_timeout);
        self.io_requests.push(IoRequest::FetchFeedPage {
            cursor: self.fetched,
            count: self.settings.page_size,
        });
    }

    fn request_episodes(&mut self, work_id: String) {
        if self.fetch_deadline.is_some() {
            return;
        }
        self.fetch_deadline = Some(Instant::now() + self.settings.fetch_timeout);
        self.io_requests
            .push(IoRequest::FetchWorkEpisodes { work_id });
    }

    fn more_pages_possible(&self) -> bool {
        matches!(self.mode, FeedMode::Discovery) && !self.exhausted
    }

    fn maybe_prefetch(&mut self) {
        let Some(cursor) = self.cursor else {
            return;
        };
        let remaining = self.slots.len().saturating_sub(cursor + 1);
        if remaining <= self.settings.prefetch_distance {
            self.request_next_page();
        }
    }

    fn arrive(&mut self, index: usize, arrival: Arrival) {
        let skips_watched = matches!(self.mode, FeedMode::Discovery)
            && matches!(arrival, Arrival::Initial | Arrival::Forward);
        let target = if skips_watched {
            match self.skip_watched_from(index) {
                Some(target) => target,
                None => {
                    debug!(from = index, "watched tail, waiting for the next page");
                    if self.cursor.is_some() {
                        self.advance_when_loaded
                            .get_or_insert(PendingAdvance::UserForward);
                    }
                    self.request_next_page();
                    return;
                }
            }
        } else {
            index
        };
        if Some(target) == self.cursor
            && self
                .session
                .as_ref()
                .is_some_and(|session| !session.state().is_terminal())
        {
            // Wrapped onto the item already playing: nothing further to show.
            if self.boundary_latch != Some(Boundary::Last) {
                self.boundary_latch = Some(Boundary::Last);
                self.notices.push(Notice::Boundary(Boundary::Last));
            }
            return;
        }
        self.activate(target, 0);
    }

    /// Nearest unwatched index at or after `index`. `None` while everything
    /// from `index` on is watched and another page may still bring new items.
    /// Once the feed is exhausted, wraps to the first unwatched entry; when
    /// every loaded entry is watched, clears the watched set and restarts at 0.
    fn skip_watched_from(&mut self, index: usize) -> Option<usize> {
        let watched = |slot: &FeedSlot| self.store.is_watched(&slot.item.item_id);
        if !watched(&self.slots[index]) {
            return Some(index);
        }
        if let Some(next) = (index + 1..self.slots.len()).find(|&i| !watched(&self.slots[i])) {
            debug!(from = index, to = next, "skipping watched items");
            return Some(next);
        }
        if self.more_pages_possible() {
            return None;
        }
        if let Some(earlier) = (0..index).find(|&i| !watched(&self.slots[i])) {
            debug!(from = index, to = earlier, "wrapping to earliest unwatched item");
            return Some(earlier);
        }
        info!(loaded = self.slots.len(), "every loaded item watched, restarting feed");
        self.store.reset_watched();
        self.notices.push(Notice::FeedLoopRestarted);
        Some(0)
    }

    fn activate(&mut self, index: usize, initial_time: u64) {
        self.deactivate_current();
        let Some(slot) = self.slots.get(index).cloned() else {
            return;
        };
        self.cursor = Some(index);
        self.active_ticket += 1;
        let ticket = self.active_ticket;
        self.maybe_prefetch();

        match self.gate.precheck(&slot.item, slot.age_limit) {
            Some(AccessDecision::Allowed) => self.start_session(ticket, slot.item, initial_time),
            Some(decision) => self.block(slot.item.item_id, decision, initial_time),
            None => {
                self.io_requests.push(IoRequest::CheckAccess {
                    ticket,
                    item: slot.item.clone(),
                    age_limit: slot.age_limit,
                });
                self.pending_access = Some(PendingAccess {
                    ticket,
                    stage: AccessStage::Checking,
                    item: slot.item,
                    initial_time,
                    deadline: Instant::now() + self.settings.fetch_timeout,
                });
            }
        }
    }

    fn start_session(&mut self, ticket: u64, item: ContentItem, initial_time: u64) {
        let stream_ref = item.stream_ref.clone();
        let mut session = PlaybackSession::new(item, ticket, initial_time);
        session.load();
        self.session = Some(session);
        self.io_requests
            .push(IoRequest::ResolveMedia { ticket, stream_ref });
    }

    fn block(&mut self, item_id: String, decision: AccessDecision, initial_time: u64) {
        debug!(%item_id, ?decision, "item gated");
        self.notices.push(Notice::Blocked {
            item_id: item_id.clone(),
            decision,
        });
        self.blocked = Some(Blocked {
            item_id,
            decision,
            initial_time,
        });
    }

    /// Synchronously stops the current item so no two items are ever
    /// loading or playing at once.
    fn deactivate_current(&mut self) {
        if let Some(mut session) = self.session.take() {
            let ticket = session.ticket();
            let was_running = !session.state().is_terminal();
            session.deactivate();
            if was_running {
                self.player_commands.push(PlayerCommand::Stop { ticket });
            }
        }
        if let Some(pending) = self.pending_access.take() {
            debug!(
                item_id = %pending.item.item_id,
                stage = ?pending.stage,
                "abandoning access answer for inactive item"
            );
        }
        self.blocked = None;
    }

    fn move_past_current(&mut self, completed: bool) {
        let Some(cursor) = self.cursor else {
            return;
        };
        let has_next = cursor + 1 < self.slots.len();
        match self.mode {
            FeedMode::Episodes { .. } => {
                if has_next {
                    self.activate(cursor + 1, 0);
                } else {
                    self.notices.push(Notice::EndOfContent);
                }
            }
            FeedMode::Discovery => {
                if has_next {
                    self.arrive(cursor + 1, Arrival::Forward);
                } else if self.more_pages_possible() {
                    self.advance_when_loaded = Some(PendingAdvance::AfterEnd { completed });
                    self.request_next_page();
                } else if completed {
                    self.arrive(cursor, Arrival::Forward);
                } else {
                    self.notices.push(Notice::Boundary(Boundary::Last));
                }
            }
        }
    }
}
