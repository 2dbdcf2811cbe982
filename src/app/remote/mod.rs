mod api;

pub(crate) use api::ApiClient;

use super::playback::{CoinDebit, FeedEntry, PlayableSource, ViewCheckpoint, WorkEpisodes};
use crate::error::RemoteError;

/// Read/write access to posts and view history on the platform.
pub(crate) trait RecordStore: Send + Sync {
    fn fetch_feed_page(&self, cursor: usize, count: usize) -> Result<Vec<FeedEntry>, RemoteError>;

    /// Episodes ordered by sequence.
    fn fetch_work_episodes(&self, work_id: &str) -> Result<WorkEpisodes, RemoteError>;

    fn record_view_checkpoint(&self, checkpoint: &ViewCheckpoint) -> Result<(), RemoteError>;
}

/// Identity and entitlement capability consulted by the access gate.
pub(crate) trait Entitlements: Send + Sync {
    fn has_identity(&self) -> bool;

    fn is_age_verified(&self, threshold: u8) -> Result<bool, RemoteError>;

    fn has_active_subscription(&self) -> Result<bool, RemoteError>;

    /// Drops any cached viewer snapshot. Must not block.
    fn refresh(&self) {}

    /// Debits the item's coin price at most once per call.
    fn check_and_debit_coins(&self, item_id: &str) -> Result<CoinDebit, RemoteError>;
}

pub(crate) trait MediaResolver: Send + Sync {
    fn resolve_playable_source(&self, stream_ref: &str) -> Result<PlayableSource, RemoteError>;
}
