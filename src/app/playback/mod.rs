mod feed;
mod gate;
mod session;
mod tracker;

pub(crate) use feed::*;
pub(crate) use gate::*;
pub(crate) use session::*;
pub(crate) use tracker::*;

use serde::{Deserialize, Serialize};

/// One playable episode of a work.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContentItem {
    pub(crate) item_id: String,
    pub(crate) parent_work_id: String,
    pub(crate) sequence: u32,
    #[serde(default)]
    pub(crate) is_premium: bool,
    /// `None` on a premium item means only a subscription unlocks it.
    #[serde(default)]
    pub(crate) coin_price: Option<u32>,
    pub(crate) stream_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FeedEntry {
    pub(crate) work_id: String,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) age_limit: u8,
    pub(crate) first_item: ContentItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WorkEpisodes {
    pub(crate) work_id: String,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) age_limit: u8,
    pub(crate) episodes: Vec<ContentItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ViewCheckpoint {
    pub(crate) item_id: String,
    pub(crate) work_id: String,
    pub(crate) sequence: u32,
    pub(crate) timestamp_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CoinDebit {
    pub(crate) sufficient_balance: bool,
    pub(crate) debited: bool,
}

/// Locator handed to the external player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlayableSource {
    pub(crate) locator: String,
}
