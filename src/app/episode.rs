use chrono::{DateTime, Local};
use tracing::warn;

use super::playback::ContentItem;

/// Orders a work's episodes by sequence, dropping foreign items and
/// duplicate sequence numbers. Gaps are kept but logged.
pub(crate) fn order_episodes(work_id: &str, episodes: Vec<ContentItem>) -> Vec<ContentItem> {
    let mut ordered = episodes
        .into_iter()
        .filter(|item| {
            let belongs = item.parent_work_id == work_id && item.sequence > 0;
            if !belongs {
                warn!(%work_id, item_id = %item.item_id, "dropping episode outside this work");
            }
            belongs
        })
        .collect::<Vec<_>>();
    ordered.sort_by_key(|item| item.sequence);
    ordered.dedup_by_key(|item| item.sequence);

    if !is_contiguous(&ordered) {
        warn!(%work_id, count = ordered.len(), "episode sequence has gaps");
    }
    ordered
}

pub(crate) fn is_contiguous(ordered: &[ContentItem]) -> bool {
    ordered
        .iter()
        .enumerate()
        .all(|(idx, item)| item.sequence as usize == idx + 1)
}

pub(crate) fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}

pub(crate) fn format_updated_at_display(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M %:z")
                .to_string()
        })
        .unwrap_or_else(|_| raw.to_string())
}
