/// Playback must pass this mark before the first checkpoint counts as a view.
pub(crate) const VIEW_CONFIRM_SECONDS: f64 = 3.0;
pub(crate) const CHECKPOINT_WINDOW_SECONDS: u64 = 10;

/// Turns raw playback time into deduplicated checkpoint timestamps for one
/// activation of one item.
#[derive(Debug, Default)]
pub(crate) struct ViewTracker {
    last_checkpoint: u64,
}

impl ViewTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the timestamp to report, if this update crosses a checkpoint.
    ///
    /// The first checkpoint fires once playback reaches
    /// [`VIEW_CONFIRM_SECONDS`] and is reported at `current_time` truncated
    /// to whole seconds, since checkpoints carry integer timestamps.
    /// After that only whole 10-second buckets are
    /// reported, and only once a full window has passed since the previous
    /// checkpoint, so seeking backwards never re-reports.
    pub(crate) fn on_time_update(&mut self, current_time: f64) -> Option<u64> {
        if !current_time.is_finite() || current_time < 0.0 {
            return None;
        }

        if self.last_checkpoint == 0 {
            if current_time < VIEW_CONFIRM_SECONDS {
                return None;
            }
            self.last_checkpoint = current_time.floor() as u64;
            return Some(self.last_checkpoint);
        }

        let bucket = (current_time.floor() as u64 / CHECKPOINT_WINDOW_SECONDS)
            * CHECKPOINT_WINDOW_SECONDS;
        if bucket >= self.last_checkpoint + CHECKPOINT_WINDOW_SECONDS {
            self.last_checkpoint = bucket;
            return Some(bucket);
        }
        None
    }

    pub(crate) fn reset(&mut self) {
        self.last_checkpoint = 0;
    }
}
