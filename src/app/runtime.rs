use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use tracing::debug;

use super::playback::{AccessGate, Completion, IoRequest};
use super::remote::{Entitlements, MediaResolver, RecordStore};

/// Runs controller I/O on short-lived worker threads and hands the results
/// back to the event loop, which stays the only owner of engine state.
pub(crate) struct IoRuntime {
    records: Arc<dyn RecordStore>,
    entitlements: Arc<dyn Entitlements>,
    resolver: Arc<dyn MediaResolver>,
    tx: mpsc::Sender<Completion>,
    rx: mpsc::Receiver<Completion>,
}

impl IoRuntime {
    pub(crate) fn new(
        records: Arc<dyn RecordStore>,
        entitlements: Arc<dyn Entitlements>,
        resolver: Arc<dyn MediaResolver>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            records,
            entitlements,
            resolver,
            tx,
            rx,
        }
    }

    pub(crate) fn dispatch(&self, request: IoRequest) {
        debug!(?request, "dispatching");
        let tx = self.tx.clone();
        match request {
            IoRequest::FetchFeedPage { cursor, count } => {
                let records = Arc::clone(&self.records);
                thread::spawn(move || {
                    let result = records.fetch_feed_page(cursor, count);
                    let _ = tx.send(Completion::FeedPage { cursor, result });
                });
            }
            IoRequest::FetchWorkEpisodes { work_id } => {
                let records = Arc::clone(&self.records);
                thread::spawn(move || {
                    let result = records.fetch_work_episodes(&work_id);
                    let _ = tx.send(Completion::WorkEpisodes { work_id, result });
                });
            }
            IoRequest::CheckAccess {
                ticket,
                item,
                age_limit,
            } => {
                let gate = AccessGate::new(Arc::clone(&self.entitlements));
                thread::spawn(move || {
                    let step = gate.evaluate(&item, age_limit);
                    let _ = tx.send(Completion::AccessChecked { ticket, step });
                });
            }
            IoRequest::DebitCoins { ticket, item_id } => {
                let entitlements = Arc::clone(&self.entitlements);
                thread::spawn(move || {
                    let result = entitlements.check_and_debit_coins(&item_id);
                    let _ = tx.send(Completion::CoinDebit { ticket, result });
                });
            }
            IoRequest::RecordCheckpoint(checkpoint) => {
                let records = Arc::clone(&self.records);
                thread::spawn(move || {
                    let result = records.record_view_checkpoint(&checkpoint);
                    let _ = tx.send(Completion::CheckpointRecorded {
                        item_id: checkpoint.item_id,
                        result,
                    });
                });
            }
            IoRequest::ResolveMedia { ticket, stream_ref } => {
                let resolver = Arc::clone(&self.resolver);
                thread::spawn(move || {
                    let result = resolver.resolve_playable_source(&stream_ref);
                    let _ = tx.send(Completion::MediaResolved { ticket, result });
                });
            }
        }
    }

    pub(crate) fn drain(&self) -> Vec<Completion> {
        let mut out = Vec::new();
        while let Ok(completion) = self.rx.try_recv() {
            out.push(completion);
        }
        out
    }
}
