use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::super::playback::{
    CoinDebit, FeedEntry, PlayableSource, ViewCheckpoint, WorkEpisodes,
};
use super::{Entitlements, MediaResolver, RecordStore};
use crate::config::Config;
use crate::error::RemoteError;
use crate::http::{RequestPolicy, get_text_with_retries, post_json};

const READ_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
struct FeedPage {
    entries: Vec<FeedEntry>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewerProfile {
    /// Highest age threshold the viewer has verified, if any.
    #[serde(default)]
    age_verified_for: Option<u8>,
    #[serde(default)]
    active_subscription: bool,
}

#[derive(Debug, Deserialize)]
struct SourceResponse {
    url: String,
}

/// JSON-over-HTTP client for the platform's record store, entitlement
/// service and media resolver.
#[derive(Debug)]
pub(crate) struct ApiClient {
    base: String,
    token: Option<String>,
    fetch_timeout: Duration,
    debit_timeout: Duration,
    profile: Mutex<Option<ViewerProfile>>,
}

impl ApiClient {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            base: config.api_base.clone(),
            token: config.api_token.clone(),
            fetch_timeout: config.fetch_timeout,
            debit_timeout: config.debit_timeout,
            profile: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn read_policy(&self) -> RequestPolicy {
        RequestPolicy::retrying(self.fetch_timeout, READ_ATTEMPTS)
    }

    fn get(&self, path: &str, query: &[(String, String)]) -> Result<String, RemoteError> {
        self.get_with(path, query, &self.read_policy())
    }

    fn get_with(
        &self,
        path: &str,
        query: &[(String, String)],
        policy: &RequestPolicy,
    ) -> Result<String, RemoteError> {
        Ok(get_text_with_retries(
            &self.url(path),
            self.token.as_deref(),
            query,
            policy,
        )?)
    }

    /// Cached `/me` snapshot. Only successful answers are cached; a single
    /// attempt keeps the lookup inside the caller's access-check deadline.
    fn profile(&self) -> Result<ViewerProfile, RemoteError> {
        if let Ok(cached) = self.profile.lock()
            && let Some(profile) = *cached
        {
            return Ok(profile);
        }
        let body = self.get_with("/me", &[], &RequestPolicy::once(self.fetch_timeout))?;
        let profile: ViewerProfile = serde_json::from_str(&body)?;
        debug!(?profile, "viewer profile loaded");
        if let Ok(mut cached) = self.profile.lock() {
            *cached = Some(profile);
        }
        Ok(profile)
    }
}

impl RecordStore for ApiClient {
    fn fetch_feed_page(&self, cursor: usize, count: usize) -> Result<Vec<FeedEntry>, RemoteError> {
        let query = vec![
            ("cursor".to_string(), cursor.to_string()),
            ("count".to_string(), count.to_string()),
        ];
        let body = self.get("/feed", &query)?;
        let page: FeedPage = serde_json::from_str(&body)?;
        Ok(page.entries)
    }

    fn fetch_work_episodes(&self, work_id: &str) -> Result<WorkEpisodes, RemoteError> {
        let body = self.get(&format!("/works/{}/episodes", path_segment(work_id)), &[])?;
        Ok(serde_json::from_str(&body)?)
    }

    fn record_view_checkpoint(&self, checkpoint: &ViewCheckpoint) -> Result<(), RemoteError> {
        let body = serde_json::to_string(checkpoint)?;
        post_json(
            &self.url("/views"),
            self.token.as_deref(),
            &body,
            &RequestPolicy::once(self.fetch_timeout),
        )?;
        Ok(())
    }
}

impl Entitlements for ApiClient {
    fn has_identity(&self) -> bool {
        self.token.is_some()
    }

    fn is_age_verified(&self, threshold: u8) -> Result<bool, RemoteError> {
        let profile = self.profile()?;
        Ok(profile
            .age_verified_for
            .is_some_and(|verified| verified >= threshold))
    }

    fn has_active_subscription(&self) -> Result<bool, RemoteError> {
        Ok(self.profile()?.active_subscription)
    }

    fn refresh(&self) {
        if let Ok(mut cached) = self.profile.lock()
            && cached.take().is_some()
        {
            debug!("viewer profile dropped");
        }
    }

    fn check_and_debit_coins(&self, item_id: &str) -> Result<CoinDebit, RemoteError> {
        if self.token.is_none() {
            return Err(RemoteError::Unavailable(
                "coin debit requires a signed-in viewer".to_string(),
            ));
        }
        let response = post_json(
            &self.url(&format!("/items/{}/unlock", path_segment(item_id))),
            self.token.as_deref(),
            "{}",
            &RequestPolicy::once(self.debit_timeout),
        );
        match response {
            Ok(body) => Ok(serde_json::from_str(&body)?),
            // 402 carries no body worth parsing: the balance is short.
            Err(err) if err.status() == Some(402) => Ok(CoinDebit {
                sufficient_balance: false,
                debited: false,
            }),
            Err(err) => Err(err.into()),
        }
    }
}

impl MediaResolver for ApiClient {
    fn resolve_playable_source(&self, stream_ref: &str) -> Result<PlayableSource, RemoteError> {
        if is_direct_locator(stream_ref) {
            return Ok(PlayableSource {
                locator: stream_ref.to_string(),
            });
        }
        let query = vec![("ref".to_string(), stream_ref.to_string())];
        let body = self.get("/media/source", &query)?;
        let source: SourceResponse = serde_json::from_str(&body)?;
        if source.url.trim().is_empty() {
            return Err(RemoteError::Unavailable(format!(
                "no playable source for {stream_ref}"
            )));
        }
        Ok(PlayableSource {
            locator: source.url,
        })
    }
}

pub(crate) fn is_direct_locator(stream_ref: &str) -> bool {
    let lowered = stream_ref.to_ascii_lowercase();
    ["http://", "https://", "file://"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
        || stream_ref.starts_with('/')
}

pub(crate) fn path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
