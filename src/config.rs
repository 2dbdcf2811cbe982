use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use crate::paths::database_file_path;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:3000/api";
pub const DEFAULT_PAGE_SIZE: usize = 5;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 8;
pub const DEFAULT_DEBIT_TIMEOUT_SECS: u64 = 10;
pub const PREFETCH_DISTANCE: usize = 2;

/// Runtime settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub api_token: Option<String>,
    pub player_bin: PathBuf,
    pub page_size: usize,
    pub prefetch_distance: usize,
    pub fetch_timeout: Duration,
    pub debit_timeout: Duration,
    pub database_path: PathBuf,
}

impl Config {
    pub fn from_env(api_base_override: Option<String>) -> Result<Self> {
        let database_path = match env::var_os("REELSTATE_DB") {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => database_file_path()?,
        };

        Ok(Self {
            api_base: api_base_override
                .map(|base| normalize_api_base(&base))
                .unwrap_or_else(|| resolve_api_base_from_env(env::var("REELSTATE_API_BASE").ok())),
            api_token: resolve_token_from_env(env::var("REELSTATE_API_TOKEN").ok()),
            player_bin: resolve_player_bin_from_env(env::var_os("REELSTATE_PLAYER_BIN")),
            page_size: resolve_positive_from_env(
                "REELSTATE_PAGE_SIZE",
                env::var("REELSTATE_PAGE_SIZE").ok(),
                DEFAULT_PAGE_SIZE as u64,
            ) as usize,
            prefetch_distance: PREFETCH_DISTANCE,
            fetch_timeout: Duration::from_secs(resolve_positive_from_env(
                "REELSTATE_FETCH_TIMEOUT_SECS",
                env::var("REELSTATE_FETCH_TIMEOUT_SECS").ok(),
                DEFAULT_FETCH_TIMEOUT_SECS,
            )),
            debit_timeout: Duration::from_secs(resolve_positive_from_env(
                "REELSTATE_DEBIT_TIMEOUT_SECS",
                env::var("REELSTATE_DEBIT_TIMEOUT_SECS").ok(),
                DEFAULT_DEBIT_TIMEOUT_SECS,
            )),
            database_path,
        })
    }

    pub fn has_identity(&self) -> bool {
        self.api_token.is_some()
    }
}

pub(crate) fn resolve_api_base_from_env(env_value: Option<String>) -> String {
    match env_value {
        Some(value) if !value.trim().is_empty() => normalize_api_base(&value),
        _ => DEFAULT_API_BASE.to_string(),
    }
}

pub(crate) fn normalize_api_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

pub(crate) fn resolve_token_from_env(env_value: Option<String>) -> Option<String> {
    env_value
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

pub(crate) fn resolve_player_bin_from_env(env_value: Option<OsString>) -> PathBuf {
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from("mpv"),
    }
}

pub(crate) fn resolve_positive_from_env(name: &str, env_value: Option<String>, default: u64) -> u64 {
    let Some(raw) = env_value else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => value,
        _ => {
            warn!(%name, value = %raw, default, "ignoring invalid numeric setting");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_defaults_when_unset_or_blank() {
        assert_eq!(resolve_api_base_from_env(None), DEFAULT_API_BASE);
        assert_eq!(
            resolve_api_base_from_env(Some("   ".to_string())),
            DEFAULT_API_BASE
        );
    }

    #[test]
    fn api_base_strips_trailing_slashes() {
        assert_eq!(
            resolve_api_base_from_env(Some("https://shorts.example/api//".to_string())),
            "https://shorts.example/api"
        );
    }

    #[test]
    fn blank_token_means_no_identity() {
        assert_eq!(resolve_token_from_env(Some("  ".to_string())), None);
        assert_eq!(
            resolve_token_from_env(Some(" abc ".to_string())).as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn player_bin_falls_back_to_mpv() {
        assert_eq!(resolve_player_bin_from_env(None), PathBuf::from("mpv"));
        assert_eq!(
            resolve_player_bin_from_env(Some(OsString::new())),
            PathBuf::from("mpv")
        );
        assert_eq!(
            resolve_player_bin_from_env(Some(OsString::from("/opt/bin/vlc"))),
            PathBuf::from("/opt/bin/vlc")
        );
    }

    #[test]
    fn invalid_numeric_settings_use_default() {
        assert_eq!(resolve_positive_from_env("X", None, 5), 5);
        assert_eq!(resolve_positive_from_env("X", Some("0".to_string()), 5), 5);
        assert_eq!(resolve_positive_from_env("X", Some("abc".to_string()), 5), 5);
        assert_eq!(resolve_positive_from_env("X", Some(" 12 ".to_string()), 5), 12);
    }
}
