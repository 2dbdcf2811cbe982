use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PlayerSignal {
    Ready,
    Progress(f64),
    Ended,
    Failed(String),
}

#[cfg(unix)]
fn send_signal(child: &Child, signum: libc::c_int) -> Result<()> {
    let pid = child.id() as libc::pid_t;
    if unsafe { libc::kill(pid, signum) } != 0 {
        return Err(anyhow!(
            "failed to signal player process {pid}: {}",
            std::io::Error::last_os_error()
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn suspend_child(child: &Child) -> Result<()> {
    send_signal(child, libc::SIGSTOP)
}

#[cfg(unix)]
fn continue_child(child: &Child) -> Result<()> {
    send_signal(child, libc::SIGCONT)
}

#[cfg(not(unix))]
fn suspend_child(_child: &Child) -> Result<()> {
    Err(anyhow!("pausing the player is not supported on this platform"))
}

#[cfg(not(unix))]
fn continue_child(_child: &Child) -> Result<()> {
    Ok(())
}

/// Media handle backed by an external player process. Playback time is
/// tracked on the wall clock from the requested start offset; pausing
/// suspends the process, seeking and mute changes restart it at the new
/// position.
#[derive(Debug)]
pub(crate) struct ExternalPlayer {
    bin: PathBuf,
    locator: String,
    muted: bool,
    child: Option<Child>,
    base_offset: f64,
    accumulated: f64,
    running_since: Option<Instant>,
    announced_ready: bool,
}

impl ExternalPlayer {
    pub(crate) fn start(bin: &Path, locator: &str, start_at: u64, muted: bool) -> Result<Self> {
        let mut player = Self {
            bin: bin.to_path_buf(),
            locator: locator.to_string(),
            muted,
            child: None,
            base_offset: start_at as f64,
            accumulated: 0.0,
            running_since: None,
            announced_ready: false,
        };
        player.spawn_at(player.base_offset)?;
        Ok(player)
    }

    fn spawn_at(&mut self, offset: f64) -> Result<()> {
        let child = ProcessCommand::new(&self.bin)
            .arg("--really-quiet")
            .arg("--no-terminal")
            .arg(format!("--start={}", offset.floor() as u64))
            .arg(format!("--mute={}", if self.muted { "yes" } else { "no" }))
            .arg(&self.locator)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {}", self.bin.display()))?;
        debug!(pid = child.id(), offset, "player started");
        self.child = Some(child);
        self.base_offset = offset;
        self.accumulated = 0.0;
        self.running_since = Some(Instant::now());
        Ok(())
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.child.is_some() && self.running_since.is_none()
    }

    pub(crate) fn current_time(&self) -> f64 {
        let running = self
            .running_since
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        self.base_offset + self.accumulated + running
    }

    pub(crate) fn pause(&mut self) -> Result<()> {
        let Some(child) = self.child.as_ref() else {
            return Ok(());
        };
        let Some(since) = self.running_since else {
            return Ok(());
        };
        suspend_child(child)?;
        self.accumulated += since.elapsed().as_secs_f64();
        self.running_since = None;
        Ok(())
    }

    pub(crate) fn resume(&mut self) -> Result<()> {
        let Some(child) = self.child.as_ref() else {
            return Ok(());
        };
        if self.running_since.is_some() {
            return Ok(());
        }
        continue_child(child)?;
        self.running_since = Some(Instant::now());
        Ok(())
    }

    pub(crate) fn seek(&mut self, position: u64) -> Result<()> {
        self.restart_at(position as f64)
    }

    pub(crate) fn set_muted(&mut self, muted: bool) -> Result<()> {
        if self.muted == muted {
            return Ok(());
        }
        self.muted = muted;
        let position = self.current_time();
        self.restart_at(position)
    }

    fn restart_at(&mut self, position: f64) -> Result<()> {
        let was_paused = self.is_paused();
        self.kill_child();
        self.spawn_at(position.max(0.0))?;
        if was_paused {
            self.pause()?;
        }
        Ok(())
    }

    /// First call after a start reports `Ready`; later calls report progress
    /// until the process exits.
    pub(crate) fn poll(&mut self) -> PlayerSignal {
        if !self.announced_ready {
            self.announced_ready = true;
            return PlayerSignal::Ready;
        }
        let Some(child) = self.child.as_mut() else {
            return PlayerSignal::Failed("player is not running".to_string());
        };
        match child.try_wait() {
            Ok(None) => PlayerSignal::Progress(self.current_time()),
            Ok(Some(status)) => {
                self.child = None;
                self.running_since = None;
                if status.success() {
                    PlayerSignal::Ended
                } else {
                    PlayerSignal::Failed(format!("player exited with {status}"))
                }
            }
            Err(err) => PlayerSignal::Failed(format!("failed to poll player: {err}")),
        }
    }

    pub(crate) fn stop(&mut self) {
        self.kill_child();
        self.running_since = None;
    }

    fn kill_child(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if self.running_since.is_none() {
            let _ = continue_child(&child);
        }
        if let Err(err) = child.kill() {
            debug!(%err, "player already exited");
        }
        if let Err(err) = child.wait() {
            warn!(%err, "failed to reap player process");
        }
    }
}

impl Drop for ExternalPlayer {
    fn drop(&mut self) {
        self.kill_child();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_binary_fails_to_start() {
        let result = ExternalPlayer::start(
            Path::new("/nonexistent/reelstate-player"),
            "https://cdn.example/ep1.mp4",
            0,
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn reports_ready_then_natural_end() {
        let mut player =
            ExternalPlayer::start(Path::new("true"), "ignored", 12, true).expect("spawn true");
        assert_eq!(player.poll(), PlayerSignal::Ready);
        assert!(player.current_time() >= 12.0);

        let mut signal = player.poll();
        for _ in 0..100 {
            if signal == PlayerSignal::Ended {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
            signal = player.poll();
        }
        assert_eq!(signal, PlayerSignal::Ended);
    }

    #[test]
    fn non_zero_exit_is_a_failure() {
        let mut player =
            ExternalPlayer::start(Path::new("false"), "ignored", 0, false).expect("spawn false");
        assert_eq!(player.poll(), PlayerSignal::Ready);

        let mut signal = player.poll();
        for _ in 0..100 {
            if matches!(signal, PlayerSignal::Failed(_)) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
            signal = player.poll();
        }
        assert!(matches!(signal, PlayerSignal::Failed(_)), "got {signal:?}");
    }

    #[test]
    fn paused_clock_does_not_advance() {
        let mut player =
            ExternalPlayer::start(Path::new("sleep"), "5", 30, true).expect("spawn sleep");
        player.pause().expect("pause");
        let frozen = player.current_time();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(player.current_time(), frozen);
        assert!(player.is_paused());
        player.resume().expect("resume");
        assert!(!player.is_paused());
        player.stop();
    }
}
