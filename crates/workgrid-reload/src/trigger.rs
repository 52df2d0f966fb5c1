//! Reload triggers: payload-free "something changed" notifications.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ReloadError, ReloadResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadCause {
    /// Debounced filesystem changes; `events` is how many were coalesced.
    Filesystem { events: usize },
    Manual,
}

/// Source of reload notifications. `None` means the source is gone and
/// the driver should stop.
pub trait ReloadTrigger: Send {
    fn next(&mut self) -> impl Future<Output = Option<ReloadCause>> + Send;
}

// ── Filesystem watch ───────────────────────────────────────────────

/// Watches the state directory recursively and fires once per burst of
/// changes, after `debounce` of quiet.
pub struct FsWatchTrigger {
    debounce: Duration,
    /// Changes confined to these paths never fire.
    ignored: Vec<PathBuf>,
    /// Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
    raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl FsWatchTrigger {
    pub fn new(root: &Path, debounce: Duration) -> ReloadResult<Self> {
        std::fs::create_dir_all(root).map_err(|e| ReloadError::Io {
            path: root.to_path_buf(),
            source: e,
        })?;
        // event paths are built from the watched path
        let root = root.canonicalize().map_err(|e| ReloadError::Io {
            path: root.to_path_buf(),
            source: e,
        })?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!(path = %root.display(), debounce_ms = debounce.as_millis() as u64, "watching state directory");

        Ok(Self {
            debounce,
            ignored: Vec::new(),
            _watcher: watcher,
            raw_rx,
        })
    }

    /// Ignore changes under `path`, e.g. a config output directory that
    /// lives inside the watched tree.
    pub fn ignore(mut self, path: &Path) -> Self {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.ignored.push(path);
        self
    }

    fn is_relevant(&self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event.paths.is_empty()
            || event
                .paths
                .iter()
                .any(|p| !self.ignored.iter().any(|ignored| p.starts_with(ignored)))
    }

    /// Next change event that can alter desired state. `None` once the
    /// watcher channel closes.
    async fn next_relevant(&mut self) -> Option<Event> {
        loop {
            match self.raw_rx.recv().await? {
                Ok(event) if self.is_relevant(&event) => return Some(event),
                Ok(_) => continue,
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            }
        }
    }
}

impl ReloadTrigger for FsWatchTrigger {
    async fn next(&mut self) -> Option<ReloadCause> {
        let first = self.next_relevant().await?;
        debug!(paths = ?first.paths, "state change detected");

        let mut events = 1;
        loop {
            match tokio::time::timeout(self.debounce, self.raw_rx.recv()).await {
                Ok(Some(Ok(event))) if self.is_relevant(&event) => events += 1,
                Ok(Some(_)) => {}
                // channel closed or quiet period elapsed
                Ok(None) | Err(_) => break,
            }
        }
        Some(ReloadCause::Filesystem { events })
    }
}

// ── Manual ─────────────────────────────────────────────────────────

/// Trigger fired through a [`ManualHandle`]. Requests made while a reload
/// is in progress coalesce into one.
pub struct ManualTrigger {
    rx: mpsc::UnboundedReceiver<()>,
}

#[derive(Clone)]
pub struct ManualHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualHandle {
    /// Request a reload. Returns `false` if the trigger is gone.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

impl ManualTrigger {
    pub fn channel() -> (Self, ManualHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ManualHandle { tx })
    }
}

impl ReloadTrigger for ManualTrigger {
    async fn next(&mut self) -> Option<ReloadCause> {
        self.rx.recv().await?;
        while self.rx.try_recv().is_ok() {}
        Some(ReloadCause::Manual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_requests_coalesce() {
        let (mut trigger, handle) = ManualTrigger::channel();
        assert!(handle.fire());
        assert!(handle.fire());
        assert!(handle.fire());

        assert_eq!(trigger.next().await, Some(ReloadCause::Manual));
        let pending = tokio::time::timeout(Duration::from_millis(50), trigger.next()).await;
        assert!(pending.is_err(), "extra requests should have been coalesced");
    }

    #[tokio::test]
    async fn manual_trigger_ends_when_handles_drop() {
        let (mut trigger, handle) = ManualTrigger::channel();
        drop(handle);
        assert_eq!(trigger.next().await, None);
    }

    #[tokio::test]
    async fn fs_watch_debounces_a_burst() {
        let dir = tempfile::tempdir().unwrap();
        let mut trigger = FsWatchTrigger::new(dir.path(), Duration::from_millis(200)).unwrap();

        let root = dir.path().to_path_buf();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            for i in 0..5 {
                std::fs::write(root.join(format!("f{i}.txt")), "x").unwrap();
            }
        });

        let cause = tokio::time::timeout(Duration::from_secs(10), trigger.next())
            .await
            .expect("no filesystem event");
        assert!(matches!(cause, Some(ReloadCause::Filesystem { events }) if events >= 1));

        // the burst was consumed by the first firing
        let again = tokio::time::timeout(Duration::from_millis(400), trigger.next()).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn fs_watch_keeps_changes_made_before_first_poll() {
        let dir = tempfile::tempdir().unwrap();
        let mut trigger = FsWatchTrigger::new(dir.path(), Duration::from_millis(50)).unwrap();

        // an edit while the initial build is still running
        std::fs::write(dir.path().join("worker.toml"), "edited").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let fired = tokio::time::timeout(Duration::from_secs(10), trigger.next()).await;
        assert!(matches!(fired, Ok(Some(ReloadCause::Filesystem { .. }))));
    }

    #[tokio::test]
    async fn fs_watch_skips_ignored_paths() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join(".workgrid");
        std::fs::create_dir_all(&out).unwrap();
        let mut trigger = FsWatchTrigger::new(dir.path(), Duration::from_millis(100))
            .unwrap()
            .ignore(&out);

        std::fs::write(out.join("config.capnp"), "generated").unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(400), trigger.next()).await;
        assert!(quiet.is_err(), "writes under an ignored path must not fire");

        std::fs::write(dir.path().join("worker.toml"), "changed").unwrap();
        let fired = tokio::time::timeout(Duration::from_secs(10), trigger.next()).await;
        assert!(matches!(fired, Ok(Some(ReloadCause::Filesystem { .. }))));
    }
}
