//! Process supervisor: owns the single runtime child of a node.
//!
//! All state transitions happen under one async mutex. Every spawned child
//! gets a generation number; an exit reported by a child that has since
//! been replaced or deliberately terminated is ignored, so a `restart`
//! can never be mistaken for a crash.
//!
//! ```text
//! Stopped → Starting → Running → Exited{code}
//!                                   ├── manual termination → Stopped
//!                                   ├── fail-fast          → Stopped (fatal code published)
//!                                   └── self-healing       → Restarting → Starting
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::command::RuntimeCommand;
use crate::error::{SupervisorError, SupervisorResult};
use crate::logs::{self, LogLine, Stream};
use crate::policy::{ExitPolicy, RestartBackoff};

/// A child that stays up this long resets the restart backoff.
const STABLE_UPTIME: Duration = Duration::from_secs(60);

const LOG_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Exited { code: Option<i32> },
    Restarting,
}

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub policy: ExitPolicy,
    /// Delay between stopping and starting in `restart`, and the first
    /// self-healing delay.
    pub restart_delay: Duration,
    pub max_restart_delay: Duration,
}

impl SupervisorOptions {
    pub fn new(policy: ExitPolicy) -> Self {
        Self {
            policy,
            restart_delay: Duration::from_secs(1),
            max_restart_delay: Duration::from_secs(30),
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration, max: Duration) -> Self {
        self.restart_delay = delay;
        self.max_restart_delay = max;
        self
    }
}

/// Point-in-time view of the supervisor, for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub phase: Phase,
    pub name: String,
    pub pid: Option<u32>,
    pub config_path: Option<PathBuf>,
    pub generation: u64,
    pub spawns: u64,
    pub manual_termination: bool,
}

struct RunningChild {
    generation: u64,
    pid: Option<u32>,
    started_at: Instant,
    kill_tx: oneshot::Sender<()>,
    exited_rx: oneshot::Receiver<Option<i32>>,
}

struct ProcessState {
    phase: Phase,
    name: String,
    config_path: Option<PathBuf>,
    sockets: Vec<PathBuf>,
    manual_termination: bool,
    generation: u64,
    spawns: u64,
    running: Option<RunningChild>,
    backoff: RestartBackoff,
}

struct Inner {
    command: RuntimeCommand,
    options: SupervisorOptions,
    state: Mutex<ProcessState>,
    fatal_tx: watch::Sender<Option<i32>>,
    logs_tx: broadcast::Sender<LogLine>,
}

/// Handle to the supervisor. Clones share the same child.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(command: RuntimeCommand, options: SupervisorOptions) -> Self {
        let (fatal_tx, _) = watch::channel(None);
        let (logs_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        let backoff = RestartBackoff::new(options.restart_delay, options.max_restart_delay);
        Self {
            inner: Arc::new(Inner {
                command,
                options,
                state: Mutex::new(ProcessState {
                    phase: Phase::Stopped,
                    name: String::new(),
                    config_path: None,
                    sockets: Vec::new(),
                    manual_termination: false,
                    generation: 0,
                    spawns: 0,
                    running: None,
                    backoff,
                }),
                fatal_tx,
                logs_tx,
            }),
        }
    }

    pub fn policy(&self) -> ExitPolicy {
        self.inner.options.policy
    }

    /// Exit code published when a fail-fast runtime dies. Stays `None`
    /// otherwise.
    pub fn fatal(&self) -> watch::Receiver<Option<i32>> {
        self.inner.fatal_tx.subscribe()
    }

    /// Classified runtime output.
    pub fn logs(&self) -> broadcast::Receiver<LogLine> {
        self.inner.logs_tx.subscribe()
    }

    /// Start the runtime on `config_path`. Returns `Ok(false)` without
    /// doing anything if a child is already running.
    pub async fn start(
        &self,
        config_path: &Path,
        name: &str,
        sockets: &[PathBuf],
    ) -> SupervisorResult<bool> {
        let mut state = self.inner.state.lock().await;
        if state.running.is_some() {
            debug!(name, "runtime already running; start ignored");
            return Ok(false);
        }
        state.name = name.to_string();
        state.config_path = Some(config_path.to_path_buf());
        state.sockets = sockets.to_vec();
        state.backoff.reset();
        Inner::spawn_or_fail(&self.inner, &mut state)?;
        Ok(true)
    }

    /// Terminate the child if any, and remove `sockets`. Nothing restarts
    /// afterwards regardless of policy.
    pub async fn stop(&self, sockets: &[PathBuf]) -> SupervisorResult<()> {
        let mut state = self.inner.state.lock().await;
        state.manual_termination = true;
        terminate(&mut state).await;
        remove_sockets(sockets);
        state.phase = Phase::Stopped;
        info!(name = %state.name, "runtime stopped");
        Ok(())
    }

    /// Terminate the current child, remove `sockets`, wait the restart
    /// delay and start a fresh child on `config_path`. When nothing was
    /// running the child starts without waiting.
    ///
    /// The supervisor lock is held throughout, so concurrent calls and
    /// exit handling of the old child queue behind it.
    pub async fn restart(&self, config_path: &Path, sockets: &[PathBuf]) -> SupervisorResult<()> {
        let mut state = self.inner.state.lock().await;
        let was_running = state.running.is_some();

        state.manual_termination = true;
        terminate(&mut state).await;
        remove_sockets(sockets);

        state.config_path = Some(config_path.to_path_buf());
        state.sockets = sockets.to_vec();
        if state.name.is_empty() {
            state.name = "runtime".to_string();
        }

        if was_running {
            state.phase = Phase::Restarting;
            let delay = self.inner.options.restart_delay;
            debug!(delay_ms = delay.as_millis() as u64, "waiting before restart");
            tokio::time::sleep(delay).await;
        }

        state.backoff.reset();
        Inner::spawn_or_fail(&self.inner, &mut state)
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.inner.state.lock().await;
        Snapshot {
            phase: state.phase,
            name: state.name.clone(),
            pid: state.running.as_ref().and_then(|r| r.pid),
            config_path: state.config_path.clone(),
            generation: state.generation,
            spawns: state.spawns,
            manual_termination: state.manual_termination,
        }
    }
}

impl Inner {
    /// Spawn a child; a spawn failure is handled by the exit policy and
    /// also returned.
    fn spawn_or_fail(inner: &Arc<Inner>, state: &mut ProcessState) -> SupervisorResult<()> {
        match Inner::spawn_child(inner, state) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(name = %state.name, error = %e, "runtime failed to start");
                Inner::handle_failure(inner, state, None);
                Err(e)
            }
        }
    }

    fn spawn_child(inner: &Arc<Inner>, state: &mut ProcessState) -> SupervisorResult<()> {
        let config_path = state.config_path.clone().ok_or(SupervisorError::NoConfig)?;
        state.phase = Phase::Starting;

        let mut child = inner
            .command
            .command(&config_path)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: inner.command.program.clone(),
                source,
            })?;

        state.generation += 1;
        state.spawns += 1;
        let generation = state.generation;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(logs::pump(stdout, Stream::Stdout, inner.logs_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(logs::pump(stderr, Stream::Stderr, inner.logs_tx.clone()));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = oneshot::channel();
        tokio::spawn(monitor(Arc::clone(inner), child, generation, kill_rx, exited_tx));

        state.running = Some(RunningChild {
            generation,
            pid,
            started_at: Instant::now(),
            kill_tx,
            exited_rx,
        });
        state.manual_termination = false;
        state.phase = Phase::Running;

        info!(
            name = %state.name,
            pid,
            generation,
            config = %config_path.display(),
            policy = inner.options.policy.as_str(),
            "runtime started"
        );
        Ok(())
    }

    async fn on_exit(inner: &Arc<Inner>, generation: u64, code: Option<i32>) {
        let mut state = inner.state.lock().await;
        let current = state.running.as_ref().map(|r| r.generation);
        if current != Some(generation) {
            debug!(generation, "ignoring exit of a replaced runtime");
            return;
        }
        let Some(running) = state.running.take() else {
            return;
        };
        state.phase = Phase::Exited { code };

        if state.manual_termination {
            state.phase = Phase::Stopped;
            return;
        }
        if running.started_at.elapsed() >= STABLE_UPTIME {
            state.backoff.reset();
        }

        if code == Some(0) {
            info!(name = %state.name, "runtime exited cleanly");
            remove_sockets(&state.sockets);
            state.phase = Phase::Stopped;
            return;
        }

        warn!(name = %state.name, pid = running.pid, ?code, "runtime exited");
        Inner::handle_failure(inner, &mut state, code);
    }

    /// Apply the exit policy to a crash or spawn failure. Sockets are
    /// removed first under both policies.
    fn handle_failure(inner: &Arc<Inner>, state: &mut ProcessState, code: Option<i32>) {
        remove_sockets(&state.sockets);

        match inner.options.policy {
            ExitPolicy::FailFast => {
                let code = code.filter(|c| *c != 0).unwrap_or(1);
                state.phase = Phase::Stopped;
                error!(name = %state.name, code, "runtime failed; not restarting");
                inner.fatal_tx.send_replace(Some(code));
            }
            ExitPolicy::SelfHealing => {
                let delay = state.backoff.next_delay();
                state.phase = Phase::Restarting;
                let expected = state.generation;
                warn!(
                    name = %state.name,
                    delay_ms = delay.as_millis() as u64,
                    attempt = state.backoff.consecutive_failures(),
                    "scheduling runtime restart"
                );
                let inner = Arc::clone(inner);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    Inner::resume(&inner, expected).await;
                });
            }
        }
    }

    /// Delayed self-healing start. Skipped if anything else started or
    /// stopped the runtime in the meantime.
    async fn resume(inner: &Arc<Inner>, expected: u64) {
        let mut state = inner.state.lock().await;
        if state.generation != expected || state.phase != Phase::Restarting || state.running.is_some() {
            debug!(expected, generation = state.generation, "self-healing restart superseded");
            return;
        }
        // spawn_or_fail schedules the next attempt on error
        let _ = Inner::spawn_or_fail(inner, &mut state);
    }
}

/// Wait for the child to exit or be killed, signal `exited_tx`, then run
/// exit handling.
async fn monitor(
    inner: Arc<Inner>,
    mut child: Child,
    generation: u64,
    kill_rx: oneshot::Receiver<()>,
    exited_tx: oneshot::Sender<Option<i32>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                debug!(generation, error = %e, "kill failed; child already gone");
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            error!(generation, error = %e, "failed to wait for runtime");
            None
        }
    };

    let _ = exited_tx.send(code);
    Inner::on_exit(&inner, generation, code).await;
}

/// Take the running child, kill it and wait until it is gone.
async fn terminate(state: &mut ProcessState) {
    if let Some(running) = state.running.take() {
        let _ = running.kill_tx.send(());
        let code = running.exited_rx.await.ok().flatten();
        info!(pid = running.pid, generation = running.generation, ?code, "runtime terminated");
    }
}

fn remove_sockets(sockets: &[PathBuf]) {
    for path in sockets {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "socket removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                let err = SupervisorError::Socket {
                    path: path.clone(),
                    source: e,
                };
                warn!(error = %err, "socket cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> RuntimeCommand {
        // `sh -c <script> sh <config>`: the config path arrives as $1.
        RuntimeCommand::new("/bin/sh").with_args(["-c", script, "sh"])
    }

    fn options(policy: ExitPolicy) -> SupervisorOptions {
        SupervisorOptions::new(policy).with_restart_delay(Duration::from_millis(50), Duration::from_millis(200))
    }

    async fn wait_until<F>(supervisor: &Supervisor, mut predicate: F) -> Snapshot
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let snapshot = supervisor.snapshot().await;
            if predicate(&snapshot) {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "timed out; last snapshot {snapshot:?}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn wait_for_line(rx: &mut broadcast::Receiver<LogLine>, needle: &str) -> LogLine {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await {
                    Ok(line) if line.message.contains(needle) => return line,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("log channel closed"),
                }
            }
        })
        .await
        .expect("log line not seen")
    }

    #[tokio::test]
    async fn start_runs_child_and_ignores_second_start() {
        let supervisor = Supervisor::new(sh("exec sleep 30"), options(ExitPolicy::SelfHealing));
        let config = PathBuf::from("/tmp/a.capnp");

        assert!(supervisor.start(&config, "node", &[]).await.unwrap());
        assert!(!supervisor.start(&config, "node", &[]).await.unwrap());

        let snapshot = supervisor.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Running);
        assert_eq!(snapshot.spawns, 1);
        assert!(snapshot.pid.is_some());
        assert!(!snapshot.manual_termination);

        supervisor.stop(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn restart_spawns_fresh_child_on_new_path() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("http.sock");
        std::fs::write(&socket, "").unwrap();

        let supervisor = Supervisor::new(
            sh("echo \"config=$1\"; exec sleep 30"),
            options(ExitPolicy::SelfHealing),
        );
        let mut logs = supervisor.logs();

        supervisor
            .start(&dir.path().join("old.capnp"), "node", &[socket.clone()])
            .await
            .unwrap();
        wait_for_line(&mut logs, "old.capnp").await;
        let before = supervisor.snapshot().await;

        let new_path = dir.path().join("new.capnp");
        supervisor.restart(&new_path, &[socket.clone()]).await.unwrap();
        assert!(!socket.exists());

        let line = wait_for_line(&mut logs, "new.capnp").await;
        assert_eq!(line.stream, Stream::Stdout);

        let after = supervisor.snapshot().await;
        assert_eq!(after.phase, Phase::Running);
        assert_eq!(after.config_path.as_deref(), Some(new_path.as_path()));
        assert_eq!(after.generation, before.generation + 1);
        assert_ne!(after.pid, before.pid);
        assert!(!after.manual_termination);

        // the killed child's exit must not trigger a self-healing restart
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(supervisor.snapshot().await.spawns, 2);

        supervisor.stop(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn restart_with_nothing_running_starts_immediately() {
        let supervisor = Supervisor::new(sh("exec sleep 30"), options(ExitPolicy::FailFast));
        supervisor.restart(Path::new("/tmp/x.capnp"), &[]).await.unwrap();
        let snapshot = supervisor.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Running);
        assert_eq!(snapshot.spawns, 1);
        supervisor.stop(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn self_healing_respawns_crashed_child() {
        let supervisor = Supervisor::new(sh("exit 1"), options(ExitPolicy::SelfHealing));
        let config = PathBuf::from("/tmp/crash.capnp");
        supervisor.start(&config, "node", &[]).await.unwrap();

        let snapshot = wait_until(&supervisor, |s| s.spawns >= 3).await;
        assert_eq!(snapshot.config_path.as_deref(), Some(config.as_path()));
        assert_eq!(*supervisor.fatal().borrow(), None);

        supervisor.stop(&[]).await.unwrap();
        let stopped = supervisor.snapshot().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(supervisor.snapshot().await.spawns, stopped.spawns);
        assert_eq!(supervisor.snapshot().await.phase, Phase::Stopped);
    }

    #[tokio::test]
    async fn fail_fast_publishes_exit_code_once() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("http.sock");
        std::fs::write(&socket, "").unwrap();

        let supervisor = Supervisor::new(sh("exit 3"), options(ExitPolicy::FailFast));
        let mut fatal = supervisor.fatal();
        supervisor
            .start(Path::new("/tmp/ff.capnp"), "node", &[socket.clone()])
            .await
            .unwrap();

        let code = tokio::time::timeout(Duration::from_secs(10), fatal.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*code, Some(3));
        drop(code);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let snapshot = supervisor.snapshot().await;
        assert_eq!(snapshot.spawns, 1);
        assert_eq!(snapshot.phase, Phase::Stopped);
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn manual_stop_never_restarts() {
        for policy in [ExitPolicy::FailFast, ExitPolicy::SelfHealing] {
            let supervisor = Supervisor::new(sh("exec sleep 30"), options(policy));
            supervisor.start(Path::new("/tmp/m.capnp"), "node", &[]).await.unwrap();
            supervisor.stop(&[]).await.unwrap();

            tokio::time::sleep(Duration::from_millis(300)).await;
            let snapshot = supervisor.snapshot().await;
            assert_eq!(snapshot.spawns, 1, "{policy:?}");
            assert_eq!(snapshot.phase, Phase::Stopped);
            assert!(snapshot.manual_termination);
            assert_eq!(*supervisor.fatal().borrow(), None);
        }
    }

    #[tokio::test]
    async fn clean_exit_is_not_restarted() {
        let supervisor = Supervisor::new(sh("exit 0"), options(ExitPolicy::SelfHealing));
        supervisor.start(Path::new("/tmp/c.capnp"), "node", &[]).await.unwrap();
        let snapshot = wait_until(&supervisor, |s| s.phase == Phase::Stopped).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(snapshot.spawns, 1);
        assert_eq!(supervisor.snapshot().await.spawns, 1);
    }

    #[tokio::test]
    async fn spawn_failure_follows_fail_fast_policy() {
        let supervisor = Supervisor::new(
            RuntimeCommand::new("/nonexistent/workgrid-runtime"),
            options(ExitPolicy::FailFast),
        );
        let err = supervisor.start(Path::new("/tmp/s.capnp"), "node", &[]).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert_eq!(*supervisor.fatal().borrow(), Some(1));
        assert_eq!(supervisor.snapshot().await.spawns, 0);
    }

    #[tokio::test]
    async fn framed_output_is_classified() {
        let supervisor = Supervisor::new(
            sh(r#"printf '\036{"id":"node-1","type":"worker","name":"blog"}\037 hello from blog\n'; printf 'plain diag\n' >&2; exec sleep 30"#),
            options(ExitPolicy::SelfHealing),
        );
        let mut logs = supervisor.logs();
        supervisor.start(Path::new("/tmp/l.capnp"), "node", &[]).await.unwrap();

        let framed = wait_for_line(&mut logs, "hello from blog").await;
        assert_eq!(framed.source, logs::LogSource::Worker);
        assert_eq!(framed.name, "blog");
        assert_eq!(framed.message, "hello from blog");

        supervisor.stop(&[]).await.unwrap();
    }
}
