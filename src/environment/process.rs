//! Child-process environment.
//!
//! Runs the server's startup invocation through `sh -c` inside the server's
//! root directory. Output is forwarded to the log, input is written to the
//! child's stdin, and a monitor task owns the `Child` so that a kill request
//! can be delivered while another task is waiting for the process to stop.

use super::{Environment, EnvironmentError, EnvironmentSettings, ProcessState, Signal};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct RunningProcess {
    stdin: Option<Arc<tokio::sync::Mutex<ChildStdin>>>,
    kill: CancellationToken,
}

struct Inner {
    name: String,
    root: PathBuf,
    stop_command: Option<String>,
    settings: RwLock<EnvironmentSettings>,
    state: watch::Sender<ProcessState>,
    running: Mutex<Option<RunningProcess>>,
    destroyed: AtomicBool,
}

/// An [`Environment`] backed by a local child process.
#[derive(Clone)]
pub struct ProcessEnvironment {
    inner: Arc<Inner>,
}

impl ProcessEnvironment {
    /// Creates an offline environment.
    ///
    /// `stop_command` is written to stdin to request a graceful stop. Without
    /// one, stopping kills the process outright.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, stop_command: Option<String>) -> Self {
        let (state, _) = watch::channel(ProcessState::Offline);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                root: root.into(),
                stop_command,
                settings: RwLock::new(EnvironmentSettings::default()),
                state,
                running: Mutex::new(None),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    async fn wait_until_offline(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives as long as `inner`, so this only returns once offline.
        let _ = rx.wait_for(|s| *s == ProcessState::Offline).await;
    }

    fn forward_output<R>(name: String, stream: R)
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(server = %name, %line, "console");
            }
        });
    }
}

#[async_trait]
impl Environment for ProcessEnvironment {
    fn state(&self) -> ProcessState {
        *self.inner.state.borrow()
    }

    async fn start(&self) -> Result<(), EnvironmentError> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(EnvironmentError::Destroyed);
        }
        let settings = self.inner.settings.read().clone();
        if settings.invocation.trim().is_empty() {
            return Err(EnvironmentError::MissingInvocation);
        }
        // The kill token is registered together with the Starting claim so a
        // kill issued before the child exists is not lost.
        let kill = CancellationToken::new();
        {
            let mut running = self.inner.running.lock();
            let claimed = self.inner.state.send_if_modified(|s| {
                if *s == ProcessState::Offline {
                    *s = ProcessState::Starting;
                    true
                } else {
                    false
                }
            });
            if !claimed {
                return Err(EnvironmentError::AlreadyRunning);
            }
            *running = Some(RunningProcess {
                stdin: None,
                kill: kill.clone(),
            });
        }

        let spawned = async {
            tokio::fs::create_dir_all(&self.inner.root).await?;
            Command::new("sh")
                .arg("-c")
                .arg(&settings.invocation)
                .current_dir(&self.inner.root)
                .envs(&settings.variables)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
        }
        .await;
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                *self.inner.running.lock() = None;
                self.inner.state.send_replace(ProcessState::Offline);
                return Err(e.into());
            }
        };

        if let Some(stdout) = child.stdout.take() {
            Self::forward_output(self.inner.name.clone(), stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            Self::forward_output(self.inner.name.clone(), stderr);
        }

        if let Some(running) = self.inner.running.lock().as_mut() {
            running.stdin = child.stdin.take().map(|s| Arc::new(tokio::sync::Mutex::new(s)));
        }
        self.inner.state.send_replace(ProcessState::Running);
        info!(server = %self.inner.name, pid = ?child.id(), "server process started");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        warn!(server = %inner.name, error = %e, "failed to kill server process");
                    }
                    child.wait().await
                }
            };
            match status {
                Ok(status) => info!(server = %inner.name, %status, "server process exited"),
                Err(e) => warn!(server = %inner.name, error = %e, "failed to wait on server process"),
            }
            *inner.running.lock() = None;
            inner.state.send_replace(ProcessState::Offline);
        });

        Ok(())
    }

    async fn wait_for_stop(&self, timeout: Duration, terminate: bool) -> Result<(), EnvironmentError> {
        if self.state() == ProcessState::Offline {
            return Ok(());
        }
        let Some(stop_command) = self.inner.stop_command.clone() else {
            return self.terminate(Signal::Kill).await;
        };

        self.inner.state.send_if_modified(|s| {
            if matches!(s, ProcessState::Starting | ProcessState::Running) {
                *s = ProcessState::Stopping;
                true
            } else {
                false
            }
        });
        match self.send_command(&stop_command).await {
            // Exited between the state check and the write.
            Ok(()) | Err(EnvironmentError::NotRunning) => {}
            Err(e) => return Err(e),
        }

        match tokio::time::timeout(timeout, self.wait_until_offline()).await {
            Ok(()) => Ok(()),
            Err(_) if terminate => {
                warn!(
                    server = %self.inner.name,
                    timeout_secs = timeout.as_secs(),
                    "server did not stop in time, terminating process"
                );
                self.terminate(Signal::Kill).await
            }
            Err(_) => Err(EnvironmentError::StopTimeout(timeout.as_secs())),
        }
    }

    async fn terminate(&self, signal: Signal) -> Result<(), EnvironmentError> {
        if signal != Signal::Kill {
            return Err(EnvironmentError::UnsupportedSignal(signal));
        }
        let token = self.inner.running.lock().as_ref().map(|p| p.kill.clone());
        let Some(token) = token else {
            return Ok(());
        };
        token.cancel();
        self.wait_until_offline().await;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), EnvironmentError> {
        self.terminate(Signal::Kill).await?;
        self.inner.destroyed.store(true, Ordering::SeqCst);
        info!(server = %self.inner.name, "server environment destroyed");
        Ok(())
    }

    async fn send_command(&self, command: &str) -> Result<(), EnvironmentError> {
        let stdin = self
            .inner
            .running
            .lock()
            .as_ref()
            .and_then(|p| p.stdin.clone())
            .ok_or(EnvironmentError::NotRunning)?;
        let mut stdin = stdin.lock().await;
        stdin.write_all(command.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    fn apply_settings(&self, settings: EnvironmentSettings) {
        *self.inner.settings.write() = settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment(root: &std::path::Path, invocation: &str, stop: Option<&str>) -> ProcessEnvironment {
        let env = ProcessEnvironment::new("test", root, stop.map(str::to_string));
        env.apply_settings(EnvironmentSettings {
            invocation: invocation.to_string(),
            ..Default::default()
        });
        env
    }

    #[tokio::test]
    async fn test_start_and_graceful_stop() {
        let dir = tempfile::tempdir().unwrap();
        // Exits as soon as it reads the stop line.
        let env = environment(dir.path(), "read line; exit 0", Some("stop"));

        env.start().await.unwrap();
        assert_eq!(env.state(), ProcessState::Running);
        assert!(matches!(env.start().await, Err(EnvironmentError::AlreadyRunning)));

        env.wait_for_stop(Duration::from_secs(10), false).await.unwrap();
        assert_eq!(env.state(), ProcessState::Offline);
    }

    #[tokio::test]
    async fn test_stop_timeout_without_terminate_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), "sleep 30", Some("stop"));
        env.start().await.unwrap();

        let result = env.wait_for_stop(Duration::from_millis(200), false).await;
        assert!(matches!(result, Err(EnvironmentError::StopTimeout(_))));

        env.terminate(Signal::Kill).await.unwrap();
        assert_eq!(env.state(), ProcessState::Offline);
    }

    #[tokio::test]
    async fn test_stop_timeout_with_terminate_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), "sleep 30", Some("stop"));
        env.start().await.unwrap();

        env.wait_for_stop(Duration::from_millis(200), true).await.unwrap();
        assert_eq!(env.state(), ProcessState::Offline);
    }

    #[tokio::test]
    async fn test_kill_during_startup_is_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), "sleep 30", None);

        let starting = tokio::spawn({
            let env = env.clone();
            async move { env.start().await }
        });
        let mut state = env.inner.state.subscribe();
        state.wait_for(|s| *s != ProcessState::Offline).await.unwrap();

        // Whether the child is spawned yet or not, the kill must take effect.
        tokio::time::timeout(Duration::from_secs(10), env.terminate(Signal::Kill))
            .await
            .unwrap()
            .unwrap();
        starting.await.unwrap().unwrap();

        tokio::time::timeout(Duration::from_secs(10), env.wait_until_offline())
            .await
            .unwrap();
        assert_eq!(env.state(), ProcessState::Offline);
        assert!(env.inner.running.lock().is_none());
    }

    #[tokio::test]
    async fn test_missing_invocation_and_destroyed() {
        let dir = tempfile::tempdir().unwrap();
        let env = environment(dir.path(), "  ", None);
        assert!(matches!(env.start().await, Err(EnvironmentError::MissingInvocation)));
        assert!(matches!(env.send_command("say hi").await, Err(EnvironmentError::NotRunning)));
        assert!(matches!(
            env.terminate(Signal::Terminate).await,
            Err(EnvironmentError::UnsupportedSignal(Signal::Terminate))
        ));

        env.destroy().await.unwrap();
        assert!(matches!(env.start().await, Err(EnvironmentError::Destroyed)));
    }
}
