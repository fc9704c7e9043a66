//! Backend inference server supervision.
//!
//! The gateway launches the backend as a child process, drains its output
//! into the log, blocks startup until the backend's `/health` endpoint
//! answers, and terminates it on shutdown.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::{BackendConfig, DEFAULT_READY_TIMEOUT_SECS};

// Constants for readiness polling
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(2);
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to spawn backend {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// `code` is `None` when the process was killed by a signal.
    #[error("Backend process exited unexpectedly with code {code:?} (waited {waited_secs} seconds)")]
    Exited { code: Option<i32>, waited_secs: u64 },

    #[error(
        "Backend did not become ready in time (waited {waited_secs} seconds, process running: {running})"
    )]
    NotReady { waited_secs: u64, running: bool },

    #[error("Failed to build health probe client: {0}")]
    Probe(#[from] reqwest::Error),
}

/// How the readiness wait polls the backend.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub poll_interval: Duration,
    /// Interval between "still waiting" log lines.
    pub heartbeat_interval: Duration,
    pub timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: HEALTH_CHECK_INTERVAL,
            heartbeat_interval: STATUS_LOG_INTERVAL,
            timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
        }
    }
}

impl ReadinessPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Full argument list for the backend server, wrapper arguments first.
pub fn launch_args(config: &BackendConfig) -> Vec<String> {
    let mut args = config.server_args.clone();
    args.extend([
        "--model".to_string(),
        config.model_path.clone(),
        "--host".to_string(),
        config.bind_host.clone(),
        "--port".to_string(),
        config.port.to_string(),
        "--served-model-name".to_string(),
        config.served_model_name.clone(),
        "--max-model-len".to_string(),
        config.max_model_len.to_string(),
        "--gpu-memory-utilization".to_string(),
        config.gpu_memory_utilization.to_string(),
        "--trust-remote-code".to_string(),
        "--max-num-seqs".to_string(),
        config.max_num_seqs.to_string(),
        "--max-num-batched-tokens".to_string(),
        config.max_num_batched_tokens.to_string(),
        "--block-size".to_string(),
        config.block_size.to_string(),
        "--enable-prefix-caching".to_string(),
    ]);
    args.extend(config.extra_args.iter().cloned());
    args
}

/// A supervised backend server process.
pub struct BackendProcess {
    program: String,
    process: Mutex<Option<Child>>,
    shutdown_timeout: Duration,
}

impl BackendProcess {
    /// Launch the backend described by `config`.
    pub fn launch(config: &BackendConfig) -> Result<Self, SupervisorError> {
        Self::spawn(
            &config.server_binary,
            &launch_args(config),
            Duration::from_secs(config.shutdown_timeout_secs),
        )
    }

    /// Spawn `program` with `args`, draining its stdout and stderr into the log.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        program: &str,
        args: &[String],
        shutdown_timeout: Duration,
    ) -> Result<Self, SupervisorError> {
        tracing::info!("Starting backend server: {} {:?}", program, args);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            program: program.to_string(),
            source,
        })?;

        if let Some(stdout) = process.stdout.take() {
            tokio::spawn(drain_output(stdout, "stdout"));
        }
        if let Some(stderr) = process.stderr.take() {
            tokio::spawn(drain_output(stderr, "stderr"));
        }

        tracing::info!("Spawned backend server (pid: {:?})", process.id());

        Ok(Self {
            program: program.to_string(),
            process: Mutex::new(Some(process)),
            shutdown_timeout,
        })
    }

    pub async fn id(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(Child::id)
    }

    /// Exit status if the process has terminated, `None` while it runs or
    /// once it has been stopped.
    async fn exit_status(&self) -> Option<ExitStatus> {
        let mut process = self.process.lock().await;
        match *process {
            Some(ref mut child) => child.try_wait().ok().flatten(),
            None => None,
        }
    }

    /// Check if the backend process is still alive.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        match *process {
            Some(ref mut child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Poll `health_url` until it answers 2xx.
    ///
    /// Fails as soon as the process exits, or when `policy.timeout` elapses.
    /// Returns how long the backend took to become ready.
    pub async fn wait_until_ready(
        &self,
        health_url: &str,
        policy: ReadinessPolicy,
    ) -> Result<Duration, SupervisorError> {
        let client = Client::builder().timeout(HEALTH_PROBE_TIMEOUT).build()?;
        let start = Instant::now();
        let mut last_status_log = start;

        tracing::info!(
            "Waiting for backend readiness at {} (timeout: {} seconds)",
            health_url,
            policy.timeout.as_secs()
        );

        while start.elapsed() < policy.timeout {
            if let Some(status) = self.exit_status().await {
                return Err(SupervisorError::Exited {
                    code: status.code(),
                    waited_secs: start.elapsed().as_secs(),
                });
            }

            if let Ok(resp) = client.get(health_url).send().await {
                if resp.status().is_success() {
                    let elapsed = start.elapsed();
                    tracing::info!("Backend server is ready (took {} seconds)", elapsed.as_secs());
                    return Ok(elapsed);
                }
            }

            let now = Instant::now();
            if now.duration_since(last_status_log) >= policy.heartbeat_interval {
                let elapsed = now.duration_since(start);
                tracing::info!(
                    "Still waiting for backend... (elapsed: {} seconds, remaining: {} seconds, process running: {})",
                    elapsed.as_secs(),
                    policy.timeout.saturating_sub(elapsed).as_secs(),
                    self.is_running().await
                );
                last_status_log = now;
            }

            tokio::time::sleep(policy.poll_interval).await;
        }

        Err(SupervisorError::NotReady {
            waited_secs: start.elapsed().as_secs(),
            running: self.is_running().await,
        })
    }

    /// Terminate the backend: SIGTERM, then SIGKILL after the shutdown timeout.
    ///
    /// Safe to call repeatedly and after the process has already exited.
    pub async fn stop(&self) {
        let mut process_guard = self.process.lock().await;
        let Some(mut child) = process_guard.take() else {
            return;
        };

        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!("Backend {} already exited with {}", self.program, status);
            return;
        }

        tracing::info!("Stopping backend server");

        // Try SIGTERM first on Unix
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(self.shutdown_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!("Backend server exited with {}", status);
            }
            Ok(Err(e)) => {
                tracing::warn!("Error waiting for backend server: {}", e);
            }
            Err(_timeout) => {
                tracing::warn!("Backend server did not terminate in time; killing");
                let _ = child.kill().await;
            }
        }
    }
}

/// Log each line of a backend output stream until it closes.
///
/// Invalid UTF-8 is replaced rather than dropped.
async fn drain_output<R>(stream: R, name: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).split(b'\n');
    loop {
        match lines.next_segment().await {
            Ok(Some(line)) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end();
                if !text.is_empty() {
                    tracing::info!("[backend] {}", text);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Error reading backend {}: {}", name, e);
                break;
            }
        }
    }
    tracing::info!("Backend {} reader finished", name);
}
