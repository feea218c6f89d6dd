//! [`ImageRuntime`] backed by the `docker` CLI (or any compatible CLI).
//!
//! Every call is a subprocess run under a timeout. Filesystem exports go
//! through an ephemeral container that is created (never started), piped
//! through `docker export`, and force-removed when the export stream drops.

use super::{ImageRuntime, RuntimeConfig};
use crate::error::{ExtractError, Result};
use crate::metadata::{parse_history_output, ImageInspect, LayerRecord};
use log::{debug, info, warn};
use std::io::{self, Read};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Why a runtime subprocess did not produce output.
#[derive(Debug)]
enum CommandError {
    Spawn(io::Error),
    Wait(io::Error),
    TimedOut(Duration),
    Failed(String),
}

impl CommandError {
    fn into_extract_error(self, action: &str) -> ExtractError {
        match self {
            CommandError::Spawn(e) => {
                ExtractError::RuntimeUnavailable(format!("cannot run runtime CLI: {e}"))
            }
            CommandError::Wait(e) => ExtractError::Transport(format!("{action}: {e}")),
            CommandError::TimedOut(after) => {
                ExtractError::Transport(format!("{action} timed out after {after:?}"))
            }
            CommandError::Failed(stderr) => classify_stderr(action, &stderr),
        }
    }
}

fn is_daemon_unreachable(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("cannot connect to")
        || lower.contains("error during connect")
        || lower.contains("is the docker daemon running")
}

fn is_image_missing(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such image")
        || lower.contains("no such object")
        || lower.contains("pull access denied")
        || lower.contains("repository does not exist")
        || lower.contains("requested access to the resource is denied")
        || lower.contains("manifest unknown")
        || lower.contains("name unknown")
        || lower.contains("image not known")
        || lower.contains("invalid reference format")
}

fn classify_stderr(action: &str, stderr: &str) -> ExtractError {
    let stderr = stderr.trim();
    if is_daemon_unreachable(stderr) {
        ExtractError::RuntimeUnavailable(stderr.to_string())
    } else if is_image_missing(stderr) {
        ExtractError::ImageNotFound(stderr.to_string())
    } else {
        ExtractError::Transport(format!("{action} failed: {stderr}"))
    }
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kills `child` and reaps it so no zombie is left behind.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn run_with_timeout(
    binary: &str,
    base_args: &[String],
    args: &[&str],
    timeout: Duration,
) -> std::result::Result<String, CommandError> {
    debug!("Running {} {:?}", binary, args);
    let mut child = Command::new(binary)
        .args(base_args)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(CommandError::Spawn)?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_with_deadline(&mut child, timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            abandon(&mut child);
            return Err(CommandError::TimedOut(timeout));
        }
        Err(e) => {
            abandon(&mut child);
            return Err(CommandError::Wait(e));
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    if !status.success() {
        return Err(CommandError::Failed(
            String::from_utf8_lossy(&stderr).to_string(),
        ));
    }

    Ok(String::from_utf8_lossy(&stdout).to_string())
}

/// A created-but-never-started container, force-removed on drop.
struct EphemeralContainer {
    binary: String,
    base_args: Vec<String>,
    id: String,
    timeout: Duration,
}

impl Drop for EphemeralContainer {
    fn drop(&mut self) {
        debug!("Removing ephemeral container {}", self.id);
        if let Err(e) = run_with_timeout(
            &self.binary,
            &self.base_args,
            &["rm", "-f", self.id.as_str()],
            self.timeout,
        ) {
            warn!("Failed to remove ephemeral container {}: {:?}", self.id, e);
        }
    }
}

/// Chunks of a running `docker export`.
///
/// A helper thread reads the pipe and forwards fixed-size chunks over a
/// bounded channel. Dropping the stream kills the export process first and
/// then removes the container.
pub struct ExportStream {
    child: Child,
    chunks: Receiver<io::Result<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    idle_timeout: Duration,
    exit_timeout: Duration,
    finished: bool,
    // Declared last so it drops after the export process is reaped.
    container: EphemeralContainer,
}

impl ExportStream {
    fn spawn(container: EphemeralContainer, config: &RuntimeConfig) -> Result<Self> {
        let mut child = Command::new(&config.binary)
            .args(&config.base_args)
            .args(["export", container.id.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CommandError::Spawn(e).into_extract_error("export"))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::Transport("export stdout not captured".to_string()))?;
        let stderr: Option<ChildStderr> = child.stderr.take();

        let (tx, rx) = mpsc::sync_channel(config.channel_capacity.max(1));
        let chunk_size = config.chunk_size.max(512);
        thread::spawn(move || loop {
            let mut buf = vec![0u8; chunk_size];
            match stdout.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    buf.truncate(n);
                    if tx.send(Ok(buf)).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        });

        Ok(Self {
            child,
            chunks: rx,
            stderr: Some(drain(stderr)),
            idle_timeout: config.idle_timeout,
            exit_timeout: config.command_timeout,
            finished: false,
            container,
        })
    }

    /// Checks how the export process ended once its output is exhausted.
    fn check_exit(&mut self) -> Result<()> {
        let status = match wait_with_deadline(&mut self.child, self.exit_timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                return Err(CommandError::TimedOut(self.exit_timeout).into_extract_error("export"))
            }
            Err(e) => return Err(CommandError::Wait(e).into_extract_error("export")),
        };
        if status.success() {
            return Ok(());
        }

        let stderr = self
            .stderr
            .take()
            .map(|h| h.join().unwrap_or_default())
            .unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr).to_string();
        Err(match classify_stderr("export", &stderr) {
            // The container exists, so a "not found" here is a broken stream.
            ExtractError::ImageNotFound(msg) => ExtractError::Transport(msg),
            other => other,
        })
    }
}

impl Iterator for ExportStream {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.chunks.recv_timeout(self.idle_timeout) {
            Ok(Ok(chunk)) => Some(Ok(chunk)),
            Ok(Err(e)) => {
                self.finished = true;
                Some(Err(ExtractError::Transport(format!(
                    "reading export stream: {e}"
                ))))
            }
            Err(RecvTimeoutError::Timeout) => {
                self.finished = true;
                Some(Err(ExtractError::Transport(format!(
                    "export stream produced no data for {:?}",
                    self.idle_timeout
                ))))
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                self.check_exit().err().map(Err)
            }
        }
    }
}

impl Drop for ExportStream {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!("Stopping unfinished export of {}", self.container.id);
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Drives a docker-compatible CLI.
pub struct DockerRuntime {
    config: RuntimeConfig,
}

impl DockerRuntime {
    pub fn new() -> Result<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates the runtime after checking the CLI can be executed at all.
    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        run_with_timeout(
            &config.binary,
            &config.base_args,
            &["--version"],
            config.command_timeout,
        )
        .map_err(|e| match e {
            CommandError::Spawn(e) => ExtractError::RuntimeUnavailable(format!(
                "failed to execute {}: {e}. Is it installed?",
                config.binary
            )),
            other => other.into_extract_error("version check"),
        })?;

        Ok(Self { config })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn run_command(&self, args: &[&str], timeout: Duration) -> Result<String> {
        run_with_timeout(&self.config.binary, &self.config.base_args, args, timeout)
            .map_err(|e| e.into_extract_error(&format!("{} {}", self.config.binary, args[0])))
    }

    fn inspect(&self, image: &str) -> Result<ImageInspect> {
        let output = self.run_command(&["image", "inspect", image], self.config.command_timeout)?;
        ImageInspect::from_inspect_output(&output)
    }

    fn pull(&self, image: &str) -> Result<()> {
        // Only registry answers naming the image as unknown count as not
        // found; network and quota failures stay transport errors.
        self.run_command(&["pull", image], self.config.pull_timeout)
            .map(|_| ())
    }

    fn create_container(&self, image: &str) -> Result<EphemeralContainer> {
        // The placeholder command lets images without CMD be created; the
        // container is never started.
        let output = self.run_command(&["create", image, "true"], self.config.command_timeout)?;
        let id = output.trim().lines().last().unwrap_or("").trim().to_string();
        if id.is_empty() {
            return Err(ExtractError::InvalidResponse(
                "create did not print a container id".to_string(),
            ));
        }
        debug!("Created ephemeral container {} for {}", id, image);

        Ok(EphemeralContainer {
            binary: self.config.binary.clone(),
            base_args: self.config.base_args.clone(),
            id,
            timeout: self.config.command_timeout,
        })
    }
}

impl ImageRuntime for DockerRuntime {
    type Export = ExportStream;

    fn name(&self) -> &str {
        &self.config.binary
    }

    fn ensure_image_present(&self, image: &str) -> Result<ImageInspect> {
        match self.inspect(image) {
            Ok(inspect) => return Ok(inspect),
            Err(ExtractError::ImageNotFound(_)) => {
                info!("Image {} not found locally, pulling...", image);
            }
            Err(e) => return Err(e),
        }

        self.pull(image)?;
        self.inspect(image)
    }

    fn layer_history(&self, image: &str) -> Result<Vec<LayerRecord>> {
        let output = self.run_command(
            &[
                "history",
                "--no-trunc",
                "--human=false",
                "--format",
                "{{json .}}",
                image,
            ],
            self.config.command_timeout,
        )?;
        parse_history_output(&output)
    }

    fn export_filesystem(&self, image: &str) -> Result<ExportStream> {
        let container = self.create_container(image)?;
        // On failure `container` drops here and is removed.
        ExportStream::spawn(container, &self.config)
    }
}
