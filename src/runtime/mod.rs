//! Access to the container runtime that owns the images.

pub mod docker;

use crate::error::Result;
use crate::metadata::{ImageInspect, LayerRecord};
use std::time::Duration;

pub use docker::DockerRuntime;

/// Image operations the extraction pipelines depend on.
///
/// Implementations classify their failures into the crate's error taxonomy:
/// an image that cannot be resolved is [`crate::ExtractError::ImageNotFound`],
/// an unreachable runtime is [`crate::ExtractError::RuntimeUnavailable`].
pub trait ImageRuntime {
    /// Binary chunks of a flattened filesystem export, in order.
    ///
    /// Dropping the iterator must release anything created to produce it.
    type Export: Iterator<Item = Result<Vec<u8>>> + 'static;

    /// Returns the name of the runtime for logging.
    fn name(&self) -> &str;

    /// Makes sure the image is available locally, pulling it if needed, and
    /// returns its inspect data.
    fn ensure_image_present(&self, image: &str) -> Result<ImageInspect>;

    /// Layer history, newest first.
    fn layer_history(&self, image: &str) -> Result<Vec<LayerRecord>>;

    /// Starts streaming the image's flattened root filesystem as a tar archive.
    fn export_filesystem(&self, image: &str) -> Result<Self::Export>;
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// CLI binary; any docker-compatible CLI works.
    pub binary: String,
    /// Arguments placed before every subcommand, e.g. `["docker"]` when the
    /// binary is `sudo`.
    pub base_args: Vec<String>,
    pub command_timeout: Duration,
    pub pull_timeout: Duration,
    /// Longest wait for the next export chunk.
    pub idle_timeout: Duration,
    pub chunk_size: usize,
    /// Chunks buffered between the pipe reader thread and the decoder.
    pub channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            base_args: Vec::new(),
            command_timeout: Duration::from_secs(120),
            pull_timeout: Duration::from_secs(600),
            idle_timeout: Duration::from_secs(60),
            chunk_size: 64 * 1024,
            channel_capacity: 8,
        }
    }
}

impl RuntimeConfig {
    /// Splits a command line such as `"sudo docker"` into binary and leading
    /// arguments. Blank input keeps the default binary.
    pub fn with_command_line(mut self, command_line: &str) -> Self {
        let mut words = command_line.split_whitespace().map(str::to_string);
        if let Some(binary) = words.next() {
            self.binary = binary;
            self.base_args = words.collect();
        }
        self
    }
}
