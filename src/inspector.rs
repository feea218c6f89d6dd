//! Request-scoped entry points for metadata and file tree extraction.
//!
//! [`Inspector`] pairs a concrete [`ImageRuntime`] with a [`Notifier`]:
//! - [`Inspector::extract_metadata`]: image attributes and layer history.
//! - [`Inspector::extract_file_tree`]: depth-limited listing of the image's
//!   flattened filesystem, streamed from an export and never written to disk.
//!
//! Nothing is cached between calls. Tree extraction is all or nothing: any
//! transport or decode failure aborts it, and whatever the runtime created to
//! produce the export is released before the error is returned.

use crate::entries::decode_entries;
use crate::error::Result;
use crate::file_tree::{count_nodes, FileNode};
use crate::metadata::ImageMetadata;
use crate::notifier::Notifier;
use crate::runtime::ImageRuntime;
use crate::stream::{open_archive_stream, ChunkReader};
use crate::tree_builder::TreeBuilder;
use std::io::Read;
use std::time::Instant;
use tar_rs as tar;

pub use crate::tree_builder::DEFAULT_MAX_DEPTH;

pub struct Inspector<R: ImageRuntime> {
    runtime: R,
    notifier: Notifier,
}

impl<R: ImageRuntime> Inspector<R> {
    pub fn new(runtime: R, notifier: Notifier) -> Self {
        Self { runtime, notifier }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Reads image attributes and layer history, pulling the image if it is
    /// not present locally.
    pub fn extract_metadata(&self, image: &str) -> Result<ImageMetadata> {
        self.notifier
            .info(&format!("Inspecting {} via {}", image, self.runtime.name()));
        let inspect = self.runtime.ensure_image_present(image)?;

        self.notifier.debug("Reading layer history");
        let history = self.runtime.layer_history(image)?;
        self.notifier
            .debug(&format!("Found {} history entries", history.len()));

        self.notifier.finish();
        Ok(ImageMetadata::from_inspect(inspect, history))
    }

    /// Lists the image's filesystem down to `max_depth` path segments.
    pub fn extract_file_tree(&self, image: &str, max_depth: usize) -> Result<Vec<FileNode>> {
        let started = Instant::now();
        self.notifier
            .info(&format!("Resolving {} via {}", image, self.runtime.name()));
        self.runtime.ensure_image_present(image)?;

        self.notifier
            .info(&format!("Exporting filesystem of {}", image));
        let export = self.runtime.export_filesystem(image)?;

        let result = build_tree(ChunkReader::new(export), max_depth, |seen| {
            self.notifier.entries(seen)
        });
        self.notifier.finish();

        let tree = result?;
        self.notifier.info(&format!(
            "Listed {} nodes of {} in {:.1?}",
            count_nodes(&tree),
            image,
            started.elapsed()
        ));
        Ok(tree)
    }
}

/// Builds a file tree from an already exported archive (plain or gzip tar).
pub fn file_tree_from_reader<Rd: Read + 'static>(
    reader: Rd,
    max_depth: usize,
) -> Result<Vec<FileNode>> {
    build_tree(reader, max_depth, |_| {})
}

fn build_tree<Rd, F>(reader: Rd, max_depth: usize, mut on_entry: F) -> Result<Vec<FileNode>>
where
    Rd: Read + 'static,
    F: FnMut(u64),
{
    let stream = open_archive_stream(reader)?;
    let mut archive = tar::Archive::new(stream);
    let mut builder = TreeBuilder::new(max_depth);

    for entry in decode_entries(&mut archive)? {
        builder.insert(&entry?);
        on_entry(builder.stats().seen);
    }

    Ok(builder.finish())
}
