pub mod entries;
pub mod error;
pub mod file_tree;
pub mod inspector;
pub mod metadata;
pub mod notifier;
pub mod runtime;
pub mod stream;
pub mod tree_builder;

// Re-exports for easy access
pub use entries::{EntryKind, EntryRecord};
pub use error::{ExtractError, Result};
pub use file_tree::FileNode;
pub use inspector::{file_tree_from_reader, Inspector, DEFAULT_MAX_DEPTH};
pub use metadata::{ImageMetadata, LayerRecord};
pub use notifier::Notifier;
pub use runtime::{DockerRuntime, ImageRuntime, RuntimeConfig};
