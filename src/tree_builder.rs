//! Incremental trie construction from decoded archive entries.
//!
//! [`TreeBuilder`] folds [`EntryRecord`]s into a mutable [`TreeNode`] trie
//! rooted at a synthetic, unnamed node:
//! - entries deeper than `max_depth` are dropped outright, never truncated;
//! - intermediate segments become directories, created on demand;
//! - duplicate paths are last-write-wins for `kind` and `size`;
//! - a node that ends up with children is always a directory, whatever its
//!   own member header declared.
//!
//! Directory sizes are whatever their own member declared, children are not
//! summed into parents. Call [`TreeBuilder::finish`] to freeze the trie into
//! ordered [`FileNode`]s.

use crate::entries::{EntryKind, EntryRecord};
use crate::error::Result;
use crate::file_tree::FileNode;
use std::collections::HashMap;

pub const DEFAULT_MAX_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub children: HashMap<String, TreeNode>,
}

impl TreeNode {
    fn directory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: EntryKind::Directory,
            size: 0,
            children: HashMap::new(),
        }
    }

    fn root() -> Self {
        Self::directory("")
    }
}

/// Counters reported once a build completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub seen: u64,
    pub inserted: u64,
    pub too_deep: u64,
    pub reclassified: u64,
}

pub struct TreeBuilder {
    root: TreeNode,
    max_depth: usize,
    stats: BuildStats,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl TreeBuilder {
    pub fn new(max_depth: usize) -> Self {
        Self {
            root: TreeNode::root(),
            max_depth,
            stats: BuildStats::default(),
        }
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Folds one entry into the trie.
    pub fn insert(&mut self, entry: &EntryRecord) {
        self.stats.seen += 1;

        let Some((last, parents)) = entry.path.split_last() else {
            return;
        };
        if entry.depth() > self.max_depth {
            self.stats.too_deep += 1;
            return;
        }

        let mut node = &mut self.root;
        for segment in parents {
            let child = node
                .children
                .entry(segment.clone())
                .or_insert_with(|| TreeNode::directory(segment));
            if child.kind != EntryKind::Directory {
                log::debug!("Reclassifying {} as a directory", segment);
                child.kind = EntryKind::Directory;
                self.stats.reclassified += 1;
            }
            node = child;
        }

        match node.children.get_mut(last) {
            Some(existing) => {
                existing.size = entry.size;
                existing.kind = if existing.children.is_empty() {
                    entry.kind
                } else {
                    EntryKind::Directory
                };
            }
            None => {
                node.children.insert(
                    last.clone(),
                    TreeNode {
                        name: last.clone(),
                        kind: entry.kind,
                        size: entry.size,
                        children: HashMap::new(),
                    },
                );
            }
        }
        self.stats.inserted += 1;
    }

    /// Drains a fallible entry sequence, stopping at the first error.
    pub fn extend<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<EntryRecord>>,
    {
        for entry in entries {
            self.insert(&entry?);
        }
        Ok(())
    }

    /// Freezes the trie into the ordered top-level node list.
    pub fn finish(self) -> Vec<FileNode> {
        log::debug!(
            "Built file tree: {} entries seen, {} inserted, {} beyond depth {}, {} reclassified",
            self.stats.seen,
            self.stats.inserted,
            self.stats.too_deep,
            self.max_depth,
            self.stats.reclassified
        );
        FileNode::children_of(self.root)
    }
}
