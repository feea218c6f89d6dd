//! Ordered, immutable file tree handed back to callers.

use crate::entries::EntryKind;
use crate::tree_builder::TreeNode;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNode {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Always `Some` for directories (possibly empty), always `None` for files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

impl FileNode {
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn children(&self) -> &[FileNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Looks up a direct child by name.
    pub fn child(&self, name: &str) -> Option<&FileNode> {
        self.children().iter().find(|c| c.name == name)
    }

    /// Freezes `node`'s children into an ordered list, consuming the trie.
    pub fn children_of(node: TreeNode) -> Vec<FileNode> {
        freeze(node.children)
    }
}

impl From<TreeNode> for FileNode {
    fn from(node: TreeNode) -> Self {
        let TreeNode {
            name,
            kind,
            size,
            children,
        } = node;
        let children = match kind {
            EntryKind::Directory => Some(freeze(children)),
            EntryKind::File => None,
        };
        FileNode {
            name,
            kind,
            size,
            children,
        }
    }
}

fn freeze(children: HashMap<String, TreeNode>) -> Vec<FileNode> {
    let mut nodes: Vec<FileNode> = children.into_values().map(FileNode::from).collect();
    nodes.sort_by(directories_first);
    nodes
}

/// Directories before files, then byte-wise by name.
fn directories_first(a: &FileNode, b: &FileNode) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| a.name.cmp(&b.name))
}

/// Counts every node in a forest, at any depth.
pub fn count_nodes(nodes: &[FileNode]) -> usize {
    nodes
        .iter()
        .map(|n| 1 + count_nodes(n.children()))
        .sum()
}
