//! Lazy decoding of tar members into [`EntryRecord`]s.
//!
//! The decoder walks the archive strictly forward. Member data is never read,
//! the underlying `tar` iterator skips over it when advancing to the next
//! header, so memory use does not grow with archive size.

use crate::error::{ExtractError, Result};
use serde::Serialize;
use std::io::Read;
use tar_rs as tar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

/// One archive member, reduced to what the tree needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub path: Vec<String>,
    pub kind: EntryKind,
    pub size: u64,
}

impl EntryRecord {
    pub fn new<S: AsRef<str>>(path: &[S], kind: EntryKind, size: u64) -> Self {
        Self {
            path: path.iter().map(|s| s.as_ref().to_string()).collect(),
            kind,
            size,
        }
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Splits a raw member name into path segments.
///
/// Empty and `.` segments are dropped; `..` pops the previous segment and
/// never climbs above the archive root.
pub fn split_member_path(raw: &[u8]) -> Vec<String> {
    let name = String::from_utf8_lossy(raw);
    let mut segments: Vec<String> = Vec::new();

    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other.to_string()),
        }
    }

    segments
}

/// Forward-only iterator of entry records over a tar archive.
///
/// Fused after the first error: a bad header invalidates the offsets of
/// every following member.
pub struct EntryDecoder<'a, R: 'a + Read> {
    entries: tar::Entries<'a, R>,
    done: bool,
}

/// Starts decoding `archive` from its first member.
pub fn decode_entries<R: Read>(archive: &mut tar::Archive<R>) -> Result<EntryDecoder<'_, R>> {
    let entries = archive.entries().map_err(ExtractError::from_archive_io)?;
    Ok(EntryDecoder {
        entries,
        done: false,
    })
}

impl<'a, R: 'a + Read> Iterator for EntryDecoder<'a, R> {
    type Item = Result<EntryRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let entry = match self.entries.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(ExtractError::from_archive_io(e)));
                }
                Some(Ok(entry)) => entry,
            };

            // Pre-POSIX archives mark directories only by a trailing slash.
            let raw_path = entry.path_bytes();
            let slash_terminated = raw_path.ends_with(b"/");
            let path = split_member_path(&raw_path);
            if path.is_empty() {
                log::trace!("Skipping archive root member");
                continue;
            }

            let kind = if entry.header().entry_type().is_dir() || slash_terminated {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            let size = match kind {
                EntryKind::Directory => 0,
                EntryKind::File => entry.size(),
            };

            log::trace!("Decoded {:?} {} ({} bytes)", kind, path.join("/"), size);
            return Some(Ok(EntryRecord { path, kind, size }));
        }
        None
    }
}
