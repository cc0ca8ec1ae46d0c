//! Core identifier and position types shared across the crate.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Stable identifier for a discovered source file.
///
/// Backed by `NonZeroU32` so `Option<FileId>` is the same size as `FileId`
/// and `0` can never be mistaken for a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(NonZeroU32);

impl FileId {
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    pub fn value(self) -> u32 {
        self.0.get()
    }
}

/// Monotonic allocator for `FileId`s, shared across discovery workers.
#[derive(Debug, Default)]
pub struct FileIdAllocator {
    next: AtomicU32,
}

impl FileIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Allocate the next `FileId`. Returns `None` if the counter is exhausted
    /// (u32::MAX files in one run — effectively unreachable in practice).
    pub fn allocate(&self) -> Option<FileId> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        FileId::new(id)
    }
}

/// A half-open byte/line/column span within a single file.
///
/// Lines and columns are 0-based, matching tree-sitter's `Point` convention;
/// output drivers add 1 when rendering for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Range {
    pub fn from_node(node: &tree_sitter::Node) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: start.row as u32,
            start_column: start.column as u32,
            end_line: end.row as u32,
            end_column: end.column as u32,
        }
    }
}

/// A file's on-disk path plus the stable id assigned to it for this run.
#[derive(Debug, Clone)]
pub struct FileHandle {
    pub id: FileId,
    pub path: PathBuf,
}

impl FileHandle {
    pub fn new(id: FileId, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}
