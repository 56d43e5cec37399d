/*!
 * Inode Types
 * Internal representation of files, directories and symlinks
 */

use std::collections::BTreeMap;

use super::super::types::{FileType, Metadata};
use crate::core::limits::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, DEFAULT_SYMLINK_MODE};
use crate::core::types::{Ino, TimestampMs};

#[derive(Debug, Clone)]
pub(in crate::vfs) enum InodeKind {
    File { data: Vec<u8> },
    Directory { children: BTreeMap<String, Ino> },
    Symlink { target: String },
}

/// One inode. `meta.size` is kept in step with the payload by every mutator.
#[derive(Debug, Clone)]
pub(in crate::vfs) struct Inode {
    pub kind: InodeKind,
    pub meta: Metadata,
}

impl Inode {
    pub fn file(ino: Ino, data: Vec<u8>, now: TimestampMs) -> Self {
        let size = data.len() as u64;
        Self {
            kind: InodeKind::File { data },
            meta: Self::fresh_meta(ino, FileType::File, size, DEFAULT_FILE_MODE, now),
        }
    }

    pub fn directory(ino: Ino, now: TimestampMs) -> Self {
        Self {
            kind: InodeKind::Directory {
                children: BTreeMap::new(),
            },
            meta: Self::fresh_meta(ino, FileType::Directory, 0, DEFAULT_DIR_MODE, now),
        }
    }

    pub fn symlink(ino: Ino, target: String, now: TimestampMs) -> Self {
        let size = target.len() as u64;
        Self {
            kind: InodeKind::Symlink { target },
            meta: Self::fresh_meta(ino, FileType::Symlink, size, DEFAULT_SYMLINK_MODE, now),
        }
    }

    fn fresh_meta(ino: Ino, file_type: FileType, size: u64, mode: u32, now: TimestampMs) -> Metadata {
        Metadata {
            ino,
            file_type,
            size,
            atime_ms: now,
            mtime_ms: now,
            ctime_ms: now,
            mode,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, InodeKind::Directory { .. })
    }

    pub fn file_type(&self) -> FileType {
        self.meta.file_type
    }

    pub fn children(&self) -> Option<&BTreeMap<String, Ino>> {
        match &self.kind {
            InodeKind::Directory { children } => Some(children),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut BTreeMap<String, Ino>> {
        match &mut self.kind {
            InodeKind::Directory { children } => Some(children),
            _ => None,
        }
    }

    /// Record a content change: size follows the payload, mtime and ctime move
    pub fn touch(&mut self, now: TimestampMs) {
        self.meta.size = match &self.kind {
            InodeKind::File { data } => data.len() as u64,
            InodeKind::Directory { children } => children.len() as u64,
            InodeKind::Symlink { target } => target.len() as u64,
        };
        self.meta.mtime_ms = now;
        self.meta.ctime_ms = now;
    }
}
