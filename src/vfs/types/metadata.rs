/*!
 * VFS Metadata
 * Inode metadata: size, timestamps and mode bits
 */

use super::file_type::FileType;
use crate::core::types::{Ino, TimestampMs};
use serde::{Deserialize, Serialize};

/// Inode metadata
///
/// Field names serialize in the camelCase form callers of the container
/// facade expect (`atimeMs`, `mtimeMs`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub ino: Ino,
    pub file_type: FileType,
    pub size: u64,
    pub atime_ms: TimestampMs,
    pub mtime_ms: TimestampMs,
    pub ctime_ms: TimestampMs,
    pub mode: u32,
}

impl Metadata {
    #[inline(always)]
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }

    #[inline(always)]
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self.file_type, FileType::File)
    }

    #[inline(always)]
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        matches!(self.file_type, FileType::Symlink)
    }
}
