/*!
 * VFS Error Types
 * Structured, code-carrying errors for filesystem operations
 */

use crate::core::errors::Errno;
use crate::core::types::Fd;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// VFS operation result
///
/// # Must Use
/// VFS operations can fail and must be handled to prevent data loss
#[must_use = "VFS operations can fail and must be handled"]
pub type VfsResult<T> = Result<T, VfsError>;

/// VFS errors
///
/// Every variant records the failing operation and path, and its display
/// form leads with the POSIX code (`ENOENT: no such file or directory,
/// mkdir '/a/b'`) so callers matching on the code substring keep working.
/// Serialization uses the tagged enum pattern so errors cross context
/// ports intact.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum VfsError {
    #[error("ENOENT: no such file or directory, {op} '{path}'")]
    NotFound { op: String, path: String },

    #[error("EEXIST: file already exists, {op} '{path}'")]
    AlreadyExists { op: String, path: String },

    #[error("ENOTDIR: not a directory, {op} '{path}'")]
    NotADirectory { op: String, path: String },

    #[error("EISDIR: illegal operation on a directory, {op} '{path}'")]
    IsADirectory { op: String, path: String },

    #[error("ENOTEMPTY: directory not empty, {op} '{path}'")]
    NotEmpty { op: String, path: String },

    #[error("EBADF: bad file descriptor, {op} {fd}")]
    BadDescriptor { op: String, fd: Fd },

    #[error("EINVAL: {reason}, {op} '{path}'")]
    InvalidArgument {
        op: String,
        path: String,
        reason: String,
    },
}

impl VfsError {
    pub fn not_found(op: &str, path: &str) -> Self {
        Self::NotFound {
            op: op.into(),
            path: path.into(),
        }
    }

    pub fn already_exists(op: &str, path: &str) -> Self {
        Self::AlreadyExists {
            op: op.into(),
            path: path.into(),
        }
    }

    pub fn not_a_directory(op: &str, path: &str) -> Self {
        Self::NotADirectory {
            op: op.into(),
            path: path.into(),
        }
    }

    pub fn is_a_directory(op: &str, path: &str) -> Self {
        Self::IsADirectory {
            op: op.into(),
            path: path.into(),
        }
    }

    pub fn not_empty(op: &str, path: &str) -> Self {
        Self::NotEmpty {
            op: op.into(),
            path: path.into(),
        }
    }

    pub fn bad_descriptor(op: &str, fd: Fd) -> Self {
        Self::BadDescriptor { op: op.into(), fd }
    }

    pub fn invalid(op: &str, path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            op: op.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Code this error surfaces as across the guest boundary
    #[must_use]
    pub const fn errno(&self) -> Errno {
        match self {
            Self::NotFound { .. } => Errno::Noent,
            Self::AlreadyExists { .. } => Errno::Exist,
            Self::NotADirectory { .. } => Errno::Notdir,
            Self::IsADirectory { .. } => Errno::Isdir,
            Self::NotEmpty { .. } => Errno::Notempty,
            Self::BadDescriptor { .. } => Errno::Badf,
            Self::InvalidArgument { .. } => Errno::Inval,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<VfsError> for Errno {
    fn from(err: VfsError) -> Self {
        err.errno()
    }
}
