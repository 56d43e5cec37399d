/*!
 * Error Codes
 * The fixed POSIX-like code space surfaced across the guest boundary
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Guest-visible error code
///
/// Numbering follows WASI preview 1 so a guest built against that ABI
/// interprets the values without translation. Only the codes the sandbox
/// can produce are represented; the set is closed.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Errno {
    Success = 0,
    #[serde(rename = "EACCES")]
    Acces = 2,
    #[serde(rename = "EBADF")]
    Badf = 8,
    #[serde(rename = "ECONNREFUSED")]
    Connrefused = 14,
    #[serde(rename = "EEXIST")]
    Exist = 20,
    #[serde(rename = "EHOSTUNREACH")]
    Hostunreach = 23,
    #[serde(rename = "EINVAL")]
    Inval = 28,
    #[serde(rename = "EISDIR")]
    Isdir = 31,
    #[serde(rename = "ENOENT")]
    Noent = 44,
    #[serde(rename = "ENOTCONN")]
    Notconn = 53,
    #[serde(rename = "ENOTDIR")]
    Notdir = 54,
    #[serde(rename = "ENOTEMPTY")]
    Notempty = 55,
}

impl Errno {
    /// Raw numeric value written back to the guest
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self as u16
    }

    /// Symbolic name, e.g. `ENOENT`
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Errno::Success => "SUCCESS",
            Errno::Acces => "EACCES",
            Errno::Badf => "EBADF",
            Errno::Connrefused => "ECONNREFUSED",
            Errno::Exist => "EEXIST",
            Errno::Hostunreach => "EHOSTUNREACH",
            Errno::Inval => "EINVAL",
            Errno::Isdir => "EISDIR",
            Errno::Noent => "ENOENT",
            Errno::Notconn => "ENOTCONN",
            Errno::Notdir => "ENOTDIR",
            Errno::Notempty => "ENOTEMPTY",
        }
    }

    /// Human-readable description in the usual libc wording
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Errno::Success => "success",
            Errno::Acces => "permission denied",
            Errno::Badf => "bad file descriptor",
            Errno::Connrefused => "connection refused",
            Errno::Exist => "file already exists",
            Errno::Hostunreach => "host is unreachable",
            Errno::Inval => "invalid argument",
            Errno::Isdir => "illegal operation on a directory",
            Errno::Noent => "no such file or directory",
            Errno::Notconn => "socket is not connected",
            Errno::Notdir => "not a directory",
            Errno::Notempty => "directory not empty",
        }
    }

    /// Decode a raw value produced by [`Errno::raw`]
    #[must_use]
    pub fn from_raw(raw: u16) -> Option<Self> {
        let errno = match raw {
            0 => Errno::Success,
            2 => Errno::Acces,
            8 => Errno::Badf,
            14 => Errno::Connrefused,
            20 => Errno::Exist,
            23 => Errno::Hostunreach,
            28 => Errno::Inval,
            31 => Errno::Isdir,
            44 => Errno::Noent,
            53 => Errno::Notconn,
            54 => Errno::Notdir,
            55 => Errno::Notempty,
            _ => return None,
        };
        Some(errno)
    }

    #[inline]
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Errno::Success)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Errno> for u16 {
    fn from(errno: Errno) -> Self {
        errno.raw()
    }
}
