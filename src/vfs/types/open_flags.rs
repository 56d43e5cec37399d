/*!
 * VFS Open Flags and Seek Origin
 */

use super::errors::VfsError;
use crate::core::serde::is_false;
use serde::{Deserialize, Serialize};

/// File open flags with compact serialization (skips false values)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct OpenFlags {
    #[serde(skip_serializing_if = "is_false")]
    pub read: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub write: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub create: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub truncate: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub append: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub exclusive: bool,
}

impl OpenFlags {
    #[inline]
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn write_only() -> Self {
        Self {
            write: true,
            ..Default::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// write + create + truncate, the `fopen("w")` combination
    #[inline]
    #[must_use]
    pub fn create() -> Self {
        Self {
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// write + create + exclusive
    #[inline]
    #[must_use]
    pub fn create_new() -> Self {
        Self {
            write: true,
            create: true,
            exclusive: true,
            ..Default::default()
        }
    }

    /// write + create + append
    #[inline]
    #[must_use]
    pub fn append_only() -> Self {
        Self {
            write: true,
            create: true,
            append: true,
            ..Default::default()
        }
    }

    /// Check if any write operation is possible
    #[inline]
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.write || self.append
    }

    /// Convert from POSIX-style flags (O_RDONLY, O_WRONLY, O_RDWR, etc.)
    ///
    /// Access mode uses the low two bits with 0 meaning read-only, as libc does.
    pub fn from_posix(flags: u32) -> Self {
        let access_mode = flags & 0x0003;
        Self {
            read: access_mode == 0x0000 || access_mode == 0x0002,
            write: access_mode == 0x0001 || access_mode == 0x0002,
            create: flags & 0x0040 != 0,
            exclusive: flags & 0x0080 != 0,
            truncate: flags & 0x0200 != 0,
            append: flags & 0x0400 != 0,
        }
    }

    /// Convert to POSIX-style flags
    pub fn to_posix(&self) -> u32 {
        let mut flags = match (self.read, self.is_writable()) {
            (true, true) => 0x0002,  // O_RDWR
            (false, true) => 0x0001, // O_WRONLY
            _ => 0x0000,             // O_RDONLY
        };

        if self.create {
            flags |= 0x0040;
        }
        if self.exclusive {
            flags |= 0x0080;
        }
        if self.truncate {
            flags |= 0x0200;
        }
        if self.append {
            flags |= 0x0400;
        }
        flags
    }

    /// Validate flag combinations
    pub fn validate(&self, path: &str) -> Result<(), VfsError> {
        if self.truncate && !self.is_writable() {
            return Err(VfsError::invalid(
                "open",
                path,
                "truncate requires write access",
            ));
        }
        Ok(())
    }
}

/// Seek origin for `fd_seek`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Whence {
    Set,
    Current,
    End,
}

impl Whence {
    /// Decode the guest ABI value (0 = set, 1 = current, 2 = end)
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Set),
            1 => Some(Self::Current),
            2 => Some(Self::End),
            _ => None,
        }
    }
}
