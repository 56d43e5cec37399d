/*!
 * Bridge Types
 * Errors, request kinds and the lock-word states of the mailbox
 */

use crate::core::errors::Errno;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Bridge operation result
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Lock word: no request outstanding
pub const LOCK_IDLE: i32 = 0;

/// Lock word: a request is waiting for the controller
pub const LOCK_PENDING: i32 = 1;

/// Request families carried over the mailbox
///
/// The raw value is what lands in the request-type word.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Liveness probe; the controller echoes the payload
    Ping = 0,
    /// JSON-encoded socket call
    Socket = 1,
}

impl RequestKind {
    #[inline]
    #[must_use]
    pub const fn raw(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Ping),
            1 => Some(Self::Socket),
            _ => None,
        }
    }
}

/// Bridge errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("payload of {size} bytes exceeds mailbox capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },

    #[error("another synchronous call is already in flight on this bridge")]
    Busy,

    #[error("bridge closed")]
    Closed,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("handler failed: {0}")]
    Handler(String),
}

impl BridgeError {
    /// Code a guest sees when its call cannot be completed
    #[must_use]
    pub const fn errno(&self) -> Errno {
        match self {
            Self::PayloadTooLarge { .. } | Self::Busy => Errno::Inval,
            Self::Closed | Self::Timeout(_) | Self::Handler(_) => Errno::Notconn,
        }
    }
}
