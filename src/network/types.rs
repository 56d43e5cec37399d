/*!
 * Socket Types
 * Families, kinds, the descriptor state machine, events and errors
 */

use crate::core::errors::Errno;
use crate::core::types::SockFd;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Socket operation result
pub type SocketResult<T> = Result<T, SocketError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SocketFamily {
    #[default]
    Inet4,
    Inet6,
}

impl SocketFamily {
    /// Decode the guest ABI value (0 = IPv4, 1 = IPv6)
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Inet4),
            1 => Some(Self::Inet6),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SocketKind {
    #[default]
    Stream,
    Datagram,
}

impl SocketKind {
    /// Decode the guest ABI value (0 = stream, 1 = datagram)
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Stream),
            1 => Some(Self::Datagram),
            _ => None,
        }
    }
}

/// Lifecycle of a proxied socket
///
/// `Created → Connecting → Connected → Closed`, with `Error` reachable
/// before the connection is established. `Error` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketState {
    Created,
    Connecting,
    Connected,
    Closed,
    Error,
}

impl SocketState {
    #[must_use]
    pub const fn can_transition_to(self, next: SocketState) -> bool {
        use SocketState::*;
        matches!(
            (self, next),
            (Created, Connecting)
                | (Connecting, Connected)
                | (Created, Error)
                | (Connecting, Error)
                | (Connected, Closed)
                | (Created, Closed)
                | (Connecting, Closed)
        )
    }

    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, SocketState::Closed | SocketState::Error)
    }
}

/// Notification published on a proxy's event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SocketEvent {
    Connected { fd: SockFd },
    Data { fd: SockFd, len: usize },
    Error { fd: SockFd, errno: Errno, message: String },
    Closed { fd: SockFd },
}

impl SocketEvent {
    #[must_use]
    pub const fn fd(&self) -> SockFd {
        match self {
            Self::Connected { fd }
            | Self::Data { fd, .. }
            | Self::Error { fd, .. }
            | Self::Closed { fd } => *fd,
        }
    }
}

/// Socket errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum SocketError {
    #[error("EACCES: host '{host}' is blocked by the allowlist")]
    Blocked { host: String },

    #[error("EINVAL: invalid port {port}")]
    InvalidPort { port: u32 },

    #[error("EBADF: bad socket descriptor {fd}")]
    BadDescriptor { fd: SockFd },

    #[error("ENOTCONN: socket {fd} is not connected")]
    NotConnected { fd: SockFd },

    #[error("ECONNREFUSED: {0}")]
    Refused(String),

    #[error("EHOSTUNREACH: {0}")]
    Unreachable(String),

    #[error("EINVAL: {0}")]
    Malformed(String),
}

impl SocketError {
    #[must_use]
    pub const fn errno(&self) -> Errno {
        match self {
            Self::Blocked { .. } => Errno::Acces,
            Self::InvalidPort { .. } | Self::Malformed(_) => Errno::Inval,
            Self::BadDescriptor { .. } => Errno::Badf,
            Self::NotConnected { .. } => Errno::Notconn,
            Self::Refused(_) => Errno::Connrefused,
            Self::Unreachable(_) => Errno::Hostunreach,
        }
    }
}

impl From<SocketError> for Errno {
    fn from(err: SocketError) -> Self {
        err.errno()
    }
}
