/*!
 * Context Messages
 *
 * The closed set of messages exchanged between the controller and an
 * execution context, grouped into three families. Every message carries a
 * `family` tag and every body a `type` tag; anything that fails to decode
 * is logged and dropped by the receiving port.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::serde::base64_bytes;
use crate::core::types::{ServePort, TaskId};
use crate::vfs::{FsEvent, VfsError, VfsSnapshot};

/// Controller → execution context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", content = "body", rename_all = "snake_case")]
pub enum ToContext {
    Process(ProcessCommand),
    Fs(FsRequest),
    Serve(ServeCommand),
}

/// Execution context → controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", content = "body", rename_all = "snake_case")]
pub enum FromContext {
    Process(ProcessEvent),
    Fs(FsReply),
    FsEvent(FsEvent),
    Serve(ServeEvent),
}

// =============================================================================
// PROCESS FAMILY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessCommand {
    /// Seed the context's filesystem and report `Ready`
    Init {
        snapshot: VfsSnapshot,
        cwd: String,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// Run a command to completion
    Exec {
        id: TaskId,
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Run a command with live stdio
    Spawn {
        id: TaskId,
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Stdin {
        id: TaskId,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    CloseStdin {
        id: TaskId,
    },
    Kill {
        id: TaskId,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessEvent {
    Ready,
    Stdout {
        id: TaskId,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    Stderr {
        id: TaskId,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    Exit {
        id: TaskId,
        code: i32,
    },
    /// A fault; without an id it concerns the context itself (boot)
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<TaskId>,
        message: String,
    },
}

// =============================================================================
// FILESYSTEM FAMILY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FsRequest {
    Write {
        id: TaskId,
        path: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    Mkdir {
        id: TaskId,
        path: String,
        #[serde(default)]
        recursive: bool,
    },
    Unlink {
        id: TaskId,
        path: String,
    },
    Rename {
        id: TaskId,
        from: String,
        to: String,
    },
    Snapshot {
        id: TaskId,
    },
    Restore {
        id: TaskId,
        snapshot: VfsSnapshot,
    },
}

impl FsRequest {
    #[must_use]
    pub const fn id(&self) -> TaskId {
        match self {
            Self::Write { id, .. }
            | Self::Mkdir { id, .. }
            | Self::Unlink { id, .. }
            | Self::Rename { id, .. }
            | Self::Snapshot { id }
            | Self::Restore { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FsReply {
    Done { id: TaskId },
    Failed { id: TaskId, error: VfsError },
    Snapshot { id: TaskId, snapshot: VfsSnapshot },
}

impl FsReply {
    #[must_use]
    pub const fn id(&self) -> TaskId {
        match self {
            Self::Done { id } | Self::Failed { id, .. } | Self::Snapshot { id, .. } => *id,
        }
    }
}

// =============================================================================
// SERVE FAMILY
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServeCommand {
    Request {
        id: TaskId,
        port: ServePort,
        method: String,
        path: String,
        #[serde(default)]
        headers: Vec<(String, String)>,
        #[serde(default, with = "base64_bytes")]
        body: Vec<u8>,
    },
}

/// Serve traffic from the context
///
/// For one request id: exactly one `ResponseHead` (unless the first frame
/// is an `Error`), any number of `Chunk`s, then exactly one `End` or
/// `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServeEvent {
    Listen {
        port: ServePort,
    },
    Unlisten {
        port: ServePort,
    },
    ResponseHead {
        id: TaskId,
        status: u16,
        #[serde(default)]
        headers: Vec<(String, String)>,
    },
    Chunk {
        id: TaskId,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    End {
        id: TaskId,
    },
    Error {
        id: TaskId,
        message: String,
    },
}

/// Port-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("peer disconnected")]
    Disconnected,

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("timed out waiting for a message")]
    Timeout,

    #[error("message out of order: {0}")]
    OutOfOrder(String),
}
