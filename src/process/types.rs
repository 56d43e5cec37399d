/*!
 * Sandbox Types
 * Lifecycle states, errors and exec results
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::core::errors::Errno;
use crate::ipc::ProtocolError;
use crate::vfs::VfsError;

/// Sandbox result type
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Sandbox lifecycle
///
/// `Booting → Ready ⇄ Executing`, and any state → `Disposed`, which is
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Booting,
    Ready,
    Executing,
    Disposed,
}

impl SandboxState {
    #[inline]
    #[must_use]
    pub const fn accepts_work(&self) -> bool {
        matches!(self, Self::Ready | Self::Executing)
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Booting => write!(f, "booting"),
            Self::Ready => write!(f, "ready"),
            Self::Executing => write!(f, "executing"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// Sandbox errors with miette diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SandboxError {
    #[error("sandbox has been disposed")]
    #[diagnostic(
        code(sandbox::disposed),
        help("The sandbox was torn down. Boot a new instance to keep working.")
    )]
    Disposed,

    #[error("sandbox is {0}, not ready")]
    #[diagnostic(
        code(sandbox::not_ready),
        help("Wait for boot to finish before running commands or touching files.")
    )]
    NotReady(SandboxState),

    #[error("execution context did not report ready within {0:?}")]
    #[diagnostic(
        code(sandbox::boot_timeout),
        help("Raise boot_timeout (or SANDBOX_BOOT_TIMEOUT_MS) or shrink the seed snapshot.")
    )]
    BootTimeout(Duration),

    #[error("execution context failed to boot: {0}")]
    #[diagnostic(code(sandbox::boot_failed))]
    BootFailed(String),

    #[error("{0}")]
    #[diagnostic(code(sandbox::fs))]
    Fs(#[from] VfsError),

    #[error("guest fault: {0}")]
    #[diagnostic(
        code(sandbox::guest_fault),
        help("The guest trapped for a reason other than proc_exit. Check its stderr.")
    )]
    GuestFault(String),

    #[error("protocol error: {0}")]
    #[diagnostic(code(sandbox::protocol))]
    Protocol(#[from] ProtocolError),

    #[error("unexpected reply from execution context: {0}")]
    #[diagnostic(code(sandbox::unexpected_reply))]
    UnexpectedReply(String),
}

impl SandboxError {
    #[must_use]
    pub fn errno(&self) -> Errno {
        match self {
            Self::Fs(err) => err.errno(),
            Self::NotReady(_) | Self::UnexpectedReply(_) => Errno::Inval,
            _ => Errno::Notconn,
        }
    }
}

/// Captured result of `exec_output`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}
