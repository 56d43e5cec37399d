/*!
 * Syscall Types
 * Import results and the control signals that unwind a guest
 */

use std::sync::Arc;
use thiserror::Error;

use crate::core::errors::Errno;

/// Outcome of one import: a code for the guest, or a trap that stops it
pub type SyscallResult = Result<Errno, Trap>;

/// Receives bytes a guest writes to stdout or stderr
pub type OutputSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Why a guest stopped running
///
/// `Exit` is ordinary control flow raised by `proc_exit`, not a failure.
/// Only `Fault` means something went wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    #[error("guest exited with code {0}")]
    Exit(i32),

    #[error("guest was killed")]
    Killed,

    #[error("guest fault: {0}")]
    Fault(String),
}

impl Trap {
    #[inline]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }

    /// Exit code for a normal or forced stop; `None` for faults
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Trap::Exit(code) => Some(*code),
            Trap::Killed => Some(crate::core::limits::KILLED_EXIT_CODE),
            Trap::Fault(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Trap::Fault(_))
    }
}

/// Sink that discards everything
pub fn null_sink() -> OutputSink {
    Arc::new(|_: &[u8]| {})
}
