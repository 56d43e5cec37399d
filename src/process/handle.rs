/*!
 * Process Handle
 * Live view of a spawned process: output streams, stdin, kill and exit
 */

use std::sync::Arc;

use super::sandbox::Shared;
use super::types::{SandboxError, SandboxResult};
use crate::core::types::TaskId;
use crate::ipc::{ProcessCommand, TaskReceiver, ToContext};

/// A process started with `spawn`
///
/// Output arrives on the stdout/stderr receivers in the order the guest
/// wrote it; both disconnect once the process exits. If the sandbox is
/// disposed first, [`ProcessHandle::exited`] yields
/// [`SandboxError::Disposed`], never an exit code.
pub struct ProcessHandle {
    id: TaskId,
    stdout: flume::Receiver<Vec<u8>>,
    stderr: flume::Receiver<Vec<u8>>,
    exit: Option<TaskReceiver<SandboxResult<i32>>>,
    outcome: Option<SandboxResult<i32>>,
    shared: Arc<Shared>,
}

impl ProcessHandle {
    pub(crate) fn new(
        id: TaskId,
        stdout: flume::Receiver<Vec<u8>>,
        stderr: flume::Receiver<Vec<u8>>,
        exit: TaskReceiver<SandboxResult<i32>>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            id,
            stdout,
            stderr,
            exit: Some(exit),
            outcome: None,
            shared,
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn stdout(&self) -> &flume::Receiver<Vec<u8>> {
        &self.stdout
    }

    pub fn stderr(&self) -> &flume::Receiver<Vec<u8>> {
        &self.stderr
    }

    pub fn write_stdin(&self, data: impl Into<Vec<u8>>) -> SandboxResult<()> {
        self.shared.send(ToContext::Process(ProcessCommand::Stdin {
            id: self.id,
            data: data.into(),
        }))
    }

    /// Signal end of input
    pub fn close_stdin(&self) -> SandboxResult<()> {
        self.shared
            .send(ToContext::Process(ProcessCommand::CloseStdin { id: self.id }))
    }

    /// Ask the context to stop the process; it exits with code 137
    pub fn kill(&self) -> SandboxResult<()> {
        self.shared
            .send(ToContext::Process(ProcessCommand::Kill { id: self.id }))
    }

    /// Wait for the exit code; later calls return the same result
    ///
    /// Cancel-safe: dropping the future mid-wait leaves the receiver in
    /// place for the next call.
    pub async fn exited(&mut self) -> SandboxResult<i32> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match self.exit.as_mut() {
            Some(rx) => rx
                .await
                .map_err(|_| SandboxError::Disposed)
                .and_then(|result| result),
            None => Err(SandboxError::Disposed),
        };
        self.exit = None;
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Everything written to stdout so far, without waiting
    pub fn drain_stdout(&self) -> Vec<u8> {
        self.stdout.try_iter().flatten().collect()
    }

    pub fn drain_stderr(&self) -> Vec<u8> {
        self.stderr.try_iter().flatten().collect()
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("outcome", &self.outcome)
            .finish()
    }
}
