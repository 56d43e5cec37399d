/*!
 * Command Execution
 */

use std::sync::Arc;
use tracing::{debug, info};

use super::{ProcessStreams, Sandbox};
use crate::ipc::{ProcessCommand, ToContext};
use crate::process::handle::ProcessHandle;
use crate::process::types::{ExecOutput, SandboxResult};

impl Sandbox {
    /// Run a command to completion and return its exit code
    pub async fn exec(&self, command: &str, args: &[&str]) -> SandboxResult<i32> {
        self.exec_output(command, args).await.map(|output| output.code)
    }

    /// Run a command to completion, capturing its output
    ///
    /// The command gets an empty stdin.
    pub async fn exec_output(&self, command: &str, args: &[&str]) -> SandboxResult<ExecOutput> {
        let mut handle = self.start(command, args, false)?;
        handle.close_stdin()?;
        let code = handle.exited().await?;
        Ok(ExecOutput {
            code,
            stdout: handle.drain_stdout(),
            stderr: handle.drain_stderr(),
        })
    }

    /// Start a command with live stdio
    pub fn spawn(&self, command: &str, args: &[&str]) -> SandboxResult<ProcessHandle> {
        self.start(command, args, true)
    }

    fn start(&self, command: &str, args: &[&str], live: bool) -> SandboxResult<ProcessHandle> {
        let shared = &self.shared;
        shared.ensure_ready()?;

        let (id, exit) = shared.exits.register();
        let (stdout_tx, stdout_rx) = flume::unbounded();
        let (stderr_tx, stderr_rx) = flume::unbounded();
        shared.streams.insert(
            id,
            ProcessStreams {
                stdout: stdout_tx,
                stderr: stderr_tx,
            },
        );
        shared.begin_process();

        let command = command.to_string();
        let args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
        info!(id, command = %command, ?args, live, "starting process");
        let message = if live {
            ProcessCommand::Spawn { id, command, args }
        } else {
            ProcessCommand::Exec { id, command, args }
        };

        if let Err(err) = shared.send(ToContext::Process(message)) {
            debug!(id, "process start failed, context unreachable");
            shared.exits.cancel(id);
            shared.retire_process(id);
            return Err(err);
        }

        Ok(ProcessHandle::new(
            id,
            stdout_rx,
            stderr_rx,
            exit,
            Arc::clone(shared),
        ))
    }
}
