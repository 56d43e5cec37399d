/*!
 * Guest Host
 * Everything the import layer needs to service one guest process
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::serve::ServeRegistrar;
use super::types::{null_sink, OutputSink, SyscallResult, Trap};
use crate::bridge::BridgeClient;
use crate::core::errors::Errno;
use crate::network::ChunkQueue;
use crate::vfs::{paths, SharedFs};

/// Blocking stdin fed by the controller
///
/// Reads block until a chunk arrives. A disconnected sender is end of
/// input; a missing receiver is an empty stream.
#[derive(Debug, Default)]
pub struct StdinSource {
    rx: Option<flume::Receiver<Vec<u8>>>,
    pending: ChunkQueue,
}

impl StdinSource {
    pub fn new(rx: flume::Receiver<Vec<u8>>) -> Self {
        Self {
            rx: Some(rx),
            pending: ChunkQueue::new(),
        }
    }

    /// Read up to `max` bytes; empty means end of input
    pub fn read(&mut self, max: usize) -> Vec<u8> {
        while self.pending.is_empty() {
            let Some(rx) = &self.rx else {
                return Vec::new();
            };
            match rx.recv() {
                Ok(chunk) => self.pending.push(chunk),
                Err(_) => {
                    self.rx = None;
                    return Vec::new();
                }
            }
        }
        self.pending.pop(max).map(|bytes| bytes.to_vec()).unwrap_or_default()
    }
}

/// Per-process import state
///
/// Built with the `with_*` methods, then handed to the guest's `start`.
pub struct GuestHost {
    pub(super) args: Vec<String>,
    pub(super) env: Vec<String>,
    pub(super) cwd: String,
    pub(super) fs: SharedFs,
    pub(super) stdout: OutputSink,
    pub(super) stderr: OutputSink,
    pub(super) stdin: StdinSource,
    pub(super) bridge: Option<BridgeClient>,
    pub(super) killed: Arc<AtomicBool>,
    pub(super) serve: Option<Arc<dyn ServeRegistrar>>,
}

impl GuestHost {
    pub fn new(fs: SharedFs) -> Self {
        Self {
            args: Vec::new(),
            env: Vec::new(),
            cwd: "/".to_string(),
            fs,
            stdout: null_sink(),
            stderr: null_sink(),
            stdin: StdinSource::default(),
            bridge: None,
            killed: Arc::new(AtomicBool::new(false)),
            serve: None,
        }
    }

    /// argv, including the program name at index 0
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.env = env
            .into_iter()
            .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: &str) -> Self {
        self.cwd = paths::normalize(cwd);
        self
    }

    #[must_use]
    pub fn with_stdout(mut self, sink: OutputSink) -> Self {
        self.stdout = sink;
        self
    }

    #[must_use]
    pub fn with_stderr(mut self, sink: OutputSink) -> Self {
        self.stderr = sink;
        self
    }

    #[must_use]
    pub fn with_stdin(mut self, rx: flume::Receiver<Vec<u8>>) -> Self {
        self.stdin = StdinSource::new(rx);
        self
    }

    #[must_use]
    pub fn with_bridge(mut self, bridge: BridgeClient) -> Self {
        self.bridge = Some(bridge);
        self
    }

    #[must_use]
    pub fn with_kill_flag(mut self, killed: Arc<AtomicBool>) -> Self {
        self.killed = killed;
        self
    }

    #[must_use]
    pub fn with_serve(mut self, registrar: Arc<dyn ServeRegistrar>) -> Self {
        self.serve = Some(registrar);
        self
    }

    pub fn fs(&self) -> &SharedFs {
        &self.fs
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Write straight to the stdout sink
    pub fn print(&self, bytes: &[u8]) {
        (self.stdout)(bytes);
    }

    /// Write straight to the stderr sink
    pub fn eprint(&self, bytes: &[u8]) {
        (self.stderr)(bytes);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// Unwind with [`Trap::Killed`] once the process has been killed
    pub fn check_killed(&self) -> Result<(), Trap> {
        if self.is_killed() {
            Err(Trap::Killed)
        } else {
            Ok(())
        }
    }

    /// Absolute VFS path for a guest-supplied one
    pub(super) fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            paths::normalize(path)
        } else {
            paths::normalize(&format!("{}/{}", self.cwd, path))
        }
    }

    /// Run an import body, folding its error into the returned code
    pub(super) fn run(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<(), Errno>,
    ) -> SyscallResult {
        self.check_killed()?;
        let result = op(self);
        self.check_killed()?;
        Ok(result.err().unwrap_or(Errno::Success))
    }
}

impl std::fmt::Debug for GuestHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestHost")
            .field("args", &self.args)
            .field("cwd", &self.cwd)
            .field("bridge", &self.bridge.is_some())
            .field("killed", &self.is_killed())
            .finish()
    }
}
