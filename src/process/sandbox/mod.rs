/*!
 * Sandbox Orchestrator
 *
 * Controller side of one sandbox instance: boots an execution context,
 * mirrors filesystem writes into it, runs commands and routes the
 * messages it sends back. All methods fail fast with
 * [`SandboxError::Disposed`] once the sandbox is torn down.
 */

mod builder;
mod events;
mod exec;
mod fs;

pub use builder::SandboxBuilder;

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::types::*;
use crate::bridge::BridgeController;
use crate::config::SandboxConfig;
use crate::core::types::TaskId;
use crate::ipc::{
    FsReply, PendingTasks, PortSender, ProcessCommand, ServeRouter, Subscribers, ToContext,
};
use crate::modules::ModuleLoader;
use crate::network::SocketProxy;
use crate::vfs::{FsEvent, SharedFs};

/// Output channels of a running process
struct ProcessStreams {
    stdout: flume::Sender<Vec<u8>>,
    stderr: flume::Sender<Vec<u8>>,
}

/// State shared by a sandbox, its handles and its event pump
pub(crate) struct Shared {
    id: String,
    config: SandboxConfig,
    state: Mutex<SandboxState>,
    running: AtomicUsize,
    mirror: SharedFs,
    modules: Arc<ModuleLoader>,
    to_context: PortSender<ToContext>,
    exits: PendingTasks<SandboxResult<i32>>,
    streams: DashMap<TaskId, ProcessStreams, RandomState>,
    fs_tasks: PendingTasks<FsReply>,
    watchers: Subscribers<FsEvent>,
    router: Arc<ServeRouter>,
    proxy: Arc<dyn SocketProxy>,
    bridge: BridgeController,
    boot: Mutex<Option<oneshot::Sender<Result<(), String>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    context: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn state(&self) -> SandboxState {
        *self.state.lock()
    }

    /// Err unless the sandbox can take new work
    pub(crate) fn ensure_ready(&self) -> SandboxResult<()> {
        match self.state() {
            SandboxState::Disposed => Err(SandboxError::Disposed),
            state if state.accepts_work() => Ok(()),
            state => Err(SandboxError::NotReady(state)),
        }
    }

    pub(crate) fn send(&self, message: ToContext) -> SandboxResult<()> {
        if self.state() == SandboxState::Disposed {
            return Err(SandboxError::Disposed);
        }
        self.to_context
            .send(&message)
            .map_err(|_| SandboxError::Disposed)
    }

    fn begin_process(&self) {
        self.running.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if *state == SandboxState::Ready {
            *state = SandboxState::Executing;
        }
    }

    fn end_process(&self) {
        let previous = self.running.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            let mut state = self.state.lock();
            if *state == SandboxState::Executing {
                *state = SandboxState::Ready;
            }
        }
    }

    /// Drop a process's streams; true the first time for each id
    fn retire_process(&self, id: TaskId) -> bool {
        let retired = self.streams.remove(&id).is_some();
        if retired {
            self.end_process();
        }
        retired
    }

    /// Release everything the instance holds; safe to call repeatedly
    fn teardown(&self) {
        {
            let mut state = self.state.lock();
            if *state == SandboxState::Disposed {
                return;
            }
            *state = SandboxState::Disposed;
        }

        let _ = self
            .to_context
            .send(&ToContext::Process(ProcessCommand::Shutdown));
        self.router.unregister(&self.id);
        self.proxy.close_all();
        self.bridge.close();

        // Waiters see a closed channel, never a made-up exit code
        self.exits.clear();
        self.fs_tasks.clear();
        self.streams.clear();
        self.watchers.close();
        self.boot.lock().take();

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        // Detached: the context exits on Shutdown or disconnect
        self.context.lock().take();
        info!(instance = %self.id, "sandbox disposed");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Handle to one sandbox instance
///
/// Cheap to clone; every clone drives the same instance.
#[derive(Clone)]
pub struct Sandbox {
    shared: Arc<Shared>,
}

impl Sandbox {
    pub fn builder(config: SandboxConfig) -> SandboxBuilder {
        SandboxBuilder::new(config)
    }

    /// Boot with the default socket proxy and serve router
    pub async fn boot(
        config: SandboxConfig,
        guests: super::guest::GuestRegistry,
    ) -> SandboxResult<Self> {
        SandboxBuilder::new(config).guests(guests).boot().await
    }

    /// Instance id, also the serve channel name
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn state(&self) -> SandboxState {
        self.shared.state()
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.shared.config
    }

    pub fn router(&self) -> &Arc<ServeRouter> {
        &self.shared.router
    }

    /// Module loader reading from the controller's mirror
    pub fn modules(&self) -> &Arc<ModuleLoader> {
        &self.shared.modules
    }

    pub fn socket_proxy(&self) -> &Arc<dyn SocketProxy> {
        &self.shared.proxy
    }

    /// Processes started and not yet exited
    pub fn running(&self) -> usize {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Tear the instance down
    ///
    /// Stops the execution context, unregisters the serve channel, closes
    /// sockets and the bridge, and drops pending work without resolving it.
    pub fn dispose(&self) {
        debug!(instance = %self.shared.id, "dispose requested");
        self.shared.teardown();
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == SandboxState::Disposed
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("running", &self.running())
            .finish()
    }
}
