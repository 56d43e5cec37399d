/*!
 * Sandbox Builder
 * Wires the bridge, socket proxy, serve channel and execution context,
 * then waits for the context to report ready
 */

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{events, Sandbox, Shared};
use crate::bridge::Bridge;
use crate::config::SandboxConfig;
use crate::ipc::{self, FromContext, PendingTasks, ProcessCommand, ServeRouter, Subscribers, ToContext};
use crate::modules::{BuiltinProvider, ModuleLoader};
use crate::network::{HostPolicy, HttpSocketProxy, ReqwestTransport, SocketBridge, SocketProxy};
use crate::process::context::ExecutionContext;
use crate::process::guest::GuestRegistry;
use crate::process::types::{SandboxError, SandboxResult, SandboxState};
use crate::vfs::MemFs;

/// Builder for [`Sandbox`]
pub struct SandboxBuilder {
    config: SandboxConfig,
    guests: GuestRegistry,
    proxy: Option<Arc<dyn SocketProxy>>,
    router: Option<Arc<ServeRouter>>,
    builtins: Option<Arc<dyn BuiltinProvider>>,
}

impl SandboxBuilder {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            guests: GuestRegistry::new(),
            proxy: None,
            router: None,
            builtins: None,
        }
    }

    /// Commands the sandbox can run
    #[must_use]
    pub fn guests(mut self, guests: GuestRegistry) -> Self {
        self.guests = guests;
        self
    }

    /// Replace the default fetch-backed socket proxy
    #[must_use]
    pub fn socket_proxy(mut self, proxy: Arc<dyn SocketProxy>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Share a serve router between several sandboxes
    #[must_use]
    pub fn router(mut self, router: Arc<ServeRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Export names for built-in modules served by [`Sandbox::modules`]
    #[must_use]
    pub fn builtins(mut self, provider: Arc<dyn BuiltinProvider>) -> Self {
        self.builtins = Some(provider);
        self
    }

    /// Start the instance and wait for its context, bounded by `boot_timeout`
    ///
    /// On any failure the partially started instance is torn down.
    pub async fn boot(self) -> SandboxResult<Sandbox> {
        let id = Uuid::new_v4().simple().to_string();
        let span = info_span!("sandbox", instance = %id);
        self.boot_instance(id).instrument(span).await
    }

    async fn boot_instance(self, id: String) -> SandboxResult<Sandbox> {
        let config = self.config;
        let snapshot = config.seed_snapshot();
        let mut mirror = MemFs::from_snapshot(&snapshot)
            .map_err(|err| SandboxError::BootFailed(err.to_string()))?;
        mirror.mkdirp(&config.cwd)?;

        let mirror = mirror.shared();
        let mut modules = ModuleLoader::new(Arc::clone(&mirror));
        if let Some(provider) = self.builtins {
            modules = modules.with_builtins(provider);
        }

        let proxy = match self.proxy {
            Some(proxy) => proxy,
            None => default_proxy(&config)?,
        };
        let router = self
            .router
            .unwrap_or_else(|| Arc::new(ServeRouter::new(config.serve_prefix.clone())));

        let (client, controller) = Bridge::new(config.bridge_capacity, config.bridge_poll_interval);
        let bridge_task = controller
            .clone()
            .spawn(Arc::new(
                SocketBridge::new(Arc::clone(&proxy)).with_capacity(config.bridge_capacity),
            ));

        let (controller_port, context_port) = ipc::channel::<FromContext, ToContext>();
        let (to_context, from_context) = controller_port.split();
        let (boot_tx, boot_rx) = oneshot::channel();

        let shared = Arc::new(Shared {
            id: id.clone(),
            config,
            state: Mutex::new(SandboxState::Booting),
            running: AtomicUsize::new(0),
            modules: Arc::new(modules),
            mirror,
            to_context: to_context.clone(),
            exits: PendingTasks::new(),
            streams: DashMap::with_hasher(RandomState::new()),
            fs_tasks: PendingTasks::new(),
            watchers: Subscribers::new(),
            router: Arc::clone(&router),
            proxy,
            bridge: controller,
            boot: Mutex::new(Some(boot_tx)),
            tasks: Mutex::new(vec![bridge_task]),
            context: Mutex::new(None),
        });
        router.register(&id, to_context);

        let pump = tokio::spawn(events::pump(Arc::downgrade(&shared), from_context));
        shared.tasks.lock().push(pump);

        let context = ExecutionContext::new(&id, context_port, Arc::new(self.guests), client)
            .spawn()
            .map_err(|err| {
                shared.teardown();
                SandboxError::BootFailed(format!("failed to start execution context: {err}"))
            })?;
        *shared.context.lock() = Some(context);

        let init = ToContext::Process(ProcessCommand::Init {
            snapshot,
            cwd: shared.config.cwd.clone(),
            env: shared.config.env.clone(),
        });
        if let Err(err) = shared.to_context.send(&init) {
            shared.teardown();
            return Err(SandboxError::BootFailed(err.to_string()));
        }

        let timeout = shared.config.boot_timeout;
        match tokio::time::timeout(timeout, boot_rx).await {
            Ok(Ok(Ok(()))) => {
                {
                    let mut state = shared.state.lock();
                    if *state == SandboxState::Booting {
                        *state = SandboxState::Ready;
                    }
                }
                info!("sandbox ready");
                Ok(Sandbox { shared })
            }
            Ok(Ok(Err(message))) => {
                shared.teardown();
                Err(SandboxError::BootFailed(message))
            }
            Ok(Err(_)) => {
                shared.teardown();
                Err(SandboxError::BootFailed(
                    "execution context exited during boot".into(),
                ))
            }
            Err(_) => {
                warn!(?timeout, "boot timed out");
                shared.teardown();
                Err(SandboxError::BootTimeout(timeout))
            }
        }
    }
}

fn default_proxy(config: &SandboxConfig) -> SandboxResult<Arc<dyn SocketProxy>> {
    let transport = ReqwestTransport::new(config.fetch_timeout)
        .map_err(|err| SandboxError::BootFailed(err.to_string()))?;
    Ok(Arc::new(HttpSocketProxy::new(
        HostPolicy::from_option(config.allowed_hosts.clone()),
        Arc::new(transport),
    )))
}
