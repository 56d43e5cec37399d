/*!
 * Execution Context
 *
 * A dedicated thread that owns one VFS replica and the guests running
 * against it. The dispatcher loop reads [`ToContext`] messages in order;
 * each process runs on its own thread so a guest blocked on stdin or a
 * bridge call never stalls the dispatcher.
 */

use ahash::HashMap;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, info_span, warn};

use super::guest::GuestRegistry;
use crate::bridge::BridgeClient;
use crate::core::errors::Errno;
use crate::core::limits::{COMMAND_NOT_FOUND_EXIT_CODE, KILLED_EXIT_CODE};
use crate::core::types::{ServePort, TaskId};
use crate::ipc::{
    FromContext, FsReply, FsRequest, Port, PortSender, ProcessCommand, ProcessEvent,
    ResponseSink, ServeCommand, ServeEvent, ServeHandler, ToContext,
};
use crate::monitoring::span_process;
use crate::network::HttpRequest;
use crate::syscalls::{GuestHost, OutputSink, ServeRegistrar, Trap};
use crate::vfs::{paths, FsEvent, MemFs, SharedFs, VfsError, VfsResult};

/// Exit code reported for a guest fault
const FAULT_EXIT_CODE: i32 = 1;

/// Live process bookkeeping
struct ProcessSlot {
    stdin: Option<flume::Sender<Vec<u8>>>,
    killed: Arc<AtomicBool>,
}

type ProcessTable = Arc<Mutex<HashMap<TaskId, ProcessSlot>>>;
type HandlerTable = Arc<Mutex<HashMap<ServePort, Arc<dyn ServeHandler>>>>;

/// `serve_listen` target: records the handler and tells the controller
struct ContextServe {
    handlers: HandlerTable,
    out: PortSender<FromContext>,
}

impl ServeRegistrar for ContextServe {
    fn listen(&self, port: ServePort, handler: Arc<dyn ServeHandler>) -> Result<(), Errno> {
        self.handlers.lock().insert(port, handler);
        self.out
            .send(&FromContext::Serve(ServeEvent::Listen { port }))
            .map_err(|_| Errno::Notconn)
    }

    fn unlisten(&self, port: ServePort) -> Result<(), Errno> {
        if self.handlers.lock().remove(&port).is_none() {
            return Err(Errno::Inval);
        }
        self.out
            .send(&FromContext::Serve(ServeEvent::Unlisten { port }))
            .map_err(|_| Errno::Notconn)
    }
}

/// Environment fixed by `Init`
struct Booted {
    fs: SharedFs,
    cwd: String,
    env: Vec<(String, String)>,
}

/// State owned by the dispatcher thread
pub struct ExecutionContext {
    name: String,
    port: Port<ToContext, FromContext>,
    guests: Arc<GuestRegistry>,
    bridge: BridgeClient,
    booted: Option<Booted>,
    processes: ProcessTable,
    handlers: HandlerTable,
}

impl ExecutionContext {
    pub fn new(
        name: &str,
        port: Port<ToContext, FromContext>,
        guests: Arc<GuestRegistry>,
        bridge: BridgeClient,
    ) -> Self {
        Self {
            name: name.to_string(),
            port,
            guests,
            bridge,
            booted: None,
            processes: Arc::new(Mutex::new(HashMap::default())),
            handlers: Arc::new(Mutex::new(HashMap::default())),
        }
    }

    /// Run the dispatcher on a new thread
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("ctx-{}", self.name))
            .spawn(move || self.run())
    }

    /// Dispatch until `Shutdown` or until the controller goes away
    pub fn run(mut self) {
        let span = info_span!("context", instance = %self.name);
        let _enter = span.enter();
        info!("execution context started");

        loop {
            let message = match self.port.recv() {
                Ok(message) => message,
                Err(_) => {
                    debug!("controller disconnected");
                    break;
                }
            };
            match message {
                ToContext::Process(ProcessCommand::Shutdown) => break,
                ToContext::Process(command) => self.on_process(command),
                ToContext::Fs(request) => self.on_fs(request),
                ToContext::Serve(command) => self.on_serve(command),
            }
        }

        self.kill_all();
        info!("execution context stopped");
    }

    fn emit(&self, message: FromContext) {
        if self.port.send(&message).is_err() {
            debug!("controller gone, dropping outbound message");
        }
    }

    fn on_process(&mut self, command: ProcessCommand) {
        match command {
            ProcessCommand::Init { snapshot, cwd, env } => {
                if self.booted.is_some() {
                    warn!("duplicate init ignored");
                    return;
                }
                match self.boot(&snapshot, &cwd, env.into_iter().collect()) {
                    Ok(()) => self.emit(FromContext::Process(ProcessEvent::Ready)),
                    Err(err) => {
                        error!(error = %err, "context boot failed");
                        self.emit(FromContext::Process(ProcessEvent::Error {
                            id: None,
                            message: err.to_string(),
                        }));
                    }
                }
            }
            ProcessCommand::Exec { id, command, args }
            | ProcessCommand::Spawn { id, command, args } => self.start_process(id, command, args),
            ProcessCommand::Stdin { id, data } => {
                let processes = self.processes.lock();
                match processes.get(&id).and_then(|slot| slot.stdin.as_ref()) {
                    Some(stdin) => {
                        let _ = stdin.send(data);
                    }
                    None => debug!(id, "stdin for finished process dropped"),
                }
            }
            ProcessCommand::CloseStdin { id } => {
                if let Some(slot) = self.processes.lock().get_mut(&id) {
                    slot.stdin = None;
                }
            }
            ProcessCommand::Kill { id } => {
                if let Some(slot) = self.processes.lock().get_mut(&id) {
                    info!(id, "killing process");
                    slot.killed.store(true, Ordering::Release);
                    slot.stdin = None;
                }
            }
            ProcessCommand::Shutdown => {}
        }
    }

    fn boot(
        &mut self,
        snapshot: &crate::vfs::VfsSnapshot,
        cwd: &str,
        env: Vec<(String, String)>,
    ) -> VfsResult<()> {
        let mut fs = MemFs::from_snapshot(snapshot)?;
        let cwd = paths::normalize(cwd);
        fs.mkdirp(&cwd)?;

        let (tx, rx) = flume::unbounded::<FsEvent>();
        fs.set_observer(tx);
        let out = self.port.sender();
        thread::Builder::new()
            .name(format!("ctx-{}-fsevents", self.name))
            .spawn(move || {
                for event in rx.iter() {
                    if out.send(&FromContext::FsEvent(event)).is_err() {
                        break;
                    }
                }
            })
            .map_err(|err| VfsError::invalid("init", "/", err.to_string()))?;

        info!(files = snapshot.len(), cwd = %cwd, "context filesystem seeded");
        self.booted = Some(Booted {
            fs: fs.shared(),
            cwd,
            env,
        });
        Ok(())
    }

    fn start_process(&mut self, id: TaskId, command: String, args: Vec<String>) {
        let Some(booted) = &self.booted else {
            self.emit(FromContext::Process(ProcessEvent::Error {
                id: Some(id),
                message: "execution context is not initialized".into(),
            }));
            return;
        };

        let (stdin_tx, stdin_rx) = flume::unbounded();
        let killed = Arc::new(AtomicBool::new(false));
        self.processes.lock().insert(
            id,
            ProcessSlot {
                stdin: Some(stdin_tx),
                killed: Arc::clone(&killed),
            },
        );

        let out = self.port.sender();
        let stdout: OutputSink = {
            let out = out.clone();
            Arc::new(move |bytes: &[u8]| {
                let _ = out.send(&FromContext::Process(ProcessEvent::Stdout {
                    id,
                    data: bytes.to_vec(),
                }));
            })
        };
        let stderr: OutputSink = {
            let out = out.clone();
            Arc::new(move |bytes: &[u8]| {
                let _ = out.send(&FromContext::Process(ProcessEvent::Stderr {
                    id,
                    data: bytes.to_vec(),
                }));
            })
        };

        let argv: Vec<String> = std::iter::once(command.clone()).chain(args).collect();
        let host = GuestHost::new(Arc::clone(&booted.fs))
            .with_args(argv)
            .with_env(booted.env.clone())
            .with_cwd(&booted.cwd)
            .with_stdout(stdout)
            .with_stderr(stderr)
            .with_stdin(stdin_rx)
            .with_bridge(self.bridge.clone())
            .with_kill_flag(killed)
            .with_serve(Arc::new(ContextServe {
                handlers: Arc::clone(&self.handlers),
                out: out.clone(),
            }));

        let guests = Arc::clone(&self.guests);
        let processes = Arc::clone(&self.processes);
        let span = span_process(&self.name, id, &command);
        let spawned = thread::Builder::new()
            .name(format!("ctx-{}-proc-{id}", self.name))
            .spawn(move || {
                let outcome = span.span().in_scope(|| run_guest(&guests, &command, host));
                processes.lock().remove(&id);
                let code = match outcome {
                    Ok(code) => code,
                    Err(message) => {
                        span.record_error(&message);
                        let _ = out.send(&FromContext::Process(ProcessEvent::Error {
                            id: Some(id),
                            message,
                        }));
                        FAULT_EXIT_CODE
                    }
                };
                span.record_exit(code);
                let _ = out.send(&FromContext::Process(ProcessEvent::Exit { id, code }));
            });

        if let Err(err) = spawned {
            self.processes.lock().remove(&id);
            self.emit(FromContext::Process(ProcessEvent::Error {
                id: Some(id),
                message: format!("failed to start process thread: {err}"),
            }));
        }
    }

    fn on_fs(&mut self, request: FsRequest) {
        let id = request.id();
        let Some(booted) = &self.booted else {
            self.emit(FromContext::Fs(FsReply::Failed {
                id,
                error: VfsError::invalid("fs", "/", "execution context is not initialized"),
            }));
            return;
        };

        let reply = {
            let mut fs = booted.fs.lock();
            let result = match request {
                FsRequest::Write { path, data, .. } => fs.write_file(&path, data),
                FsRequest::Mkdir {
                    path, recursive, ..
                } => {
                    if recursive {
                        fs.mkdirp(&path)
                    } else {
                        fs.mkdir(&path)
                    }
                }
                FsRequest::Unlink { path, .. } => fs.unlink(&path),
                FsRequest::Rename { from, to, .. } => fs.rename(&from, &to),
                FsRequest::Restore { snapshot, .. } => fs.restore(&snapshot),
                FsRequest::Snapshot { .. } => {
                    let snapshot = fs.snapshot();
                    drop(fs);
                    self.emit(FromContext::Fs(FsReply::Snapshot { id, snapshot }));
                    return;
                }
            };
            match result {
                Ok(()) => FsReply::Done { id },
                Err(error) => FsReply::Failed { id, error },
            }
        };
        self.emit(FromContext::Fs(reply));
    }

    fn on_serve(&mut self, command: ServeCommand) {
        let ServeCommand::Request {
            id,
            port,
            method,
            path,
            headers,
            body,
        } = command;
        let sink = ResponseSink::new(id, self.port.sender());
        let handler = self.handlers.lock().get(&port).cloned();
        let Some(handler) = handler else {
            let _ = sink.error(format!("nothing is listening on port {port}"));
            return;
        };

        let request = HttpRequest {
            method,
            path,
            headers,
            body: body.into(),
        };
        debug!(id, port, path = %request.path, "serve request");
        let spawned = thread::Builder::new()
            .name(format!("ctx-{}-serve-{id}", self.name))
            .spawn(move || handler.handle(request, sink));
        if let Err(err) = spawned {
            // The sink moved into the closure and was dropped, which
            // already reported the failure
            error!(id, error = %err, "failed to start serve handler thread");
        }
    }

    fn kill_all(&self) {
        for slot in self.processes.lock().values_mut() {
            slot.killed.store(true, Ordering::Release);
            slot.stdin = None;
        }
        self.handlers.lock().clear();
    }
}

/// Run one guest to completion; `Err` carries a fault message
fn run_guest(guests: &GuestRegistry, command: &str, mut host: GuestHost) -> Result<i32, String> {
    let Some(mut guest) = guests.instantiate(command) else {
        host.eprint(format!("{command}: command not found\n").as_bytes());
        return Ok(COMMAND_NOT_FOUND_EXIT_CODE);
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| guest.start(&mut host)));
    match outcome {
        Ok(Ok(())) => Ok(0),
        Ok(Err(Trap::Exit(code))) => Ok(code),
        Ok(Err(Trap::Killed)) => Ok(KILLED_EXIT_CODE),
        Ok(Err(Trap::Fault(message))) => {
            error!(command, %message, "guest fault");
            Err(message)
        }
        Err(_) => {
            error!(command, "guest panicked");
            Err(format!("{command}: guest panicked"))
        }
    }
}
