/*!
 * Event Pump
 * Routes everything the execution context sends to whoever is waiting
 */

use std::sync::Weak;
use tracing::{debug, error, warn};

use super::Shared;
use crate::ipc::{FromContext, PortReceiver, ProcessEvent};
use crate::process::types::{SandboxError, SandboxState};

/// Drain the context's messages until it disconnects or the sandbox drops
pub(super) async fn pump(shared: Weak<Shared>, rx: PortReceiver<FromContext>) {
    while let Ok(message) = rx.recv_async().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        shared.dispatch(message);
    }

    if let Some(shared) = shared.upgrade() {
        if shared.state() != SandboxState::Disposed {
            error!(instance = %shared.id, "execution context exited unexpectedly");
            shared.teardown();
        }
    }
}

impl Shared {
    fn dispatch(&self, message: FromContext) {
        match message {
            FromContext::Process(event) => self.on_process(event),
            FromContext::Fs(reply) => {
                let id = reply.id();
                if !self.fs_tasks.resolve(id, reply) {
                    debug!(id, "fs reply for unknown task dropped");
                }
            }
            FromContext::FsEvent(event) => {
                self.modules.invalidate_event(&event);
                self.watchers.publish(&event);
            }
            FromContext::Serve(event) => self.router.deliver(&self.id, event),
        }
    }

    fn on_process(&self, event: ProcessEvent) {
        match event {
            ProcessEvent::Ready => match self.boot.lock().take() {
                Some(tx) => {
                    let _ = tx.send(Ok(()));
                }
                None => warn!("unexpected ready from execution context"),
            },
            ProcessEvent::Error { id: None, message } => match self.boot.lock().take() {
                Some(tx) => {
                    let _ = tx.send(Err(message));
                }
                None => error!(%message, "execution context error"),
            },
            ProcessEvent::Stdout { id, data } => {
                if let Some(streams) = self.streams.get(&id) {
                    let _ = streams.stdout.send(data);
                }
            }
            ProcessEvent::Stderr { id, data } => {
                if let Some(streams) = self.streams.get(&id) {
                    let _ = streams.stderr.send(data);
                }
            }
            ProcessEvent::Exit { id, code } => {
                if self.retire_process(id) {
                    debug!(id, code, "process exited");
                    self.exits.resolve(id, Ok(code));
                }
            }
            ProcessEvent::Error {
                id: Some(id),
                message,
            } => {
                if self.retire_process(id) {
                    self.exits.resolve(id, Err(SandboxError::GuestFault(message)));
                }
            }
        }
    }
}
