/*!
 * Serve Imports
 * Let a guest claim a port so intercepted HTTP requests reach it
 */

use std::sync::Arc;

use super::host::GuestHost;
use super::types::SyscallResult;
use crate::core::errors::Errno;
use crate::core::types::ServePort;
use crate::ipc::serve::ServeHandler;

/// Where `serve_listen` registrations go
///
/// Implemented by the execution context, which announces the port to the
/// controller and dispatches incoming requests to the handler.
pub trait ServeRegistrar: Send + Sync {
    fn listen(&self, port: ServePort, handler: Arc<dyn ServeHandler>) -> Result<(), Errno>;
    fn unlisten(&self, port: ServePort) -> Result<(), Errno>;
}

fn checked_port(port: u32) -> Result<ServePort, Errno> {
    ServePort::try_from(port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or(Errno::Inval)
}

impl GuestHost {
    /// Route requests for `port` to `handler`
    pub fn serve_listen(&mut self, port: u32, handler: Arc<dyn ServeHandler>) -> SyscallResult {
        self.run(|host| {
            let port = checked_port(port)?;
            let registrar = host.serve.as_ref().ok_or(Errno::Acces)?;
            registrar.listen(port, handler)
        })
    }

    pub fn serve_unlisten(&mut self, port: u32) -> SyscallResult {
        self.run(|host| {
            let port = checked_port(port)?;
            let registrar = host.serve.as_ref().ok_or(Errno::Acces)?;
            registrar.unlisten(port)
        })
    }
}
