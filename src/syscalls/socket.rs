/*!
 * Socket Imports
 *
 * Each call is encoded as a JSON [`SocketCall`], pushed through the
 * synchronous bridge and decoded from the [`SocketReply`]. The guest
 * thread blocks for the duration. An empty reply means the controller
 * could not complete the call.
 */

use tracing::{debug, warn};

use super::host::GuestHost;
use super::memory::{GuestMemory, GuestMemoryExt};
use super::types::SyscallResult;
use crate::bridge::RequestKind;
use crate::core::errors::Errno;
use crate::core::types::SockFd;
use crate::network::{SocketCall, SocketFamily, SocketKind, SocketReply};

impl GuestHost {
    fn socket_call(&self, call: &SocketCall) -> Result<(u64, Vec<u8>), Errno> {
        let bridge = self.bridge.as_ref().ok_or(Errno::Acces)?;
        let payload = serde_json::to_vec(call).map_err(|_| Errno::Inval)?;
        let response = bridge
            .request_sync(RequestKind::Socket, &payload)
            .map_err(|err| {
                warn!(error = %err, "socket bridge call failed");
                err.errno()
            })?;
        if response.is_empty() {
            return Err(Errno::Notconn);
        }
        match serde_json::from_slice::<SocketReply>(&response) {
            Ok(SocketReply::Ok { value, data }) => Ok((value, data)),
            Ok(SocketReply::Err { errno }) => Err(errno),
            Err(err) => {
                warn!(error = %err, "undecodable socket reply");
                Err(Errno::Notconn)
            }
        }
    }

    /// Open a socket; the descriptor goes to `fd_out`
    pub fn sock_open(
        &mut self,
        mem: &mut dyn GuestMemory,
        family: u32,
        kind: u32,
        fd_out: u32,
    ) -> SyscallResult {
        self.run(|host| {
            let family = SocketFamily::from_raw(family).ok_or(Errno::Inval)?;
            let kind = SocketKind::from_raw(kind).ok_or(Errno::Inval)?;
            let (fd, _) = host.socket_call(&SocketCall::Open { family, kind })?;
            debug!(fd, "sock_open");
            mem.write_u32(fd_out, fd as u32)
        })
    }

    pub fn sock_connect(
        &mut self,
        mem: &mut dyn GuestMemory,
        fd: SockFd,
        host_ptr: u32,
        host_len: u32,
        port: u32,
    ) -> SyscallResult {
        self.run(|host| {
            let target = mem.read_str(host_ptr, host_len)?.to_string();
            host.socket_call(&SocketCall::Connect {
                fd,
                host: target,
                port,
                url: None,
            })?;
            Ok(())
        })
    }

    /// Send bytes; the accepted count goes to `nsent_out`
    pub fn sock_send(
        &mut self,
        mem: &mut dyn GuestMemory,
        fd: SockFd,
        buf: u32,
        len: u32,
        nsent_out: u32,
    ) -> SyscallResult {
        self.run(|host| {
            let data = mem.slice(buf, len)?.to_vec();
            let (sent, _) = host.socket_call(&SocketCall::Send { fd, data })?;
            mem.write_u32(nsent_out, sent as u32)
        })
    }

    /// Mark the outgoing request complete
    pub fn sock_flush(&mut self, fd: SockFd) -> SyscallResult {
        self.run(|host| host.socket_call(&SocketCall::Flush { fd }).map(|_| ()))
    }

    /// Receive up to `len` bytes; the count goes to `nread_out`, zero at end
    pub fn sock_recv(
        &mut self,
        mem: &mut dyn GuestMemory,
        fd: SockFd,
        buf: u32,
        len: u32,
        nread_out: u32,
    ) -> SyscallResult {
        self.run(|host| {
            let (_, data) = host.socket_call(&SocketCall::Recv {
                fd,
                max: len as usize,
            })?;
            let data = &data[..data.len().min(len as usize)];
            mem.write_bytes(buf, data)?;
            mem.write_u32(nread_out, data.len() as u32)
        })
    }

    pub fn sock_close(&mut self, fd: SockFd) -> SyscallResult {
        self.run(|host| host.socket_call(&SocketCall::Close { fd }).map(|_| ()))
    }
}
