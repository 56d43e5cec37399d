/*!
 * Socket Proxies
 *
 * Guest sockets never touch the host network. A request/response proxy
 * turns a buffered HTTP request into one host fetch; a stream proxy maps a
 * socket onto a duplex message stream. Both share descriptor handling
 * through [`SocketTable`] and enforce the same host policy.
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

use super::http::{parse_request, serialize_response, target_url};
use super::policy::HostPolicy;
use super::table::SocketTable;
use super::transport::{FetchRequest, HttpTransport, StreamTransport};
use super::types::*;
use crate::core::limits::DEFAULT_RECV_SIZE;
use crate::core::types::SockFd;

/// Socket operations shared by both proxy variants
#[async_trait]
pub trait SocketProxy: Send + Sync {
    /// Allocate a descriptor in the `Created` state
    fn open(&self, family: SocketFamily, kind: SocketKind) -> SockFd;

    /// Check policy and port, then attach the socket to `host:port`
    async fn connect(&self, fd: SockFd, host: &str, port: u32, url: Option<&str>)
        -> SocketResult<()>;

    /// Queue outgoing bytes; returns how many were accepted
    fn send(&self, fd: SockFd, data: &[u8]) -> SocketResult<usize>;

    /// Signal that the caller finished writing
    async fn flush(&self, fd: SockFd) -> SocketResult<()>;

    /// Pop up to `max` queued bytes without waiting
    fn recv(&self, fd: SockFd, max: usize) -> SocketResult<Bytes>;

    /// Pop up to `max` bytes, waiting while more can still arrive
    async fn recv_wait(&self, fd: SockFd, max: usize) -> SocketResult<Bytes>;

    /// Remove the descriptor, aborting in-flight transport work
    fn close(&self, fd: SockFd);

    fn subscribe(&self) -> broadcast::Receiver<SocketEvent>;

    /// Close every open socket
    fn close_all(&self);
}

/// Validate a connect request against the socket's state, the port and
/// the host policy, recording the destination on success
fn begin_connect(
    table: &SocketTable,
    policy: &HostPolicy,
    fd: SockFd,
    host: &str,
    port: u32,
    url: Option<&str>,
) -> SocketResult<u16> {
    table.with(fd, |socket| {
        if socket.state != SocketState::Created {
            return Err(SocketError::Malformed(format!("socket {fd} already connected")));
        }
        let port = u16::try_from(port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or(SocketError::InvalidPort { port })?;
        if !policy.is_allowed(host) {
            warn!(fd, host, "connect blocked by host policy");
            return Err(SocketError::Blocked { host: host.to_string() });
        }
        socket.host = Some(host.to_string());
        socket.port = port;
        socket.url = url.map(str::to_string);
        socket.transition(SocketState::Connecting);
        Ok(port)
    })
}

fn effective_max(max: usize) -> usize {
    if max == 0 {
        DEFAULT_RECV_SIZE
    } else {
        max
    }
}

// =============================================================================
// REQUEST/RESPONSE PROXY
// =============================================================================

/// Proxy that answers each flushed HTTP request with one host fetch
pub struct HttpSocketProxy {
    table: Arc<SocketTable>,
    policy: HostPolicy,
    transport: Arc<dyn HttpTransport>,
}

impl HttpSocketProxy {
    pub fn new(policy: HostPolicy, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            table: Arc::new(SocketTable::new()),
            policy,
            transport,
        }
    }

    pub fn table(&self) -> &SocketTable {
        &self.table
    }
}

#[async_trait]
impl SocketProxy for HttpSocketProxy {
    fn open(&self, family: SocketFamily, kind: SocketKind) -> SockFd {
        self.table.open(family, kind)
    }

    async fn connect(
        &self,
        fd: SockFd,
        host: &str,
        port: u32,
        url: Option<&str>,
    ) -> SocketResult<()> {
        begin_connect(&self.table, &self.policy, fd, host, port, url)?;
        // Nothing to dial: the fetch happens at flush
        self.table.with(fd, |socket| {
            socket.transition(SocketState::Connected);
            Ok(())
        })?;
        self.table.publish(SocketEvent::Connected { fd });
        debug!(fd, host, port, "http socket connected");
        Ok(())
    }

    fn send(&self, fd: SockFd, data: &[u8]) -> SocketResult<usize> {
        self.table.with(fd, |socket| {
            if socket.state != SocketState::Connected {
                return Err(SocketError::NotConnected { fd });
            }
            socket.send_buffer.extend_from_slice(data);
            Ok(data.len())
        })
    }

    async fn flush(&self, fd: SockFd) -> SocketResult<()> {
        let request = self.table.with(fd, |socket| {
            if socket.state != SocketState::Connected {
                return Err(SocketError::NotConnected { fd });
            }
            let raw = socket.send_buffer.split().freeze();
            let parsed = parse_request(&raw)?;
            let host = socket.host.clone().unwrap_or_default();
            let url = target_url(&parsed, &host, socket.port, socket.url.as_deref())?;
            socket.in_flight = true;
            Ok(FetchRequest {
                url,
                method: parsed.method,
                headers: parsed.headers,
                body: parsed.body,
            })
        })?;

        let table = Arc::clone(&self.table);
        let transport = Arc::clone(&self.transport);
        let task = tokio::spawn(async move {
            match transport.fetch(request).await {
                Ok(response) => {
                    table.push_chunk(fd, serialize_response(&response));
                    let _ = table.with(fd, |socket| {
                        socket.in_flight = false;
                        Ok(())
                    });
                    Ok(())
                }
                Err(err) => {
                    warn!(fd, error = %err, "proxy fetch failed");
                    table.fail(fd, &err);
                    Err(err)
                }
            }
        });
        let tracked = self.table.with(fd, |socket| {
            socket.tasks.push(task.abort_handle());
            Ok(())
        });
        if let Err(err) = tracked {
            task.abort();
            return Err(err);
        }

        match task.await {
            Ok(result) => result,
            Err(_) => Err(SocketError::BadDescriptor { fd }),
        }
    }

    fn recv(&self, fd: SockFd, max: usize) -> SocketResult<Bytes> {
        self.table.recv(fd, effective_max(max))
    }

    async fn recv_wait(&self, fd: SockFd, max: usize) -> SocketResult<Bytes> {
        self.table.recv_wait(fd, effective_max(max)).await
    }

    fn close(&self, fd: SockFd) {
        self.table.close(fd);
    }

    fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.table.subscribe()
    }

    fn close_all(&self) {
        self.table.close_all();
    }
}

// =============================================================================
// STREAM PROXY
// =============================================================================

/// Proxy that maps each socket onto a duplex message stream
pub struct StreamSocketProxy {
    table: Arc<SocketTable>,
    policy: HostPolicy,
    transport: Arc<dyn StreamTransport>,
}

impl StreamSocketProxy {
    pub fn new(policy: HostPolicy, transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            table: Arc::new(SocketTable::new()),
            policy,
            transport,
        }
    }

    pub fn table(&self) -> &SocketTable {
        &self.table
    }
}

#[async_trait]
impl SocketProxy for StreamSocketProxy {
    fn open(&self, family: SocketFamily, kind: SocketKind) -> SockFd {
        self.table.open(family, kind)
    }

    async fn connect(
        &self,
        fd: SockFd,
        host: &str,
        port: u32,
        url: Option<&str>,
    ) -> SocketResult<()> {
        let port = begin_connect(&self.table, &self.policy, fd, host, port, url)?;
        let target = match url {
            Some(url) => Url::parse(url),
            None => Url::parse(&format!("ws://{host}:{port}")),
        }
        .map_err(|err| SocketError::Malformed(err.to_string()));
        let target = match target {
            Ok(target) => target,
            Err(err) => {
                self.table.fail(fd, &err);
                return Err(err);
            }
        };

        let connection = match self.transport.open(&target).await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(fd, url = %target, error = %err, "stream connect failed");
                self.table.fail(fd, &err);
                return Err(err);
            }
        };

        let mut incoming = connection.incoming;
        let table = Arc::clone(&self.table);
        let pump = tokio::spawn(async move {
            while let Some(frame) = incoming.recv().await {
                if !table.push_chunk(fd, frame) {
                    return;
                }
            }
            table.finish(fd);
        });

        let mut tasks = connection.tasks;
        tasks.push(pump.abort_handle());
        let mut pending = Some((connection.outgoing, tasks));
        let attached = self.table.with(fd, |socket| {
            if let Some((outgoing, tasks)) = pending.take() {
                socket.outgoing = Some(outgoing);
                socket.tasks.extend(tasks);
            }
            socket.transition(SocketState::Connected);
            Ok(())
        });
        if let Err(err) = attached {
            // Closed while the transport was opening
            if let Some((_, tasks)) = pending {
                for task in tasks {
                    task.abort();
                }
            }
            return Err(err);
        }

        self.table.publish(SocketEvent::Connected { fd });
        info!(fd, url = %target, "stream socket connected");
        Ok(())
    }

    fn send(&self, fd: SockFd, data: &[u8]) -> SocketResult<usize> {
        self.table.with(fd, |socket| {
            let outgoing = socket
                .outgoing
                .as_ref()
                .filter(|_| socket.state == SocketState::Connected)
                .ok_or(SocketError::NotConnected { fd })?;
            outgoing
                .send(Bytes::copy_from_slice(data))
                .map_err(|_| SocketError::NotConnected { fd })?;
            Ok(data.len())
        })
    }

    async fn flush(&self, fd: SockFd) -> SocketResult<()> {
        // Frames go out as they are sent
        self.table.with(fd, |_| Ok(()))
    }

    fn recv(&self, fd: SockFd, max: usize) -> SocketResult<Bytes> {
        self.table.recv(fd, effective_max(max))
    }

    async fn recv_wait(&self, fd: SockFd, max: usize) -> SocketResult<Bytes> {
        self.table.recv_wait(fd, effective_max(max)).await
    }

    fn close(&self, fd: SockFd) {
        self.table.close(fd);
    }

    fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.table.subscribe()
    }

    fn close_all(&self) {
        self.table.close_all();
    }
}
