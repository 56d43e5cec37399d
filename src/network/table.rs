/*!
 * Socket Table
 * Descriptor storage shared by both proxy variants
 */

use ahash::RandomState;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use super::queue::ChunkQueue;
use super::types::*;
use crate::core::limits::FIRST_SOCKET_FD;
use crate::core::types::SockFd;

const EVENT_CAPACITY: usize = 256;

/// One proxied socket
#[derive(Debug)]
pub struct SocketDescriptor {
    pub fd: SockFd,
    pub family: SocketFamily,
    pub kind: SocketKind,
    pub state: SocketState,
    pub host: Option<String>,
    pub port: u16,
    pub url: Option<String>,
    pub send_buffer: BytesMut,
    pub recv_buffer: ChunkQueue,
    pub(super) in_flight: bool,
    pub(super) outgoing: Option<mpsc::UnboundedSender<Bytes>>,
    pub(super) tasks: Vec<AbortHandle>,
    readable: Arc<Notify>,
}

impl SocketDescriptor {
    fn new(fd: SockFd, family: SocketFamily, kind: SocketKind) -> Self {
        Self {
            fd,
            family,
            kind,
            state: SocketState::Created,
            host: None,
            port: 0,
            url: None,
            send_buffer: BytesMut::new(),
            recv_buffer: ChunkQueue::new(),
            in_flight: false,
            outgoing: None,
            tasks: Vec::new(),
            readable: Arc::new(Notify::new()),
        }
    }

    /// Move to `next` if the state machine allows it
    pub fn transition(&mut self, next: SocketState) -> bool {
        if self.state.can_transition_to(next) {
            trace!(fd = self.fd, from = ?self.state, to = ?next, "socket state");
            self.state = next;
            true
        } else {
            false
        }
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.outgoing = None;
    }
}

/// Descriptor table plus the event stream
///
/// Descriptors count up from 1000 and are never recycled within a table.
/// DashMap guards are never held across an await.
#[derive(Debug)]
pub struct SocketTable {
    next_fd: AtomicU32,
    sockets: DashMap<SockFd, SocketDescriptor, RandomState>,
    events: broadcast::Sender<SocketEvent>,
}

impl SocketTable {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            next_fd: AtomicU32::new(FIRST_SOCKET_FD),
            sockets: DashMap::with_hasher(RandomState::new()),
            events,
        }
    }

    pub fn open(&self, family: SocketFamily, kind: SocketKind) -> SockFd {
        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        self.sockets.insert(fd, SocketDescriptor::new(fd, family, kind));
        debug!(fd, ?family, ?kind, "socket opened");
        fd
    }

    /// Run `f` against a live descriptor
    pub fn with<R>(
        &self,
        fd: SockFd,
        f: impl FnOnce(&mut SocketDescriptor) -> SocketResult<R>,
    ) -> SocketResult<R> {
        let mut entry = self
            .sockets
            .get_mut(&fd)
            .ok_or(SocketError::BadDescriptor { fd })?;
        f(entry.value_mut())
    }

    pub fn contains(&self, fd: SockFd) -> bool {
        self.sockets.contains_key(&fd)
    }

    pub fn state(&self, fd: SockFd) -> Option<SocketState> {
        self.sockets.get(&fd).map(|entry| entry.state)
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Queue an inbound chunk and wake readers
    pub fn push_chunk(&self, fd: SockFd, chunk: Bytes) -> bool {
        let len = chunk.len();
        let pushed = self
            .with(fd, |socket| {
                socket.recv_buffer.push(chunk);
                socket.readable.notify_one();
                Ok(())
            })
            .is_ok();
        if pushed {
            self.publish(SocketEvent::Data { fd, len });
        }
        pushed
    }

    /// Pop up to `max` bytes without waiting
    pub fn recv(&self, fd: SockFd, max: usize) -> SocketResult<Bytes> {
        self.with(fd, |socket| Ok(socket.recv_buffer.pop(max).unwrap_or_default()))
    }

    /// Pop up to `max` bytes, waiting while more data can still arrive
    ///
    /// Returns an empty buffer once the queue is drained and nothing is
    /// pending: the socket reached a terminal state, or for request/response
    /// sockets, no fetch is in flight.
    pub async fn recv_wait(&self, fd: SockFd, max: usize) -> SocketResult<Bytes> {
        enum Poll {
            Ready(Bytes),
            Wait(Arc<Notify>),
        }

        loop {
            let poll = self.with(fd, |socket| {
                if let Some(bytes) = socket.recv_buffer.pop(max) {
                    return Ok(Poll::Ready(bytes));
                }
                let exhausted = socket.state.is_terminal()
                    || (socket.outgoing.is_none() && !socket.in_flight);
                if exhausted {
                    return Ok(Poll::Ready(Bytes::new()));
                }
                Ok(Poll::Wait(Arc::clone(&socket.readable)))
            })?;
            match poll {
                Poll::Ready(bytes) => return Ok(bytes),
                Poll::Wait(notify) => notify.notified().await,
            }
        }
    }

    /// Record a transport failure: Error then Closed, both published
    pub fn fail(&self, fd: SockFd, err: &SocketError) {
        let known = self
            .with(fd, |socket| {
                if !socket.transition(SocketState::Error) {
                    socket.transition(SocketState::Closed);
                }
                socket.in_flight = false;
                socket.abort_tasks();
                socket.readable.notify_one();
                Ok(())
            })
            .is_ok();
        if known {
            self.publish(SocketEvent::Error {
                fd,
                errno: err.errno(),
                message: err.to_string(),
            });
            self.publish(SocketEvent::Closed { fd });
        }
    }

    /// Remote side finished; the descriptor stays until the guest closes it
    pub fn finish(&self, fd: SockFd) {
        let changed = self
            .with(fd, |socket| {
                let changed = socket.transition(SocketState::Closed);
                socket.in_flight = false;
                socket.outgoing = None;
                socket.readable.notify_one();
                Ok(changed)
            })
            .unwrap_or(false);
        if changed {
            self.publish(SocketEvent::Closed { fd });
        }
    }

    /// Remove a descriptor and abort its transport; unknown fds are ignored
    pub fn close(&self, fd: SockFd) {
        let Some((_, mut socket)) = self.sockets.remove(&fd) else {
            trace!(fd, "close on unknown socket ignored");
            return;
        };
        socket.abort_tasks();
        socket.readable.notify_one();
        if !socket.state.is_terminal() {
            self.publish(SocketEvent::Closed { fd });
        }
        debug!(fd, "socket closed");
    }

    /// Close every descriptor
    pub fn close_all(&self) {
        let fds: Vec<SockFd> = self.sockets.iter().map(|entry| *entry.key()).collect();
        for fd in fds {
            self.close(fd);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: SocketEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for SocketTable {
    fn default() -> Self {
        Self::new()
    }
}
