/*!
 * Serve Routing
 *
 * Guest HTTP servers never bind host ports. A guest registers a handler
 * for a port; the controller announces it to a [`ServeRouter`], which
 * accepts requests addressed to `<prefix>/<instance>/<port>/<path>`,
 * forwards them over the owning channel and streams the response back
 * chunk by chunk.
 */

use ahash::{HashMap, HashMapExt, RandomState};
use async_stream::try_stream;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures::Stream;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::messages::{FromContext, ProtocolError, ServeCommand, ServeEvent, ToContext};
use super::port::PortSender;
use crate::core::limits::DEFAULT_SERVE_PREFIX;
use crate::core::types::{ServePort, TaskId};
use crate::network::{ChunkQueue, HttpRequest};

/// Serve routing failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServeError {
    #[error("path '{0}' is not a sandbox serve path")]
    NotRouted(String),

    #[error("no sandbox instance '{0}'")]
    UnknownInstance(String),

    #[error("instance '{instance}' is not listening on port {port}")]
    NotListening { instance: String, port: ServePort },

    #[error("guest handler failed: {0}")]
    Handler(String),

    #[error("serve protocol violation: {0}")]
    Protocol(String),

    #[error("instance disposed before the response finished")]
    Disposed,
}

// =============================================================================
// GUEST SIDE
// =============================================================================

/// Handler a guest registers through `serve_listen`
///
/// Runs on the execution context. The handler owns the [`ResponseSink`]
/// and may finish it from another thread.
pub trait ServeHandler: Send + Sync {
    fn handle(&self, request: HttpRequest, response: ResponseSink);
}

impl<F> ServeHandler for F
where
    F: Fn(HttpRequest, ResponseSink) + Send + Sync,
{
    fn handle(&self, request: HttpRequest, response: ResponseSink) {
        self(request, response)
    }
}

/// Writes one response back to the controller
///
/// Sends at most one head and exactly one terminal frame. Dropping the sink
/// before `end` reports an error for the request.
#[derive(Debug)]
pub struct ResponseSink {
    id: TaskId,
    tx: PortSender<FromContext>,
    head_sent: bool,
    finished: bool,
}

impl ResponseSink {
    pub fn new(id: TaskId, tx: PortSender<FromContext>) -> Self {
        Self {
            id,
            tx,
            head_sent: false,
            finished: false,
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    fn emit(&self, event: ServeEvent) -> Result<(), ProtocolError> {
        self.tx.send(&FromContext::Serve(event))
    }

    pub fn head(&mut self, status: u16, headers: Vec<(String, String)>) -> Result<(), ProtocolError> {
        if self.head_sent {
            return Err(ProtocolError::OutOfOrder(format!(
                "response {} already has a head",
                self.id
            )));
        }
        self.head_sent = true;
        self.emit(ServeEvent::ResponseHead {
            id: self.id,
            status,
            headers,
        })
    }

    /// Append body bytes; a head must have been sent
    pub fn chunk(&mut self, data: impl Into<Vec<u8>>) -> Result<(), ProtocolError> {
        if !self.head_sent {
            return Err(ProtocolError::OutOfOrder(format!(
                "chunk before head on response {}",
                self.id
            )));
        }
        self.emit(ServeEvent::Chunk {
            id: self.id,
            data: data.into(),
        })
    }

    /// Finish the response, sending an empty 200 head if none went out
    pub fn end(mut self) -> Result<(), ProtocolError> {
        if !self.head_sent {
            self.head(200, Vec::new())?;
        }
        self.finished = true;
        self.emit(ServeEvent::End { id: self.id })
    }

    /// Abort the response
    pub fn error(mut self, message: impl Into<String>) -> Result<(), ProtocolError> {
        self.finished = true;
        self.emit(ServeEvent::Error {
            id: self.id,
            message: message.into(),
        })
    }
}

impl Drop for ResponseSink {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.emit(ServeEvent::Error {
                id: self.id,
                message: "handler dropped the response".into(),
            });
        }
    }
}

// =============================================================================
// CONTROLLER SIDE
// =============================================================================

#[derive(Debug)]
enum ServeFrame {
    Head {
        status: u16,
        headers: Vec<(String, String)>,
    },
    Chunk(Bytes),
    End,
    Error(String),
}

/// One registered sandbox instance
#[derive(Debug)]
pub struct Channel {
    pub name: String,
    pub serve_ports: BTreeSet<ServePort>,
    port: PortSender<ToContext>,
    streams: HashMap<TaskId, flume::Sender<ServeFrame>>,
}

/// Response as seen by the HTTP caller
#[derive(Debug)]
pub struct ServeResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ServeBody,
}

/// Body that fills as chunks arrive from the guest
#[derive(Debug)]
pub struct ServeBody {
    rx: flume::Receiver<ServeFrame>,
    buffer: ChunkQueue,
    finished: bool,
}

impl ServeBody {
    fn new(rx: flume::Receiver<ServeFrame>) -> Self {
        Self {
            rx,
            buffer: ChunkQueue::new(),
            finished: false,
        }
    }

    /// Up to `max` bytes; `None` once the response ended
    pub async fn read(&mut self, max: usize) -> Result<Option<Bytes>, ServeError> {
        loop {
            if let Some(bytes) = self.buffer.pop(max) {
                return Ok(Some(bytes));
            }
            if self.finished {
                return Ok(None);
            }
            let frame = self
                .rx
                .recv_async()
                .await
                .map_err(|_| ServeError::Disposed)?;
            match frame {
                ServeFrame::Chunk(bytes) => self.buffer.push(bytes),
                ServeFrame::End => self.finished = true,
                ServeFrame::Error(message) => {
                    self.finished = true;
                    return Err(ServeError::Handler(message));
                }
                ServeFrame::Head { .. } => {
                    return Err(ServeError::Protocol("second response head".into()));
                }
            }
        }
    }

    /// Read to the end
    pub async fn collect(mut self) -> Result<Bytes, ServeError> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.read(usize::MAX).await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    pub fn into_stream(mut self) -> impl Stream<Item = Result<Bytes, ServeError>> {
        try_stream! {
            while let Some(chunk) = self.read(usize::MAX).await? {
                yield chunk;
            }
        }
    }
}

/// Split `<prefix>/<instance>/<port>/<rest>` into its parts
///
/// The forwarded path keeps its leading slash and any query string.
pub fn parse_route(prefix: &str, path: &str) -> Option<(String, ServePort, String)> {
    let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
    let mut parts = rest.splitn(3, '/');
    let instance = parts.next().filter(|name| !name.is_empty())?;
    let port = parts.next()?.parse::<ServePort>().ok().filter(|p| *p != 0)?;
    let tail = parts.next().unwrap_or("");
    Some((instance.to_string(), port, format!("/{tail}")))
}

/// Routes intercepted HTTP requests to the sandbox that serves them
#[derive(Debug)]
pub struct ServeRouter {
    prefix: String,
    channels: DashMap<String, Channel, RandomState>,
    next_id: AtomicU64,
}

impl ServeRouter {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            channels: DashMap::with_hasher(RandomState::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Add an instance reachable through `port`
    pub fn register(&self, name: &str, port: PortSender<ToContext>) {
        self.channels.insert(
            name.to_string(),
            Channel {
                name: name.to_string(),
                serve_ports: BTreeSet::new(),
                port,
                streams: HashMap::new(),
            },
        );
        info!(instance = name, "serve channel registered");
    }

    /// Remove an instance; bodies still streaming end with `Disposed`
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.channels.remove(name).is_some();
        if removed {
            info!(instance = name, "serve channel unregistered");
        }
        removed
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn is_listening(&self, name: &str, port: ServePort) -> bool {
        self.channels
            .get(name)
            .map(|channel| channel.serve_ports.contains(&port))
            .unwrap_or(false)
    }

    /// Listening ports of an instance
    pub fn ports(&self, name: &str) -> Vec<ServePort> {
        self.channels
            .get(name)
            .map(|channel| channel.serve_ports.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn url_for(&self, name: &str, port: ServePort) -> String {
        format!("{}/{}/{}/", self.prefix, name, port)
    }

    /// Apply serve traffic reported by an instance
    pub fn deliver(&self, name: &str, event: ServeEvent) {
        let Some(mut channel) = self.channels.get_mut(name) else {
            warn!(instance = name, "serve event for unknown instance dropped");
            return;
        };
        let (id, frame, terminal) = match event {
            ServeEvent::Listen { port } => {
                channel.serve_ports.insert(port);
                info!(instance = name, port, "guest listening");
                return;
            }
            ServeEvent::Unlisten { port } => {
                channel.serve_ports.remove(&port);
                info!(instance = name, port, "guest stopped listening");
                return;
            }
            ServeEvent::ResponseHead {
                id,
                status,
                headers,
            } => (id, ServeFrame::Head { status, headers }, false),
            ServeEvent::Chunk { id, data } => (id, ServeFrame::Chunk(Bytes::from(data)), false),
            ServeEvent::End { id } => (id, ServeFrame::End, true),
            ServeEvent::Error { id, message } => (id, ServeFrame::Error(message), true),
        };

        let delivered = match channel.streams.get(&id) {
            Some(tx) => tx.send(frame).is_ok(),
            None => {
                warn!(instance = name, id, "serve frame for unknown response dropped");
                return;
            }
        };
        if terminal || !delivered {
            channel.streams.remove(&id);
        }
    }

    /// Forward one request and wait for its response head
    pub async fn dispatch(&self, request: HttpRequest) -> Result<ServeResponse, ServeError> {
        let (name, port, path) = parse_route(&self.prefix, &request.path)
            .ok_or_else(|| ServeError::NotRouted(request.path.clone()))?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = flume::unbounded();

        {
            let mut channel = self
                .channels
                .get_mut(&name)
                .ok_or_else(|| ServeError::UnknownInstance(name.clone()))?;
            if !channel.serve_ports.contains(&port) {
                return Err(ServeError::NotListening {
                    instance: name,
                    port,
                });
            }
            channel.streams.insert(id, tx);
            let sent = channel.port.send(&ToContext::Serve(ServeCommand::Request {
                id,
                port,
                method: request.method,
                path: path.clone(),
                headers: request.headers,
                body: request.body.to_vec(),
            }));
            if sent.is_err() {
                channel.streams.remove(&id);
                return Err(ServeError::Disposed);
            }
        }
        debug!(instance = %name, port, id, path = %path, "serve request forwarded");

        match rx.recv_async().await.map_err(|_| ServeError::Disposed)? {
            ServeFrame::Head { status, headers } => Ok(ServeResponse {
                status,
                headers,
                body: ServeBody::new(rx),
            }),
            ServeFrame::Error(message) => Err(ServeError::Handler(message)),
            ServeFrame::Chunk(_) | ServeFrame::End => {
                Err(ServeError::Protocol("body before response head".into()))
            }
        }
    }
}

impl Default for ServeRouter {
    fn default() -> Self {
        Self::new(DEFAULT_SERVE_PREFIX)
    }
}
