/*!
 * Socket Calls over the Bridge
 * JSON request/reply pair the guest socket imports marshal through the
 * synchronous bridge, and the controller-side handler that serves them
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::proxy::SocketProxy;
use super::types::*;
use crate::bridge::{BridgeError, BridgeHandler, BridgeResult, RequestKind};
use crate::core::errors::Errno;
use crate::core::limits::{BRIDGE_PAYLOAD_CAPACITY, SOCKET_REPLY_OVERHEAD};
use crate::core::serde::base64_bytes;
use crate::core::types::SockFd;

/// One socket operation requested by a guest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SocketCall {
    Open {
        family: SocketFamily,
        kind: SocketKind,
    },
    Connect {
        fd: SockFd,
        host: String,
        port: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    Send {
        fd: SockFd,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    Flush {
        fd: SockFd,
    },
    Recv {
        fd: SockFd,
        max: usize,
    },
    Close {
        fd: SockFd,
    },
}

/// Result of a [`SocketCall`]
///
/// `value` carries the new descriptor for `open` and the byte count for
/// `send`; `data` carries received bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SocketReply {
    Ok {
        #[serde(default)]
        value: u64,
        #[serde(default, with = "base64_bytes")]
        data: Vec<u8>,
    },
    Err {
        errno: Errno,
    },
}

impl SocketReply {
    #[inline]
    pub fn ok(value: u64) -> Self {
        Self::Ok {
            value,
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn data(data: Vec<u8>) -> Self {
        Self::Ok {
            value: data.len() as u64,
            data,
        }
    }
}

impl From<SocketResult<SocketReply>> for SocketReply {
    fn from(result: SocketResult<SocketReply>) -> Self {
        result.unwrap_or_else(|err| SocketReply::Err { errno: err.errno() })
    }
}

/// Largest raw read whose base64 reply still fits `capacity`
#[inline]
pub fn max_recv_for(capacity: usize) -> usize {
    (capacity.saturating_sub(SOCKET_REPLY_OVERHEAD) / 4 * 3).max(1)
}

/// Bridge handler that runs socket calls against a proxy
///
/// Reads are capped so the encoded reply fits the mailbox; anything past
/// the cap stays queued for the next `recv`.
pub struct SocketBridge {
    proxy: Arc<dyn SocketProxy>,
    max_recv: usize,
}

impl SocketBridge {
    pub fn new(proxy: Arc<dyn SocketProxy>) -> Self {
        Self {
            proxy,
            max_recv: max_recv_for(BRIDGE_PAYLOAD_CAPACITY),
        }
    }

    /// Size reads for a mailbox of `capacity` bytes
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.max_recv = max_recv_for(capacity);
        self
    }

    #[inline]
    pub fn max_recv(&self) -> usize {
        self.max_recv
    }

    fn clamp_recv(&self, max: usize) -> usize {
        if max == 0 {
            self.max_recv
        } else {
            max.min(self.max_recv)
        }
    }

    pub async fn dispatch(&self, call: SocketCall) -> SocketReply {
        debug!(?call, "socket call");
        let result = match call {
            SocketCall::Open { family, kind } => Ok(SocketReply::ok(u64::from(self.proxy.open(family, kind)))),
            SocketCall::Connect {
                fd,
                host,
                port,
                url,
            } => self
                .proxy
                .connect(fd, &host, port, url.as_deref())
                .await
                .map(|_| SocketReply::ok(0)),
            SocketCall::Send { fd, data } => self
                .proxy
                .send(fd, &data)
                .map(|n| SocketReply::ok(n as u64)),
            SocketCall::Flush { fd } => self.proxy.flush(fd).await.map(|_| SocketReply::ok(0)),
            SocketCall::Recv { fd, max } => self
                .proxy
                .recv_wait(fd, self.clamp_recv(max))
                .await
                .map(|bytes| SocketReply::data(bytes.to_vec())),
            SocketCall::Close { fd } => {
                self.proxy.close(fd);
                Ok(SocketReply::ok(0))
            }
        };
        result.into()
    }
}

#[async_trait]
impl BridgeHandler for SocketBridge {
    async fn handle(&self, kind: i32, payload: Vec<u8>) -> BridgeResult<Vec<u8>> {
        match RequestKind::from_raw(kind) {
            Some(RequestKind::Socket) => {}
            Some(RequestKind::Ping) => return Ok(payload),
            None => {
                return Err(BridgeError::Handler(format!(
                    "unknown request kind {kind}"
                )))
            }
        }
        let call: SocketCall = serde_json::from_slice(&payload)
            .map_err(|err| BridgeError::Handler(format!("bad socket call: {err}")))?;
        let reply = self.dispatch(call).await;
        serde_json::to_vec(&reply).map_err(|err| BridgeError::Handler(err.to_string()))
    }
}
