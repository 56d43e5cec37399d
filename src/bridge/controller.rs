/*!
 * Bridge Controller
 * Async side of the mailbox: picks up requests, runs the handler, replies
 */

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::mailbox::Mailbox;
use super::types::*;

/// Host-side handler for bridge requests
///
/// Errors are not sent to the guest; they become an empty response.
#[async_trait]
pub trait BridgeHandler: Send + Sync + 'static {
    async fn handle(&self, kind: i32, payload: Vec<u8>) -> BridgeResult<Vec<u8>>;
}

/// Controller-side end of a bridge
#[derive(Debug, Clone)]
pub struct BridgeController {
    mailbox: Arc<Mailbox>,
    poll_interval: Duration,
}

impl BridgeController {
    pub(super) fn new(mailbox: Arc<Mailbox>, poll_interval: Duration) -> Self {
        Self {
            mailbox,
            poll_interval,
        }
    }

    /// Answer the pending request, if there is one
    ///
    /// Returns whether a request was served.
    pub async fn poll_once<H: BridgeHandler + ?Sized>(&self, handler: &H) -> bool {
        let Some((kind, payload)) = self.mailbox.pending_request() else {
            return false;
        };
        debug!(kind, len = payload.len(), "bridge request received");

        let response = match handler.handle(kind, payload).await {
            Ok(bytes) if bytes.len() > self.mailbox.capacity() => {
                warn!(
                    kind,
                    size = bytes.len(),
                    capacity = self.mailbox.capacity(),
                    "bridge response too large, replying empty"
                );
                Vec::new()
            }
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(kind, error = %err, "bridge handler failed, replying empty");
                Vec::new()
            }
        };
        self.mailbox.respond(&response);
        true
    }

    /// Serve requests until the bridge is closed
    pub async fn run<H: BridgeHandler + ?Sized>(self, handler: Arc<H>) {
        info!("bridge controller started");
        while !self.mailbox.is_closed() {
            if self.poll_once(handler.as_ref()).await {
                continue;
            }
            tokio::select! {
                _ = self.mailbox.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("bridge controller stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime
    pub fn spawn<H: BridgeHandler + ?Sized>(self, handler: Arc<H>) -> JoinHandle<()> {
        tokio::spawn(self.run(handler))
    }

    pub fn close(&self) {
        self.mailbox.close();
    }
}

/// Handler that echoes pings and fails everything else
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

#[async_trait]
impl BridgeHandler for EchoHandler {
    async fn handle(&self, kind: i32, payload: Vec<u8>) -> BridgeResult<Vec<u8>> {
        match RequestKind::from_raw(kind) {
            Some(RequestKind::Ping) => Ok(payload),
            _ => Err(BridgeError::Handler(format!("unsupported request kind {kind}"))),
        }
    }
}
