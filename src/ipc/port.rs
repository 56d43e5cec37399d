/*!
 * Message Ports
 *
 * One end of a bidirectional, ordered channel between two contexts. Frames
 * travel as JSON strings so nothing but plain data crosses; a frame the
 * receiver cannot decode is logged and skipped.
 */

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use super::messages::ProtocolError;

/// Longest frame prefix quoted in a dropped-frame warning
const FRAME_PREVIEW: usize = 120;

/// Decode one frame, logging and discarding it when it does not parse
pub fn decode_frame<T: DeserializeOwned>(frame: &str) -> Option<T> {
    match serde_json::from_str(frame) {
        Ok(message) => Some(message),
        Err(err) => {
            let preview: String = frame.chars().take(FRAME_PREVIEW).collect();
            warn!(error = %err, frame = %preview, "dropping undecodable message");
            None
        }
    }
}

fn encode_frame<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(|err| ProtocolError::Encode(err.to_string()))
}

/// Receives `In`, sends `Out`
#[derive(Debug)]
pub struct Port<In, Out> {
    tx: flume::Sender<String>,
    rx: flume::Receiver<String>,
    _marker: PhantomData<fn() -> (In, Out)>,
}

/// Connected pair: what one side sends, the other receives
pub fn channel<A, B>() -> (Port<A, B>, Port<B, A>) {
    let (a_tx, a_rx) = flume::unbounded();
    let (b_tx, b_rx) = flume::unbounded();
    (
        Port {
            tx: b_tx,
            rx: a_rx,
            _marker: PhantomData,
        },
        Port {
            tx: a_tx,
            rx: b_rx,
            _marker: PhantomData,
        },
    )
}

impl<In, Out> Port<In, Out>
where
    In: DeserializeOwned,
    Out: Serialize,
{
    pub fn send(&self, message: &Out) -> Result<(), ProtocolError> {
        let frame = encode_frame(message)?;
        self.send_raw(frame)
    }

    /// Push an already-encoded frame
    pub fn send_raw(&self, frame: String) -> Result<(), ProtocolError> {
        trace!(len = frame.len(), "port send");
        self.tx.send(frame).map_err(|_| ProtocolError::Disconnected)
    }

    /// Block until the next decodable message
    pub fn recv(&self) -> Result<In, ProtocolError> {
        loop {
            let frame = self.rx.recv().map_err(|_| ProtocolError::Disconnected)?;
            if let Some(message) = decode_frame(&frame) {
                return Ok(message);
            }
        }
    }

    pub async fn recv_async(&self) -> Result<In, ProtocolError> {
        loop {
            let frame = self
                .rx
                .recv_async()
                .await
                .map_err(|_| ProtocolError::Disconnected)?;
            if let Some(message) = decode_frame(&frame) {
                return Ok(message);
            }
        }
    }

    /// Next decodable message already queued, if any
    pub fn try_recv(&self) -> Result<Option<In>, ProtocolError> {
        loop {
            match self.rx.try_recv() {
                Ok(frame) => {
                    if let Some(message) = decode_frame(&frame) {
                        return Ok(Some(message));
                    }
                }
                Err(flume::TryRecvError::Empty) => return Ok(None),
                Err(flume::TryRecvError::Disconnected) => return Err(ProtocolError::Disconnected),
            }
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<In, ProtocolError> {
        let deadline = Instant::now() + timeout;
        loop {
            let frame = self.rx.recv_deadline(deadline).map_err(|err| match err {
                flume::RecvTimeoutError::Timeout => ProtocolError::Timeout,
                flume::RecvTimeoutError::Disconnected => ProtocolError::Disconnected,
            })?;
            if let Some(message) = decode_frame(&frame) {
                return Ok(message);
            }
        }
    }

    /// Cloneable send half
    pub fn sender(&self) -> PortSender<Out> {
        PortSender {
            tx: self.tx.clone(),
            _marker: PhantomData,
        }
    }

    /// Whether the peer dropped its receiving end
    pub fn is_disconnected(&self) -> bool {
        self.tx.is_disconnected()
    }

    /// Split into a send half and a receiver that owns the rest of the stream
    pub fn split(self) -> (PortSender<Out>, PortReceiver<In>) {
        (
            PortSender {
                tx: self.tx,
                _marker: PhantomData,
            },
            PortReceiver {
                rx: self.rx,
                _marker: PhantomData,
            },
        )
    }
}

/// Send half of a [`Port`]
#[derive(Debug)]
pub struct PortSender<Out> {
    tx: flume::Sender<String>,
    _marker: PhantomData<fn() -> Out>,
}

impl<Out> Clone for PortSender<Out> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Out: Serialize> PortSender<Out> {
    pub fn send(&self, message: &Out) -> Result<(), ProtocolError> {
        let frame = encode_frame(message)?;
        self.tx.send(frame).map_err(|_| ProtocolError::Disconnected)
    }

    pub fn is_disconnected(&self) -> bool {
        self.tx.is_disconnected()
    }
}

/// Receive half of a [`Port`]
#[derive(Debug)]
pub struct PortReceiver<In> {
    rx: flume::Receiver<String>,
    _marker: PhantomData<fn() -> In>,
}

impl<In: DeserializeOwned> PortReceiver<In> {
    pub fn recv(&self) -> Result<In, ProtocolError> {
        loop {
            let frame = self.rx.recv().map_err(|_| ProtocolError::Disconnected)?;
            if let Some(message) = decode_frame(&frame) {
                return Ok(message);
            }
        }
    }

    pub async fn recv_async(&self) -> Result<In, ProtocolError> {
        loop {
            let frame = self
                .rx
                .recv_async()
                .await
                .map_err(|_| ProtocolError::Disconnected)?;
            if let Some(message) = decode_frame(&frame) {
                return Ok(message);
            }
        }
    }
}
