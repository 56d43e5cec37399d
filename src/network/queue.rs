/*!
 * Chunk Queue
 * FIFO of discrete byte chunks with partial-read support
 */

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

/// Receive queue shared by sockets and streamed serve bodies
///
/// Each pushed chunk stays a separate entry. A read that asks for less
/// than the front chunk holds splits it and leaves the remainder in front,
/// so the bytes handed out across reads always total what was pushed.
#[derive(Debug, Default, Clone)]
pub struct ChunkQueue {
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Pop at most `max` bytes from the front chunk
    ///
    /// Never spans chunks: a read ends at a chunk boundary even if more
    /// bytes are queued.
    pub fn pop(&mut self, max: usize) -> Option<Bytes> {
        if max == 0 {
            return None;
        }
        let front = self.chunks.front_mut()?;
        let out = if front.len() <= max {
            self.chunks.pop_front()?
        } else {
            front.split_to(max)
        };
        self.len -= out.len();
        Some(out)
    }

    /// Drain everything into one buffer
    pub fn drain_all(&mut self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.len);
        for chunk in self.chunks.drain(..) {
            out.extend_from_slice(&chunk);
        }
        self.len = 0;
        out.freeze()
    }

    /// Total queued bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of discrete chunks
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }
}
