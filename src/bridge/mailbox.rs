/*!
 * Mailbox
 *
 * The one region shared between a guest context and its controller: a
 * lock word, a request-type word, a length word and a fixed payload area.
 * Requests and responses use the same payload area; the lock word says
 * whose turn it is.
 *
 * # Waiting
 *
 * The guest blocks with `parking_lot_core::park` keyed on the address of
 * the lock word and is woken by `unpark_all` on the same address, which is
 * the futex wait/notify pair without the platform syscall. The controller
 * side is async and is nudged through a `tokio::sync::Notify`, with a
 * short poll as the fallback.
 */

use parking_lot::Mutex;
use parking_lot_core::{park, unpark_all, ParkResult, ParkToken, DEFAULT_UNPARK_TOKEN};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::time::Instant;
use tokio::sync::Notify;

use super::types::*;

pub struct Mailbox {
    lock: AtomicI32,
    request_type: AtomicI32,
    length: AtomicU32,
    payload: Mutex<Box<[u8]>>,
    in_flight: AtomicBool,
    closed: AtomicBool,
    wake: Notify,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            lock: AtomicI32::new(LOCK_IDLE),
            request_type: AtomicI32::new(0),
            length: AtomicU32::new(0),
            payload: Mutex::new(vec![0u8; capacity].into_boxed_slice()),
            in_flight: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.payload.lock().len()
    }

    #[inline]
    pub fn lock_state(&self) -> i32 {
        self.lock.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[inline]
    fn park_key(&self) -> usize {
        &self.lock as *const AtomicI32 as usize
    }

    /// Claim the mailbox for one call
    pub(super) fn acquire(&self) -> BridgeResult<()> {
        if self.is_closed() {
            return Err(BridgeError::Closed);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BridgeError::Busy);
        }
        // A previous call that timed out may still be awaiting its response
        if self.lock_state() == LOCK_PENDING {
            self.in_flight.store(false, Ordering::Release);
            return Err(BridgeError::Busy);
        }
        Ok(())
    }

    pub(super) fn release(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    /// Publish a request and wake the controller
    pub(super) fn post(&self, kind: i32, payload: &[u8]) -> BridgeResult<()> {
        {
            let mut area = self.payload.lock();
            if payload.len() > area.len() {
                return Err(BridgeError::PayloadTooLarge {
                    size: payload.len(),
                    capacity: area.len(),
                });
            }
            area[..payload.len()].copy_from_slice(payload);
        }
        self.request_type.store(kind, Ordering::Relaxed);
        self.length.store(payload.len() as u32, Ordering::Relaxed);
        self.lock.store(LOCK_PENDING, Ordering::Release);
        self.wake.notify_one();
        Ok(())
    }

    /// Block the calling thread until the lock word leaves PENDING
    ///
    /// Returns false when the deadline passed first.
    pub(super) fn wait_idle(&self, deadline: Option<Instant>) -> BridgeResult<bool> {
        loop {
            if self.is_closed() {
                return Err(BridgeError::Closed);
            }
            if self.lock_state() != LOCK_PENDING {
                return Ok(true);
            }
            // SAFETY: the key is the address of a field of `self`, which
            // outlives the park; the validate closure does not panic and
            // does not call back into parking_lot.
            let result = unsafe {
                park(
                    self.park_key(),
                    || self.lock_state() == LOCK_PENDING && !self.is_closed(),
                    || {},
                    |_, _| {},
                    ParkToken(0),
                    deadline,
                )
            };
            if let ParkResult::TimedOut = result {
                return Ok(self.lock_state() != LOCK_PENDING);
            }
        }
    }

    /// Copy out the response written by the controller
    pub(super) fn take_response(&self) -> Vec<u8> {
        let len = self.length.load(Ordering::Acquire) as usize;
        let area = self.payload.lock();
        area[..len.min(area.len())].to_vec()
    }

    /// Controller side: the pending request, if any
    pub(super) fn pending_request(&self) -> Option<(i32, Vec<u8>)> {
        if self.lock_state() != LOCK_PENDING {
            return None;
        }
        let kind = self.request_type.load(Ordering::Relaxed);
        let len = self.length.load(Ordering::Relaxed) as usize;
        let area = self.payload.lock();
        Some((kind, area[..len.min(area.len())].to_vec()))
    }

    /// Controller side: write the response, flip the lock word, wake the guest
    ///
    /// A response that does not fit is replaced by an empty one.
    pub(super) fn respond(&self, response: &[u8]) {
        {
            let mut area = self.payload.lock();
            let len = if response.len() > area.len() {
                0
            } else {
                area[..response.len()].copy_from_slice(response);
                response.len()
            };
            self.length.store(len as u32, Ordering::Relaxed);
        }
        self.lock.store(LOCK_IDLE, Ordering::Release);
        self.wake_guest();
    }

    /// Controller side: wait for a request or the poll interval
    pub(super) async fn notified(&self) {
        self.wake.notified().await
    }

    /// Mark the mailbox closed and wake everyone
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake_guest();
        self.wake.notify_one();
    }

    fn wake_guest(&self) {
        // SAFETY: unpark_all only uses the key for lookup
        unsafe {
            unpark_all(self.park_key(), DEFAULT_UNPARK_TOKEN);
        }
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("lock", &self.lock_state())
            .field("length", &self.length.load(Ordering::Relaxed))
            .field("closed", &self.is_closed())
            .finish()
    }
}
