//! The source slot: a one-shot rendezvous cell between the streaming payload
//! loader and consumers of module sources.
//!
//! A slot is created `Pending` while the archive metadata is parsed, then
//! resolved exactly once by [`SourceSlot::set_ready`] when the corresponding
//! payload section arrives (or when the loader gives up). Readers either
//! [`get`](SourceSlot::get) the bytes (idempotent) or
//! [`take`](SourceSlot::take) them (first caller wins, the bytes are gone
//! afterwards). Waits are cancelable and never spin.

use std::pin::pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::ParseError;

/// Observable lifecycle state of a [`SourceSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Payload bytes have not arrived yet.
    Pending,
    /// Bytes (possibly none) are available.
    Ready,
    /// The bytes were taken; subsequent reads observe nothing.
    Taken,
}

enum State {
    Pending,
    Ready(Option<Arc<[u8]>>),
    Taken,
}

struct Inner {
    offset: u32,
    length: u32,
    state: Mutex<State>,
    notify: Notify,
}

/// A shared payload cell. Cloning yields another handle to the same cell.
#[derive(Clone)]
pub struct SourceSlot {
    inner: Arc<Inner>,
}

impl SourceSlot {
    fn with_state(offset: u32, length: u32, state: State) -> SourceSlot {
        SourceSlot {
            inner: Arc::new(Inner {
                offset,
                length,
                state: Mutex::new(state),
                notify: Notify::new(),
            }),
        }
    }

    /// A slot for an absent payload: immediately ready with no bytes.
    pub fn new_empty() -> SourceSlot {
        SourceSlot::with_state(0, 0, State::Ready(None))
    }

    /// A slot that is immediately ready with the given bytes.
    pub fn new_ready(bytes: impl Into<Arc<[u8]>>) -> SourceSlot {
        let bytes = bytes.into();
        let length = bytes.len().min(u32::MAX as usize) as u32;
        SourceSlot::with_state(0, length, State::Ready(Some(bytes)))
    }

    /// A slot awaiting the payload recorded at `(offset, length)` in the
    /// archive's payload section.
    pub fn new_pending(offset: u32, length: u32) -> SourceSlot {
        SourceSlot::with_state(offset, length, State::Pending)
    }

    /// Pending for a nonzero `(offset, length)` pair, empty otherwise.
    pub fn pending_or_empty(offset: u32, length: u32) -> SourceSlot {
        if offset == 0 && length == 0 {
            SourceSlot::new_empty()
        } else {
            SourceSlot::new_pending(offset, length)
        }
    }

    pub fn state(&self) -> SlotState {
        match *self.inner.state.lock() {
            State::Pending => SlotState::Pending,
            State::Ready(_) => SlotState::Ready,
            State::Taken => SlotState::Taken,
        }
    }

    /// Offset within the payload section, as recorded in the modules header.
    pub fn offset(&self) -> u32 {
        self.inner.offset
    }

    /// Payload length as recorded in the modules header.
    pub fn length(&self) -> u32 {
        self.inner.length
    }

    /// Resolve a pending slot and wake all waiters. Calls on a slot that is
    /// already `Ready` or `Taken` are ignored; the transition out of
    /// `Pending` happens at most once.
    pub fn set_ready(&self, bytes: Option<Arc<[u8]>>) {
        {
            let mut state = self.inner.state.lock();
            if !matches!(*state, State::Pending) {
                return;
            }
            *state = State::Ready(bytes);
        }
        self.inner.notify.notify_waiters();
    }

    /// Read the payload without consuming it.
    ///
    /// Returns the bytes once the slot is `Ready` (possibly `None` for an
    /// absent payload), `None` if they were already taken, and blocks while
    /// `Pending`. Cancellation resolves to [`ParseError::Canceled`] without
    /// disturbing the slot.
    pub async fn get(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<Arc<[u8]>>, ParseError> {
        loop {
            // Register before checking state so a concurrent set_ready
            // between the check and the await cannot be missed.
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();

            {
                let state = self.inner.state.lock();
                match &*state {
                    State::Pending => {}
                    State::Ready(bytes) => return Ok(bytes.clone()),
                    State::Taken => return Ok(None),
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = token.cancelled() => return Err(ParseError::Canceled),
            }
        }
    }

    /// Read the payload and consume it.
    ///
    /// The first take on a `Ready` slot transfers the bytes to the caller and
    /// moves the slot to `Taken`; every later `get` or `take` observes `None`.
    pub async fn take(
        &self,
        token: &CancellationToken,
    ) -> Result<Option<Arc<[u8]>>, ParseError> {
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                match &mut *state {
                    State::Pending => {}
                    State::Ready(bytes) => {
                        let bytes = bytes.take();
                        *state = State::Taken;
                        return Ok(bytes);
                    }
                    State::Taken => return Ok(None),
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = token.cancelled() => return Err(ParseError::Canceled),
            }
        }
    }

    /// Non-blocking read of whatever is currently stored.
    pub(crate) fn peek(&self) -> Option<Arc<[u8]>> {
        match &*self.inner.state.lock() {
            State::Ready(bytes) => bytes.clone(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for SourceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSlot")
            .field("state", &self.state())
            .field("offset", &self.inner.offset)
            .field("length", &self.inner.length)
            .finish()
    }
}
