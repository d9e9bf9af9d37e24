//! # Event Emission
//!
//! The original system used a framework signal/slot bus. Here each
//! producer (a source, the scheduler) owns a small typed sink handed in
//! at construction — no global event loop, no inheritance. A sink can
//! either collect synchronously (handlers run on the producing thread)
//! or forward onto a bounded channel for a cross-thread consumer.
//!
//! Consumers must not perform unbounded work in a synchronous handler —
//! that's on the producing thread's hot path.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Receives events of type `E` from a single producer. Implementations
/// must be cheap to call from the hot path.
pub trait EventSink<E>: Send + Sync {
    fn emit(&self, event: E);
}

/// Lets an `Arc<VecSink<E>>` (or any shared sink) be handed to a
/// component that takes ownership of a `Box<dyn EventSink<E>>`, while
/// the caller keeps its own handle to inspect events later.
impl<E, T: EventSink<E> + ?Sized> EventSink<E> for Arc<T> {
    fn emit(&self, event: E) {
        (**self).emit(event)
    }
}

/// Collects events into an in-process `Vec`, draining them for
/// inspection. Intended for tests and synchronous embeddings.
pub struct VecSink<E> {
    events: Mutex<Vec<E>>,
}

impl<E> Default for VecSink<E> {
    fn default() -> Self {
        VecSink {
            events: Mutex::new(Vec::new()),
        }
    }
}

impl<E> VecSink<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return all events collected so far.
    pub fn drain(&self) -> Vec<E> {
        let mut guard = self.events.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Send> EventSink<E> for VecSink<E> {
    fn emit(&self, event: E) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// Forwards events onto a bounded `crossbeam_channel` for a consumer on
/// another thread. A full channel drops the event and logs a warning —
/// emission must never block the producing thread.
pub struct ChannelSink<E> {
    tx: Sender<E>,
}

impl<E> ChannelSink<E> {
    /// Create a bound channel pair; returns the sink and the receiver
    /// side for the consumer.
    pub fn bounded(capacity: usize) -> (Self, Receiver<E>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (ChannelSink { tx }, rx)
    }
}

impl<E: Send> EventSink<E> for ChannelSink<E> {
    fn emit(&self, event: E) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("event channel disconnected, dropping event");
            }
        }
    }
}

/// A sink that discards everything. Useful as a default when the
/// caller doesn't care about a component's events.
pub struct NullSink;

impl<E> EventSink<E> for NullSink {
    fn emit(&self, _event: E) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_collects_and_drains() {
        let sink: VecSink<u32> = VecSink::new();
        sink.emit(1);
        sink.emit(2);
        assert_eq!(sink.len(), 2);
        let drained = sink.drain();
        assert_eq!(drained, vec![1, 2]);
        assert!(sink.is_empty());
    }

    #[test]
    fn channel_sink_delivers() {
        let (sink, rx) = ChannelSink::bounded(4);
        sink.emit("hello");
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn channel_sink_drops_when_full() {
        let (sink, rx) = ChannelSink::bounded(1);
        sink.emit(1);
        sink.emit(2); // dropped, channel full
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn null_sink_discards() {
        let sink = NullSink;
        sink.emit(42);
    }
}
