//! # `spawn` convenience
//!
//! Wraps a plain callable as a task and hands back a [`TaskHandle`]
//! that resolves once a worker has run it — the `spawn(fn) -> Future<R>`
//! convenience spec.md §4.4 calls for, without pulling in an async
//! runtime the rest of the workspace doesn't use. `TaskHandle`
//! implements `std::future::Future` so it composes with any executor a
//! downstream consumer happens to run, but it can also just be
//! blocked on directly via [`TaskHandle::join`].

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};

/// The task's closure panicked instead of returning a value. Carries no
/// payload beyond that fact — the worker has already logged the panic
/// with its id (spec.md §4.3 exception discipline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("spawned task panicked")]
pub struct TaskPanicked;

enum Slot<R> {
    Pending(Option<Waker>),
    Ready(Result<R, TaskPanicked>),
}

struct Shared<R> {
    slot: Mutex<Slot<R>>,
    done: Condvar,
}

/// A handle to a single spawned task's eventual result. Not `Clone` —
/// at-most-once execution means there is exactly one consumer of the
/// result.
pub struct TaskHandle<R> {
    shared: Arc<Shared<R>>,
}

/// The other half, handed to the worker-executed closure to fill in
/// the result. If dropped without [`TaskCompletion::complete`] ever
/// being called — the task was never submitted, or the scheduler
/// discarded it at shutdown — the handle still resolves, as
/// [`TaskPanicked`], rather than hanging `join()`/`poll()` forever.
pub(crate) struct TaskCompletion<R> {
    shared: Arc<Shared<R>>,
    completed: bool,
}

pub(crate) fn pair<R>() -> (TaskHandle<R>, TaskCompletion<R>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending(None)),
        done: Condvar::new(),
    });
    (
        TaskHandle { shared: shared.clone() },
        TaskCompletion { shared, completed: false },
    )
}

impl<R> TaskCompletion<R> {
    pub(crate) fn complete(mut self, result: Result<R, TaskPanicked>) {
        self.completed = true;
        Self::finish(&self.shared, result);
    }

    fn finish(shared: &Arc<Shared<R>>, result: Result<R, TaskPanicked>) {
        let mut slot = shared.slot.lock().unwrap_or_else(|e| e.into_inner());
        let waker = match std::mem::replace(&mut *slot, Slot::Ready(result)) {
            Slot::Pending(waker) => waker,
            Slot::Ready(_) => unreachable!("a task completes exactly once"),
        };
        drop(slot);
        shared.done.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<R> Drop for TaskCompletion<R> {
    fn drop(&mut self) {
        if !self.completed {
            Self::finish(&self.shared, Err(TaskPanicked));
        }
    }
}

impl<R> TaskHandle<R> {
    /// Blocks the calling thread until the task completes.
    pub fn join(self) -> Result<R, TaskPanicked> {
        let mut slot = self.shared.slot.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match &*slot {
                Slot::Ready(_) => break,
                Slot::Pending(_) => {
                    slot = self.shared.done.wait(slot).unwrap_or_else(|e| e.into_inner());
                }
            }
        }
        match std::mem::replace(&mut *slot, Slot::Ready(Err(TaskPanicked))) {
            Slot::Ready(result) => result,
            Slot::Pending(_) => unreachable!(),
        }
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Result<R, TaskPanicked>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.shared.slot.lock().unwrap_or_else(|e| e.into_inner());
        match &*slot {
            Slot::Ready(_) => {}
            Slot::Pending(_) => {
                *slot = Slot::Pending(Some(cx.waker().clone()));
                return Poll::Pending;
            }
        }
        match std::mem::replace(&mut *slot, Slot::Ready(Err(TaskPanicked))) {
            Slot::Ready(result) => Poll::Ready(result),
            Slot::Pending(_) => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_returns_the_completed_value() {
        let (handle, completion) = pair::<u32>();
        std::thread::spawn(move || completion.complete(Ok(42)));
        assert_eq!(handle.join(), Ok(42));
    }

    #[test]
    fn join_propagates_a_panic_as_an_error() {
        let (handle, completion) = pair::<u32>();
        completion.complete(Err(TaskPanicked));
        assert_eq!(handle.join(), Err(TaskPanicked));
    }

    #[test]
    fn dropping_the_completion_unblocks_join_as_an_error() {
        let (handle, completion) = pair::<u32>();
        drop(completion);
        assert_eq!(handle.join(), Err(TaskPanicked));
    }
}
