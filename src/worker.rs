use crate::event::Event;
use crate::feedback::Feedback;
use crate::plan::Plan;
use crate::wait_group::GroupGuard;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Notify, mpsc, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// How long a worker stays on the queue before parking. A post wakes all
/// parked workers.
pub const THREAD_SLEEP_DELAY: Duration = Duration::from_millis(1000);

/// An event travelling through the async queue. The guard keeps the bus's
/// in-flight count accurate until dispatch and feedback have finished.
pub(crate) struct QueuedEvent {
    pub(crate) event: Box<dyn Event>,
    pub(crate) _guard: GroupGuard,
}

pub(crate) type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedEvent>>>;
pub(crate) type FeedbackSlot = Arc<Mutex<Option<Box<dyn Feedback>>>>;

/// One dispatch task of an [`AsyncBus`](crate::async_bus::AsyncBus).
///
/// Takes one event at a time from the shared queue, dispatches it through
/// the latest bound plan, then runs the serialized feedback hook. In manual
/// management mode the worker spin-checks the queue instead of parking.
pub(crate) struct Worker {
    pub(crate) rx: SharedReceiver,
    pub(crate) plan_rx: watch::Receiver<Option<Arc<Plan>>>,
    pub(crate) wake: Arc<Notify>,
    pub(crate) feedback: FeedbackSlot,
    pub(crate) cancel: CancellationToken,
    pub(crate) manual: bool,
    pub(crate) _guard: GroupGuard,
}

impl Worker {
    pub(crate) async fn run(mut self) {
        tracing::trace!(manual = self.manual, "worker started");
        loop {
            let next = if self.manual {
                self.take_spinning().await
            } else {
                self.take_or_park().await
            };
            let Some(mut queued) = next else {
                break;
            };

            let plan = self.plan_rx.borrow_and_update().clone();
            if let Some(plan) = plan {
                plan.dispatch(queued.event.as_mut());
            }

            let mut slot = self
                .feedback
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(callback) = slot.as_mut() {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    callback.handle_feedback(queued.event.as_mut());
                }));
                if outcome.is_err() {
                    tracing::error!("feedback handler panicked");
                }
            }
        }
        tracing::trace!("worker stopped");
    }

    /// Waits on the queue, parking after [`THREAD_SLEEP_DELAY`] of idleness
    /// so an idle pool does not hold the queue lock. Returns `None` on
    /// shutdown or when the queue closes.
    async fn take_or_park(&self) -> Option<QueuedEvent> {
        loop {
            {
                let mut rx = tokio::select! {
                    _ = self.cancel.cancelled() => return None,
                    guard = self.rx.lock() => guard,
                };
                tokio::select! {
                    _ = self.cancel.cancelled() => return None,
                    taken = timeout(THREAD_SLEEP_DELAY, rx.recv()) => match taken {
                        Ok(item) => return item,
                        Err(_idle) => {}
                    },
                }
            }
            // Register for the wake-up before re-checking the queue, so a
            // post between the timeout and the park is never lost.
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Ok(mut rx) = self.rx.try_lock() {
                if let Ok(item) = rx.try_recv() {
                    return Some(item);
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = self.cancel.cancelled() => return None,
            }
        }
    }

    /// Manual management: no parking, spin-check the queue until stopped.
    async fn take_spinning(&self) -> Option<QueuedEvent> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            if let Ok(mut rx) = self.rx.try_lock() {
                match rx.try_recv() {
                    Ok(item) => return Some(item),
                    Err(TryRecvError::Disconnected) => return None,
                    Err(TryRecvError::Empty) => {}
                }
            }
            tokio::task::yield_now().await;
        }
    }
}
