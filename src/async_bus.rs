use crate::descriptor::HandlerDescriptor;
use crate::error::{CapacityExceeded, NotBound, RegisterError};
use crate::event::Event;
use crate::feedback::Feedback;
use crate::handler::Subscriber;
use crate::plan::Plan;
use crate::post::Drain;
use crate::shard::Shard;
use crate::wait_group::WaitGroup;
use crate::worker::{FeedbackSlot, QueuedEvent, SharedReceiver, Worker};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Admission bound of the async event queue; a post waits when it is full.
pub const QUEUE_CAPACITY: usize = 1024;

/// Asynchronous variant of the bus: posting enqueues the event for a pool
/// of worker tasks.
///
/// Registration and binding work like a [`Shard`]; each bind publishes an
/// immutable plan snapshot that every worker picks up atomically before its
/// next dispatch. Posting transfers ownership of the event into the queue;
/// the processed event is observable through the feedback hook, which runs
/// serialized across workers.
pub struct AsyncBus {
    shard: Shard,
    threads: usize,
    manual: bool,
    plan_tx: watch::Sender<Option<Arc<Plan>>>,
    queue_tx: mpsc::Sender<QueuedEvent>,
    queue_rx: SharedReceiver,
    wake: Arc<Notify>,
    feedback: FeedbackSlot,
    cancel: CancellationToken,
    workers: WaitGroup,
    in_flight: WaitGroup,
    running: bool,
}

impl AsyncBus {
    /// A bus whose workers park when idle and are woken by posts.
    pub fn new(threads: usize) -> Self {
        Self::build(threads, false, Arc::new(Mutex::new(None)))
    }

    /// A bus with manual worker management: workers never park and
    /// spin-check the queue until stopped.
    pub fn new_manual(threads: usize) -> Self {
        Self::build(threads, true, Arc::new(Mutex::new(None)))
    }

    fn build(threads: usize, manual: bool, feedback: FeedbackSlot) -> Self {
        assert!(threads > 0, "worker count must be greater than zero");
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (plan_tx, _) = watch::channel(None);
        Self {
            shard: Shard::new(),
            threads,
            manual,
            plan_tx,
            queue_tx,
            queue_rx: Arc::new(tokio::sync::Mutex::new(queue_rx)),
            wake: Arc::new(Notify::new()),
            feedback,
            cancel: CancellationToken::new(),
            workers: WaitGroup::default(),
            in_flight: WaitGroup::default(),
            running: false,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn has_manual_management(&self) -> bool {
        self.manual
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn register(&mut self, descriptor: HandlerDescriptor) -> Result<(), CapacityExceeded> {
        self.shard.register(descriptor)
    }

    pub fn register_subscriber<S: Subscriber>(
        &mut self,
        subscriber: &Arc<S>,
    ) -> Result<Vec<HandlerDescriptor>, RegisterError> {
        self.shard.register_subscriber(subscriber)
    }

    pub fn unregister(&mut self, descriptor: &HandlerDescriptor) {
        self.shard.unregister(descriptor);
    }

    pub fn unregister_subscriber<S: Subscriber>(&mut self, subscriber: &Arc<S>) {
        self.shard.unregister_subscriber(subscriber);
    }

    pub fn clear(&mut self) {
        self.shard.clear();
    }

    pub fn snapshot(&self) -> Vec<HandlerDescriptor> {
        self.shard.snapshot()
    }

    /// Binds the registry and publishes the new plan snapshot to every
    /// worker.
    pub fn bind(&mut self) {
        self.shard.bind();
        self.plan_tx.send_replace(self.shard.plan());
    }

    pub fn is_bound(&self) -> bool {
        self.shard.is_bound()
    }

    /// Sets the feedback hook invoked with each processed event. The slot
    /// is shared with buses created through [`copy_bus`](Self::copy_bus).
    pub fn set_feedback(&mut self, feedback: impl Feedback) -> &mut Self {
        let mut slot = self.feedback.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Box::new(feedback));
        drop(slot);
        self
    }

    /// Enqueues `event` and wakes parked workers. Waits only for queue
    /// admission; the call returns before the event is dispatched.
    pub async fn post<E: Event>(&self, event: E) -> Result<(), NotBound> {
        if self.plan_tx.borrow().is_none() {
            return Err(NotBound);
        }
        let queued = QueuedEvent {
            event: Box::new(event),
            _guard: self.in_flight.add(),
        };
        // The receiver lives as long as the bus, so the queue cannot close
        // under us; a failed send only drops the event during teardown.
        let _ = self.queue_tx.send(queued).await;
        self.wake.notify_waiters();
        Ok(())
    }

    /// Spawns the worker tasks. Must be called within a tokio runtime.
    pub fn start_workers(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        for _ in 0..self.threads {
            let worker = Worker {
                rx: Arc::clone(&self.queue_rx),
                plan_rx: self.plan_tx.subscribe(),
                wake: Arc::clone(&self.wake),
                feedback: Arc::clone(&self.feedback),
                cancel: self.cancel.clone(),
                manual: self.manual,
                _guard: self.workers.add(),
            };
            tokio::spawn(worker.run());
        }
        tracing::debug!(workers = self.threads, manual = self.manual, "workers started");
    }

    /// Stops all workers and discards events still queued. After this
    /// returns no further dispatch occurs; `start_workers` may be called
    /// again.
    pub async fn stop_workers(&mut self) {
        if self.running {
            self.cancel.cancel();
            self.wake.notify_waiters();
            self.workers.wait().await;
            self.cancel = CancellationToken::new();
            self.running = false;
        }
        let mut rx = self.queue_rx.lock().await;
        while rx.try_recv().is_ok() {}
        tracing::debug!("workers stopped");
    }

    /// A fresh bus with the same configuration and fresh workers. The
    /// feedback slot is shared, so feedback stays serialized across copies.
    pub fn copy_bus(&self) -> AsyncBus {
        Self::build(self.threads, self.manual, Arc::clone(&self.feedback))
    }
}

impl Drain for AsyncBus {
    /// Waits until every posted event has been dispatched (feedback
    /// included), then stops the workers.
    async fn drain(mut self) {
        self.in_flight.wait().await;
        self.stop_workers().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextChain;
    use crate::feedback;
    use crate::handler::Handler;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[derive(Default)]
    struct Job {
        chain: ContextChain,
    }

    impl Event for Job {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn contexts(&self) -> &ContextChain {
            &self.chain
        }

        fn contexts_mut(&mut self) -> &mut ContextChain {
            &mut self.chain
        }
    }

    #[derive(Default)]
    struct Counting {
        seen: AtomicUsize,
    }

    impl Counting {
        fn on_job(&self, _event: &mut Job) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Handler for Counting {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn counting_descriptor(handler: &Arc<Counting>) -> HandlerDescriptor {
        HandlerDescriptor::of("on_job", Arc::clone(handler), Counting::on_job)
            .build()
            .unwrap()
    }

    async fn wait_until(check: impl Fn() -> bool) {
        timeout(Duration::from_secs(5), async {
            while !check() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn post_before_bind_fails_loudly() {
        let bus = AsyncBus::new(1);
        assert_eq!(bus.post(Job::default()).await.err(), Some(NotBound));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_workers_process_all_events_and_feedback_is_serialized() {
        let handler = Arc::new(Counting::default());
        let feedback_calls = Arc::new(AtomicUsize::new(0));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicUsize::new(0));

        let mut bus = AsyncBus::new(2);
        bus.register(counting_descriptor(&handler)).unwrap();
        bus.bind();

        let calls = Arc::clone(&feedback_calls);
        let active = Arc::clone(&concurrent);
        let clashes = Arc::clone(&overlapped);
        bus.set_feedback(feedback::from_fn(move |_event| {
            if active.fetch_add(1, Ordering::SeqCst) != 0 {
                clashes.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_micros(100));
            active.fetch_sub(1, Ordering::SeqCst);
            calls.fetch_add(1, Ordering::SeqCst);
        }));
        bus.start_workers();

        for _ in 0..100 {
            bus.post(Job::default()).await.unwrap();
        }

        wait_until(|| feedback_calls.load(Ordering::SeqCst) == 100).await;
        assert_eq!(handler.seen.load(Ordering::SeqCst), 100);
        assert_eq!(overlapped.load(Ordering::SeqCst), 0);

        bus.stop_workers().await;
    }

    #[tokio::test]
    async fn stop_discards_queued_events() {
        let handler = Arc::new(Counting::default());
        let mut bus = AsyncBus::new(1);
        bus.register(counting_descriptor(&handler)).unwrap();
        bus.bind();

        // No workers running: the events stay queued and are discarded.
        for _ in 0..3 {
            bus.post(Job::default()).await.unwrap();
        }
        bus.stop_workers().await;

        bus.start_workers();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(handler.seen.load(Ordering::SeqCst), 0);
        bus.stop_workers().await;
    }

    #[tokio::test]
    async fn rebind_publishes_a_new_snapshot_to_workers() {
        let first = Arc::new(Counting::default());
        let second = Arc::new(Counting::default());

        let mut bus = AsyncBus::new(1);
        bus.register(counting_descriptor(&first)).unwrap();
        bus.bind();
        bus.start_workers();

        bus.post(Job::default()).await.unwrap();
        wait_until(|| first.seen.load(Ordering::SeqCst) == 1).await;
        assert_eq!(second.seen.load(Ordering::SeqCst), 0);

        bus.register(counting_descriptor(&second)).unwrap();
        bus.bind();
        bus.post(Job::default()).await.unwrap();
        wait_until(|| second.seen.load(Ordering::SeqCst) == 1).await;
        assert_eq!(first.seen.load(Ordering::SeqCst), 2);

        bus.stop_workers().await;
    }

    #[tokio::test]
    async fn manual_management_dispatches_without_parking() {
        let handler = Arc::new(Counting::default());
        let mut bus = AsyncBus::new_manual(1);
        assert!(bus.has_manual_management());
        bus.register(counting_descriptor(&handler)).unwrap();
        bus.bind();
        bus.start_workers();

        bus.post(Job::default()).await.unwrap();
        wait_until(|| handler.seen.load(Ordering::SeqCst) == 1).await;

        bus.stop_workers().await;
    }

    #[tokio::test]
    async fn parked_worker_wakes_on_post() {
        let handler = Arc::new(Counting::default());
        let mut bus = AsyncBus::new(1);
        bus.register(counting_descriptor(&handler)).unwrap();
        bus.bind();
        bus.start_workers();

        // Let the worker go idle past the sleep delay, then post.
        sleep(crate::worker::THREAD_SLEEP_DELAY + Duration::from_millis(200)).await;
        bus.post(Job::default()).await.unwrap();
        wait_until(|| handler.seen.load(Ordering::SeqCst) == 1).await;

        bus.stop_workers().await;
    }

    #[tokio::test]
    async fn drain_waits_for_the_queue_to_empty() {
        let handler = Arc::new(Counting::default());
        let mut bus = AsyncBus::new(2);
        bus.register(counting_descriptor(&handler)).unwrap();
        bus.bind();
        bus.start_workers();

        for _ in 0..50 {
            bus.post(Job::default()).await.unwrap();
        }
        bus.drain().await;

        assert_eq!(handler.seen.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn copy_bus_repeats_the_configuration() {
        let bus = AsyncBus::new_manual(3);
        let copy = bus.copy_bus();
        assert_eq!(copy.threads(), 3);
        assert!(copy.has_manual_management());
        assert!(!copy.is_bound());
        assert!(copy.snapshot().is_empty());
    }
}
