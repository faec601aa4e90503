use crate::descriptor::HandlerDescriptor;
use crate::error::{NotBound, SubscriptionError};
use crate::event::Event;
use crate::expander::Expander;
use crate::handler::Subscriber;
use crate::post::Post;
use crate::shard::Shard;
use std::sync::Arc;

/// The simple public surface: an expander-backed bus without a registration
/// limit.
///
/// `Bus` is the assembly most callers want: register subscribers or
/// descriptors, `bind`, `post`. For a capacity-limited single dispatcher use
/// [`Shard`] directly; for asynchronous dispatch use
/// [`AsyncBus`](crate::async_bus::AsyncBus).
pub struct Bus {
    expander: Expander,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            expander: Expander::new(Shard::new()),
        }
    }

    /// A bus partitioning its handlers into shards of at most
    /// `max_per_shard` descriptors (clamped to `[1, MAX_METHODS]`).
    pub fn with_max_per_shard(max_per_shard: usize) -> Self {
        Self {
            expander: Expander::with_max_per_shard(Shard::new(), max_per_shard),
        }
    }

    /// Analyzes `subscriber` and registers every descriptor it declares.
    /// Returns the descriptors created; they take effect on the next
    /// [`bind`](Bus::bind).
    pub fn register<S: Subscriber>(
        &mut self,
        subscriber: &Arc<S>,
    ) -> Result<Vec<HandlerDescriptor>, SubscriptionError> {
        self.expander.register_subscriber(subscriber)
    }

    /// Registers a single descriptor.
    pub fn register_descriptor(&mut self, descriptor: HandlerDescriptor) {
        self.expander.register(descriptor);
    }

    /// Removes the subscriber's methods by target type and method name.
    pub fn unregister<S: Subscriber>(&mut self, subscriber: &Arc<S>) {
        self.expander.unregister_subscriber(subscriber);
    }

    /// Removes the first descriptor with the same registration.
    pub fn unregister_descriptor(&mut self, descriptor: &HandlerDescriptor) {
        self.expander.unregister(descriptor);
    }

    pub fn clear(&mut self) {
        self.expander.clear();
    }

    /// Builds the specialized dispatch plans. Required before the first
    /// `post` and after registry mutations.
    pub fn bind(&mut self) {
        self.expander.bind();
    }

    pub fn is_bound(&self) -> bool {
        self.expander.is_bound()
    }

    pub fn snapshot(&self) -> Vec<HandlerDescriptor> {
        self.expander.snapshot()
    }

    pub fn len(&self) -> usize {
        self.expander.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expander.is_empty()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Post for Bus {
    fn post<E: Event>(&self, event: E) -> Result<E, NotBound> {
        self.expander.post(event)
    }
}

impl Post for Shard {
    fn post<E: Event>(&self, event: E) -> Result<E, NotBound> {
        Shard::post(self, event)
    }
}

impl Post for Expander {
    fn post<E: Event>(&self, event: E) -> Result<E, NotBound> {
        Expander::post(self, event)
    }
}
