use crate::descriptor::HandlerDescriptor;
use crate::error::{NotBound, SubscriptionError};
use crate::event::Event;
use crate::handler::{Subscriber, analyze};
use crate::shard::{MAX_METHODS, Shard};
use std::any::TypeId;
use std::sync::Arc;

/// The recommended number of descriptors per shard.
pub const DEFAULT_MAX_PER_SHARD: usize = 50;

/// Removes the per-shard capacity limit by partitioning descriptors across
/// shards copied from a template.
///
/// Registration accumulates on a pending list; `bind` groups the pending
/// descriptors by event type (first-registration order) into shards of at
/// most `max_per_shard` descriptors, never splitting an event-type bucket
/// across shards when the bucket fits. `post` delegates to the single shard
/// when everything fits, otherwise it routes the event through every shard
/// in creation order; a cancellation in one shard is honored by the next
/// shard's plan before it invokes anything.
pub struct Expander {
    template: Shard,
    max_per_shard: usize,
    pending: Vec<HandlerDescriptor>,
    shards: Vec<Shard>,
}

impl Expander {
    /// An expander over copies of `template` with the recommended
    /// per-shard limit.
    pub fn new(template: Shard) -> Self {
        Self::with_max_per_shard(template, DEFAULT_MAX_PER_SHARD)
    }

    /// An expander with a specific per-shard limit, clamped to
    /// `[1, MAX_METHODS]`.
    pub fn with_max_per_shard(template: Shard, max_per_shard: usize) -> Self {
        Self {
            template,
            max_per_shard: max_per_shard.clamp(1, MAX_METHODS),
            pending: Vec::new(),
            shards: Vec::new(),
        }
    }

    pub fn max_per_shard(&self) -> usize {
        self.max_per_shard
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_bound(&self) -> bool {
        !self.shards.is_empty()
    }

    /// The bound shards, in creation order. Empty before the first bind.
    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// Appends one descriptor to the pending list. Never fails: capacity is
    /// handled by partitioning at bind time.
    pub fn register(&mut self, descriptor: HandlerDescriptor) {
        self.pending.push(descriptor);
    }

    /// Analyzes a subscriber and appends every descriptor it declares.
    /// Returns the descriptors created.
    pub fn register_subscriber<S: Subscriber>(
        &mut self,
        subscriber: &Arc<S>,
    ) -> Result<Vec<HandlerDescriptor>, SubscriptionError> {
        let descriptors = analyze(subscriber)?;
        self.pending.extend(descriptors.iter().cloned());
        Ok(descriptors)
    }

    /// Removes the first pending descriptor with the same registration.
    pub fn unregister(&mut self, descriptor: &HandlerDescriptor) {
        if let Some(position) = self
            .pending
            .iter()
            .position(|entry| entry.same_registration(descriptor))
        {
            self.pending.remove(position);
        }
    }

    /// Removes the subscriber's methods by target type and method name.
    pub fn unregister_subscriber<S: Subscriber>(&mut self, subscriber: &Arc<S>) {
        let Ok(descriptors) = analyze(subscriber) else {
            return;
        };
        for descriptor in &descriptors {
            let method = descriptor.method_name();
            if let Some(position) = self.pending.iter().position(|entry| {
                entry.target_type() == TypeId::of::<S>() && entry.method_name() == method
            }) {
                self.pending.remove(position);
            }
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Partitions the pending descriptors into shards and binds each one.
    ///
    /// An empty pending list still binds one empty shard, so `post` after
    /// `clear(); bind()` succeeds and invokes nothing.
    pub fn bind(&mut self) {
        let mut groups: Vec<Vec<HandlerDescriptor>> = Vec::new();
        let mut current: Vec<HandlerDescriptor> = Vec::new();
        for mut bucket in group_by_event_type(&self.pending) {
            // Sorting before partitioning keeps priority order across
            // shards: a bucket split over several shards dispatches its
            // chunks in creation order.
            bucket.sort_by(|a, b| b.priority().cmp(&a.priority()));
            // Keep a bucket on one shard whenever it fits.
            if !current.is_empty()
                && current.len() + bucket.len() > self.max_per_shard
                && bucket.len() <= self.max_per_shard
            {
                groups.push(std::mem::take(&mut current));
            }
            for descriptor in bucket {
                if current.len() == self.max_per_shard {
                    groups.push(std::mem::take(&mut current));
                }
                current.push(descriptor);
            }
        }
        if !current.is_empty() || groups.is_empty() {
            groups.push(current);
        }

        let mut shards = Vec::with_capacity(groups.len());
        for group in groups {
            let mut shard = self.template.copy();
            shard
                .register_all(group)
                .expect("partition group within shard capacity");
            shard.bind();
            shards.push(shard);
        }
        tracing::debug!(
            descriptors = self.pending.len(),
            shards = shards.len(),
            max_per_shard = self.max_per_shard,
            "partitioned handlers across shards"
        );
        self.shards = shards;
    }

    /// Routes `event` through the bound shards and returns it.
    pub fn post<E: Event>(&self, mut event: E) -> Result<E, NotBound> {
        self.post_dyn(&mut event)?;
        Ok(event)
    }

    pub(crate) fn post_dyn(&self, event: &mut dyn Event) -> Result<(), NotBound> {
        if self.shards.is_empty() {
            return Err(NotBound);
        }
        for shard in &self.shards {
            shard.post_dyn(event)?;
        }
        Ok(())
    }

    /// The pending descriptors, bucket by bucket in registration order.
    pub fn snapshot(&self) -> Vec<HandlerDescriptor> {
        self.pending.clone()
    }
}

/// Groups descriptors by event type, buckets in first-sighting order and
/// entries in registration order.
fn group_by_event_type(descriptors: &[HandlerDescriptor]) -> Vec<Vec<HandlerDescriptor>> {
    let mut order: Vec<TypeId> = Vec::new();
    let mut groups: Vec<Vec<HandlerDescriptor>> = Vec::new();
    for descriptor in descriptors {
        let event_type = descriptor.event_type();
        match order.iter().position(|seen| *seen == event_type) {
            Some(slot) => groups[slot].push(descriptor.clone()),
            None => {
                order.push(event_type);
                groups.push(vec![descriptor.clone()]);
            }
        }
    }
    groups
}
