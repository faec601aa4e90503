use crate::descriptor::HandlerDescriptor;
use crate::error::{CapacityExceeded, NotBound, RegisterError};
use crate::event::Event;
use crate::handler::{Subscriber, analyze};
use crate::plan::Plan;
use crate::registry::Registry;
use std::any::TypeId;
use std::sync::Arc;

/// The maximum number of descriptors a single shard accepts.
pub const MAX_METHODS: usize = 256;

/// A capacity-limited registry plus its specialized dispatch plan.
///
/// A shard accumulates descriptors through the `register` family, becomes
/// dispatchable on [`bind`](Shard::bind), and keeps serving the last bound
/// plan until the next bind. Registration beyond [`MAX_METHODS`] fails; the
/// [`Expander`](crate::expander::Expander) is the scaling mechanism.
///
/// Shards are single-threaded by design: mutation takes `&mut self` and
/// callers coordinate externally.
pub struct Shard {
    registry: Registry,
    capacity: usize,
    plan: Option<Arc<Plan>>,
}

impl Shard {
    pub fn new() -> Self {
        Self {
            registry: Registry::default(),
            capacity: MAX_METHODS,
            plan: None,
        }
    }

    /// A fresh empty shard with the same configuration, used by the
    /// expander as its template mechanism.
    pub fn copy(&self) -> Shard {
        Shard {
            registry: Registry::default(),
            capacity: self.capacity,
            plan: None,
        }
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a bind has ever succeeded on this shard.
    pub fn is_bound(&self) -> bool {
        self.plan.is_some()
    }

    /// Appends one descriptor. Takes effect on the next [`bind`](Shard::bind).
    pub fn register(&mut self, descriptor: HandlerDescriptor) -> Result<(), CapacityExceeded> {
        self.admit(1)?;
        self.registry.push(descriptor);
        Ok(())
    }

    /// Appends a batch of descriptors, checking capacity up front so a
    /// partial batch is never registered.
    pub fn register_all(
        &mut self,
        descriptors: Vec<HandlerDescriptor>,
    ) -> Result<(), CapacityExceeded> {
        self.admit(descriptors.len())?;
        for descriptor in descriptors {
            self.registry.push(descriptor);
        }
        Ok(())
    }

    /// Analyzes a subscriber and registers every descriptor it declares.
    /// Returns the descriptors created.
    pub fn register_subscriber<S: Subscriber>(
        &mut self,
        subscriber: &Arc<S>,
    ) -> Result<Vec<HandlerDescriptor>, RegisterError> {
        let descriptors = analyze(subscriber)?;
        self.register_all(descriptors.clone())?;
        Ok(descriptors)
    }

    /// Removes the first descriptor that is the same registration as
    /// `descriptor`. Takes effect on the next bind.
    pub fn unregister(&mut self, descriptor: &HandlerDescriptor) {
        self.registry
            .remove_first(|entry| entry.same_registration(descriptor));
    }

    /// Removes the subscriber's methods by target type and method name.
    ///
    /// Matching is by type, not instance: registrations made by another
    /// instance of the same subscriber type are eligible.
    pub fn unregister_subscriber<S: Subscriber>(&mut self, subscriber: &Arc<S>) {
        let Ok(descriptors) = analyze(subscriber) else {
            return;
        };
        for descriptor in &descriptors {
            let method = descriptor.method_name();
            self.registry.remove_first(|entry| {
                entry.target_type() == TypeId::of::<S>() && entry.method_name() == method
            });
        }
    }

    pub fn clear(&mut self) {
        self.registry.clear();
    }

    /// Snapshots the registry, sorts each bucket by priority, and installs
    /// the resulting plan as the active dispatcher.
    pub fn bind(&mut self) {
        self.plan = Some(Plan::build(&self.registry));
    }

    /// Routes `event` through the active plan and returns it, possibly
    /// mutated or cancelled.
    pub fn post<E: Event>(&self, mut event: E) -> Result<E, NotBound> {
        self.post_dyn(&mut event)?;
        Ok(event)
    }

    pub(crate) fn post_dyn(&self, event: &mut dyn Event) -> Result<(), NotBound> {
        let plan = self.plan.as_ref().ok_or(NotBound)?;
        plan.dispatch(event);
        Ok(())
    }

    pub(crate) fn plan(&self) -> Option<Arc<Plan>> {
        self.plan.clone()
    }

    /// A read-only view of the currently registered descriptors.
    pub fn snapshot(&self) -> Vec<HandlerDescriptor> {
        self.registry.snapshot()
    }

    fn admit(&self, adding: usize) -> Result<(), CapacityExceeded> {
        let registered = self.registry.len();
        if registered + adding > self.capacity {
            return Err(CapacityExceeded {
                registered,
                adding,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl Default for Shard {
    fn default() -> Self {
        Self::new()
    }
}
