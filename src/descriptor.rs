use crate::error::SubscriptionError;
use crate::event::Event;
use crate::filter::Filter;
use crate::handler::Handler;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Type-erased invoker: downcasts the handler (and, for exact-type
/// subscriptions, the event) and calls the subscribed method.
pub(crate) type InvokeFn = Arc<dyn Fn(&dyn Handler, &mut dyn Event) + Send + Sync>;

/// The immutable record binding one subscribed method to its metadata.
///
/// Descriptors are cheap to clone; clones share the same identity, which is
/// what descriptor-level `unregister` matches on.
#[derive(Clone)]
pub struct HandlerDescriptor {
    event_type: TypeId,
    event_type_name: &'static str,
    target: Arc<dyn Handler>,
    target_type: TypeId,
    target_type_name: &'static str,
    method_name: &'static str,
    invoke: InvokeFn,
    priority: i32,
    forced: bool,
    accept_subclasses: bool,
    filter: Option<Arc<dyn Filter>>,
}

impl HandlerDescriptor {
    /// Starts a descriptor for a method receiving exactly events of type `E`.
    pub fn of<E, S>(
        method_name: &'static str,
        target: Arc<S>,
        method: fn(&S, &mut E),
    ) -> DescriptorBuilder
    where
        E: Event,
        S: Handler,
    {
        let invoke: InvokeFn = Arc::new(move |handler: &dyn Handler, event: &mut dyn Event| {
            let handler = handler.as_any().downcast_ref::<S>().unwrap();
            let event = event.as_any_mut().downcast_mut::<E>().unwrap();
            method(handler, event);
        });
        DescriptorBuilder::new::<E, S>(method_name, target, invoke, false)
    }

    /// Starts a descriptor for a method accepting `E` and any declared
    /// subtype of it.
    ///
    /// Rust has no structural subtyping, so the method receives the event as
    /// `&mut dyn Event`; the declared type is matched through
    /// [`Event::is_a`].
    pub fn of_subclasses<E, S>(
        method_name: &'static str,
        target: Arc<S>,
        method: fn(&S, &mut dyn Event),
    ) -> DescriptorBuilder
    where
        E: Event,
        S: Handler,
    {
        let invoke: InvokeFn = Arc::new(move |handler: &dyn Handler, event: &mut dyn Event| {
            let handler = handler.as_any().downcast_ref::<S>().unwrap();
            method(handler, event);
        });
        DescriptorBuilder::new::<E, S>(method_name, target, invoke, true)
    }

    pub fn event_type(&self) -> TypeId {
        self.event_type
    }

    pub fn event_type_name(&self) -> &'static str {
        self.event_type_name
    }

    pub fn target(&self) -> &Arc<dyn Handler> {
        &self.target
    }

    pub fn target_type(&self) -> TypeId {
        self.target_type
    }

    pub fn target_type_name(&self) -> &'static str {
        self.target_type_name
    }

    pub fn method_name(&self) -> &'static str {
        self.method_name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn forced(&self) -> bool {
        self.forced
    }

    pub fn accepts_subclasses(&self) -> bool {
        self.accept_subclasses
    }

    pub fn filter(&self) -> Option<&Arc<dyn Filter>> {
        self.filter.as_ref()
    }

    /// Whether `other` is the same registration (a clone of this
    /// descriptor).
    pub fn same_registration(&self, other: &HandlerDescriptor) -> bool {
        Arc::ptr_eq(&self.invoke, &other.invoke)
    }

    pub(crate) fn invoke_fn(&self) -> InvokeFn {
        Arc::clone(&self.invoke)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("event_type", &self.event_type_name)
            .field("target", &self.target_type_name)
            .field("method", &self.method_name)
            .field("priority", &self.priority)
            .field("forced", &self.forced)
            .field("accept_subclasses", &self.accept_subclasses)
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

enum FilterChoice {
    None,
    /// Chosen through metadata: instantiated at build time, `init` runs.
    Factory(Box<dyn FnOnce() -> Box<dyn Filter> + Send>),
    /// Attached programmatically: `init` is skipped.
    Instance(Box<dyn Filter>),
}

/// Builder for a [`HandlerDescriptor`]; finished with [`build`](Self::build).
pub struct DescriptorBuilder {
    descriptor: HandlerDescriptor,
    choice: FilterChoice,
}

impl DescriptorBuilder {
    fn new<E: Event, S: Handler>(
        method_name: &'static str,
        target: Arc<S>,
        invoke: InvokeFn,
        accept_subclasses: bool,
    ) -> Self {
        Self {
            descriptor: HandlerDescriptor {
                event_type: TypeId::of::<E>(),
                event_type_name: std::any::type_name::<E>(),
                target,
                target_type: TypeId::of::<S>(),
                target_type_name: std::any::type_name::<S>(),
                method_name,
                invoke,
                priority: 0,
                forced: false,
                accept_subclasses,
                filter: None,
            },
            choice: FilterChoice::None,
        }
    }

    /// Higher priorities are dispatched first. Defaults to 0.
    pub fn priority(mut self, priority: i32) -> Self {
        self.descriptor.priority = priority;
        self
    }

    /// Skips the target's `is_enabled` gate. Defaults to false.
    pub fn forced(mut self, forced: bool) -> Self {
        self.descriptor.forced = forced;
        self
    }

    /// Chooses a filter type through metadata. The filter is instantiated
    /// with its zero-argument constructor at build time and receives
    /// `init(descriptor)`.
    pub fn filter<F: Filter + Default>(mut self) -> Self {
        self.choice = FilterChoice::Factory(Box::new(|| Box::new(F::default())));
        self
    }

    /// Attaches a ready-made filter. Its `init` hook is not called.
    pub fn set_filter(mut self, filter: impl Filter) -> Self {
        self.choice = FilterChoice::Instance(Box::new(filter));
        self
    }

    pub fn build(self) -> Result<HandlerDescriptor, SubscriptionError> {
        let mut descriptor = self.descriptor;
        match self.choice {
            FilterChoice::None => {}
            FilterChoice::Factory(factory) => {
                let mut filter = factory();
                filter
                    .init(&descriptor)
                    .map_err(|source| SubscriptionError::FilterInit {
                        method: descriptor.method_name,
                        source,
                    })?;
                descriptor.filter = Some(Arc::from(filter));
            }
            FilterChoice::Instance(filter) => {
                descriptor.filter = Some(Arc::from(filter));
            }
        }
        Ok(descriptor)
    }
}
