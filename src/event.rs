use crate::context::{Context, ContextChain};
use std::any::{Any, TypeId};

/// A value delivered through the bus.
///
/// Events are plain `'static + Send` values. The bus matches them by their
/// concrete type; declared subtype relations are expressed by overriding
/// [`Event::is_a`]. Every event carries a context chain, usually by
/// embedding a [`ContextChain`] field.
pub trait Event: Any + Send {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn contexts(&self) -> &ContextChain;

    fn contexts_mut(&mut self) -> &mut ContextChain;

    /// Whether this event counts as an instance of `event_type`.
    ///
    /// The default accepts only the concrete type. An event with declared
    /// ancestors overrides this to also accept their type ids; that is what
    /// subtype-accepting handlers match against.
    fn is_a(&self, event_type: TypeId) -> bool {
        event_type == TypeId::of::<Self>()
    }

    /// The concrete type name, for diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// A cancellable view of this event, if it has one.
    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }

    fn as_cancellable_mut(&mut self) -> Option<&mut dyn Cancellable> {
        None
    }
}

/// An event with a mutable cancelled flag, observed between handler
/// invocations.
pub trait Cancellable: Event {
    fn is_cancelled(&self) -> bool;

    fn set_cancelled(&mut self, cancelled: bool);

    fn cancel(&mut self) {
        self.set_cancelled(true);
    }
}

/// A cancelled flag for embedding into cancellable events.
#[derive(Debug, Default, Clone)]
pub struct CancelFlag(bool);

impl CancelFlag {
    pub fn get(&self) -> bool {
        self.0
    }

    pub fn set(&mut self, cancelled: bool) {
        self.0 = cancelled;
    }
}

impl dyn Event {
    /// Attaches `context` as the event's new head context and returns the
    /// event for chaining.
    pub fn set_context(&mut self, context: Context) -> &mut dyn Event {
        self.contexts_mut().attach(context);
        self
    }

    /// Returns the nearest context payload of type `T`.
    pub fn context<T: Any>(&self) -> Option<&T> {
        self.contexts().find::<T>()
    }
}
