use crate::descriptor::HandlerDescriptor;
use crate::error::SubscriptionError;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// An object whose methods receive events.
///
/// Non-forced descriptors consult `is_enabled` at post time; a disabled
/// handler is skipped without affecting the event or other handlers.
pub trait Handler: Any + Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any;
}

/// A handler that declares its subscriptions.
///
/// `subscriptions` returns one descriptor per subscribed method, built with
/// [`HandlerDescriptor::of`] or [`HandlerDescriptor::of_subclasses`]. The
/// set is validated by [`analyze`] before it reaches a registry.
pub trait Subscriber: Handler {
    fn subscriptions(self: Arc<Self>) -> Result<Vec<HandlerDescriptor>, SubscriptionError>;
}

/// Verifies a subscriber's declared subscriptions and returns the
/// descriptors created.
///
/// Fails when two subscriptions share a method name or when a descriptor
/// targets an object other than `subscriber`. Filter initialization errors
/// surface from `subscriptions` itself.
pub fn analyze<S: Subscriber>(
    subscriber: &Arc<S>,
) -> Result<Vec<HandlerDescriptor>, SubscriptionError> {
    let descriptors = Arc::clone(subscriber).subscriptions()?;
    for (position, descriptor) in descriptors.iter().enumerate() {
        if descriptor.target_type() != TypeId::of::<S>() {
            return Err(SubscriptionError::ForeignTarget {
                handler: std::any::type_name::<S>(),
                method: descriptor.method_name(),
            });
        }
        let duplicated = descriptors[..position]
            .iter()
            .any(|earlier| earlier.method_name() == descriptor.method_name());
        if duplicated {
            return Err(SubscriptionError::DuplicateMethod {
                handler: std::any::type_name::<S>(),
                method: descriptor.method_name(),
            });
        }
    }
    Ok(descriptors)
}
