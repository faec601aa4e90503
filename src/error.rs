/// A structural problem with a subscriber's declared subscriptions.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// Two subscriptions of one subscriber share a method name.
    #[error("duplicate subscription `{method}` on {handler}")]
    DuplicateMethod {
        handler: &'static str,
        method: &'static str,
    },

    /// A subscription targets an object other than the analyzed subscriber.
    #[error("subscription `{method}` does not target the analyzed subscriber {handler}")]
    ForeignTarget {
        handler: &'static str,
        method: &'static str,
    },

    /// A metadata-chosen filter failed to initialize.
    #[error("filter for subscription `{method}` failed to initialize")]
    FilterInit {
        method: &'static str,
        #[source]
        source: FilterError,
    },
}

/// An error raised by a filter's `init` hook.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FilterError(pub String);

/// The shard's handler table is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("handler table is full: {registered} registered, adding {adding}, capacity {capacity}")]
pub struct CapacityExceeded {
    pub registered: usize,
    pub adding: usize,
    pub capacity: usize,
}

/// `post` was called before the first successful `bind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("posted before the first bind")]
pub struct NotBound;

/// Either failure mode of registering a subscriber on a shard.
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error(transparent)]
    Capacity(#[from] CapacityExceeded),
}

/// A handler, filter, or enable-check panicked during dispatch.
///
/// Dispatch of the failing event stops and the error is re-posted wrapped in
/// an [`ExceptionEvent`](crate::exception::ExceptionEvent).
#[derive(Debug, Clone, thiserror::Error)]
#[error("subscription `{method}` panicked while dispatching {event_type}: {message}")]
pub struct DispatchError {
    /// Concrete type name of the event being dispatched.
    pub event_type: &'static str,
    /// Method name of the failing descriptor.
    pub method: &'static str,
    /// The captured panic message.
    pub message: String,
}

impl DispatchError {
    pub(crate) fn new(
        event_type: &'static str,
        method: &'static str,
        payload: Box<dyn std::any::Any + Send>,
    ) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_owned()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self {
            event_type,
            method,
            message,
        }
    }
}
