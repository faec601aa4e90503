use crate::error::NotBound;
use crate::event::Event;

/// Synchronous posting capability, implemented by every bound dispatcher.
pub trait Post {
    /// Routes `event` through the active plan and returns it, possibly
    /// mutated or cancelled.
    fn post<E: Event>(&self, event: E) -> Result<E, NotBound>;
}

/// Graceful shutdown: wait for in-flight work, then release resources.
#[trait_variant::make(Send)]
pub trait Drain {
    async fn drain(self);
}
