use crate::descriptor::HandlerDescriptor;
use crate::error::FilterError;
use crate::event::Event;

/// A per-descriptor gate consulted before its owning handler runs.
///
/// Returning `false` skips that handler only; the event itself is not
/// cancelled and other handlers still run.
pub trait Filter: Send + Sync + 'static {
    /// One-time configuration with the owning descriptor.
    ///
    /// Called only when the filter was chosen through subscription metadata
    /// ([`DescriptorBuilder::filter`](crate::descriptor::DescriptorBuilder::filter)),
    /// never for a filter attached programmatically via `set_filter`.
    fn init(&mut self, _descriptor: &HandlerDescriptor) -> Result<(), FilterError> {
        Ok(())
    }

    /// Whether the owning handler should receive `event`.
    fn filter(&self, event: &dyn Event) -> bool;
}
