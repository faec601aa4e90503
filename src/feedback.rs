use crate::event::Event;

/// Receives each event after a worker has dispatched it.
///
/// Feedback runs under a mutex shared by all workers, so implementations
/// observe a serialized stream and may keep plain mutable state.
pub trait Feedback: Send + 'static {
    fn handle_feedback(&mut self, event: &mut dyn Event);
}

pub struct FromFn<F>(F);

impl<F> Feedback for FromFn<F>
where
    F: FnMut(&mut dyn Event) + Send + 'static,
{
    fn handle_feedback(&mut self, event: &mut dyn Event) {
        (self.0)(event);
    }
}

#[inline]
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    FromFn<F>: Feedback,
{
    FromFn(f)
}
