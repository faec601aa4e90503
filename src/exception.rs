use crate::context::ContextChain;
use crate::error::DispatchError;
use crate::event::Event;
use std::any::Any;

/// Posted through the same plan when a subscription panics during dispatch.
///
/// An exception event is never wrapped again: a panic raised while
/// dispatching an `ExceptionEvent` is logged and dropped.
#[derive(Debug)]
pub struct ExceptionEvent {
    chain: ContextChain,
    error: DispatchError,
}

impl ExceptionEvent {
    pub(crate) fn new(error: DispatchError) -> Self {
        Self {
            chain: ContextChain::default(),
            error,
        }
    }

    /// The captured dispatch failure.
    pub fn error(&self) -> &DispatchError {
        &self.error
    }
}

impl Event for ExceptionEvent {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn contexts(&self) -> &ContextChain {
        &self.chain
    }

    fn contexts_mut(&mut self) -> &mut ContextChain {
        &mut self.chain
    }
}
