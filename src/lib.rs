mod async_bus;
mod bus;
mod context;
mod descriptor;
mod error;
mod event;
mod exception;
mod expander;
pub mod feedback;
mod filter;
mod handler;
mod plan;
mod post;
mod registry;
mod shard;
mod wait_group;
mod worker;

pub use {
    async_bus::{AsyncBus, QUEUE_CAPACITY},
    bus::Bus,
    context::{Context, ContextChain},
    descriptor::{DescriptorBuilder, HandlerDescriptor},
    error::{
        CapacityExceeded, DispatchError, FilterError, NotBound, RegisterError, SubscriptionError,
    },
    event::{CancelFlag, Cancellable, Event},
    exception::ExceptionEvent,
    expander::{DEFAULT_MAX_PER_SHARD, Expander},
    feedback::Feedback,
    filter::Filter,
    handler::{Handler, Subscriber, analyze},
    post::{Drain, Post},
    shard::{MAX_METHODS, Shard},
    worker::THREAD_SLEEP_DELAY,
};
