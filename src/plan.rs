use crate::descriptor::{HandlerDescriptor, InvokeFn};
use crate::error::DispatchError;
use crate::event::Event;
use crate::exception::ExceptionEvent;
use crate::filter::Filter;
use crate::handler::Handler;
use crate::registry::Registry;
use std::any::TypeId;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// One step of a dispatch chain: gates plus the invoker, with indexes into
/// the plan's flattened tables.
struct Op {
    handler: usize,
    filter: Option<usize>,
    forced: bool,
    event_type: TypeId,
    method: &'static str,
    invoke: InvokeFn,
}

enum Gate {
    /// Move on to the next op.
    Next,
    /// The event was cancelled; stop this dispatch.
    Halt,
}

struct Raised {
    method: &'static str,
    payload: Box<dyn std::any::Any + Send>,
}

/// The specialized dispatch routine produced by `bind()`.
///
/// A plan reflects the registry snapshot at the moment it was built: per
/// event type a chain of ops in non-increasing priority order (ties keep
/// insertion order), plus a global chain for subtype-accepting
/// subscriptions. Plans are immutable and shared by reference.
pub(crate) struct Plan {
    handlers: Vec<Arc<dyn Handler>>,
    filters: Vec<Arc<dyn Filter>>,
    exact: HashMap<TypeId, Vec<Op>>,
    subclass: Vec<Op>,
}

impl Plan {
    /// Builds a plan from the registry's current contents.
    pub(crate) fn build(registry: &Registry) -> Arc<Plan> {
        let mut handlers: Vec<Arc<dyn Handler>> = Vec::new();
        let mut filters: Vec<Arc<dyn Filter>> = Vec::new();
        let mut exact = HashMap::new();

        let mut op_of = |descriptor: &HandlerDescriptor| {
            let handler = handlers.len();
            handlers.push(Arc::clone(descriptor.target()));
            let filter = descriptor.filter().map(|gate| {
                filters.push(Arc::clone(gate));
                filters.len() - 1
            });
            Op {
                handler,
                filter,
                forced: descriptor.forced(),
                event_type: descriptor.event_type(),
                method: descriptor.method_name(),
                invoke: descriptor.invoke_fn(),
            }
        };

        for bucket in registry.buckets() {
            let mut entries = bucket.entries.clone();
            entries.sort_by(|a, b| b.priority().cmp(&a.priority()));
            let chain: Vec<Op> = entries.iter().map(&mut op_of).collect();
            exact.insert(bucket.event_type, chain);
        }

        let mut subclass_entries = registry.subclass_entries().to_vec();
        subclass_entries.sort_by(|a, b| b.priority().cmp(&a.priority()));
        let subclass: Vec<Op> = subclass_entries.iter().map(&mut op_of).collect();

        tracing::debug!(
            handlers = handlers.len(),
            event_types = exact.len(),
            subclass_accepting = subclass.len(),
            "installed dispatch plan"
        );

        Arc::new(Plan {
            handlers,
            filters,
            exact,
            subclass,
        })
    }

    /// Routes `event` through the plan, wrapping a panicking subscription
    /// into an [`ExceptionEvent`] posted through the same plan.
    pub(crate) fn dispatch(&self, event: &mut dyn Event) {
        if let Err(raised) = self.run(event) {
            if event.as_any().is::<ExceptionEvent>() {
                tracing::error!(
                    method = raised.method,
                    "subscription panicked while dispatching an exception event; dropped"
                );
                return;
            }
            let error = DispatchError::new(event.name(), raised.method, raised.payload);
            tracing::error!(%error, "subscription panicked; posting exception event");
            let mut wrapped = ExceptionEvent::new(error);
            if let Err(nested) = self.run(&mut wrapped) {
                tracing::error!(
                    method = nested.method,
                    "subscription panicked while dispatching an exception event; dropped"
                );
            }
        }
    }

    fn run(&self, event: &mut dyn Event) -> Result<(), Raised> {
        let concrete = event.as_any().type_id();
        if let Some(chain) = self.exact.get(&concrete) {
            // An exact-type match short-circuits subtype matching.
            return self.run_chain(chain, event, None);
        }
        self.run_chain(&self.subclass, event, Some(concrete))
    }

    /// Runs one op chain. With `proper_subtype_of`, ops only fire for
    /// events that are a declared proper subtype of the op's event type.
    fn run_chain(
        &self,
        chain: &[Op],
        event: &mut dyn Event,
        proper_subtype_of: Option<TypeId>,
    ) -> Result<(), Raised> {
        for op in chain {
            if let Some(concrete) = proper_subtype_of {
                if op.event_type == concrete || !event.is_a(op.event_type) {
                    continue;
                }
            }
            let step = panic::catch_unwind(AssertUnwindSafe(|| {
                if let Some(slot) = op.filter {
                    if !self.filters[slot].filter(event) {
                        return Gate::Next;
                    }
                }
                if let Some(cancellable) = event.as_cancellable() {
                    if cancellable.is_cancelled() {
                        return Gate::Halt;
                    }
                }
                if !op.forced && !self.handlers[op.handler].is_enabled() {
                    return Gate::Next;
                }
                (op.invoke)(self.handlers[op.handler].as_ref(), event);
                Gate::Next
            }));
            match step {
                Ok(Gate::Next) => {}
                Ok(Gate::Halt) => return Ok(()),
                Err(payload) => {
                    return Err(Raised {
                        method: op.method,
                        payload,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextChain;
    use crate::event::{CancelFlag, Cancellable};
    use std::any::Any;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Tick {
        chain: ContextChain,
    }

    impl Event for Tick {
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

    #[derive(Default)]
    struct Veto {
        chain: ContextChain,
        cancelled: CancelFlag,
    }

    impl Event for Veto {
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

        fn as_cancellable(&self) -> Option<&dyn Cancellable> {
            Some(self)
        }

        fn as_cancellable_mut(&mut self) -> Option<&mut dyn Cancellable> {
            Some(self)
        }
    }

    impl Cancellable for Veto {
        fn is_cancelled(&self) -> bool {
            self.cancelled.get()
        }

        fn set_cancelled(&mut self, cancelled: bool) {
            self.cancelled.set(cancelled);
        }
    }

    #[derive(Default)]
    struct Probe {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Probe {
        fn record(&self, label: &'static str) {
            self.calls.lock().unwrap().push(label);
        }

        fn on_panic(&self, _event: &mut Tick) {
            panic!("handler exploded");
        }

        fn on_exception(&self, _event: &mut ExceptionEvent) {
            self.record("exception");
        }
    }

    impl Handler for Probe {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn bind(descriptors: Vec<HandlerDescriptor>) -> Arc<Plan> {
        let mut registry = Registry::default();
        for descriptor in descriptors {
            registry.push(descriptor);
        }
        Plan::build(&registry)
    }

    #[test]
    fn panicking_handler_raises_an_exception_event_once() {
        let probe = Arc::new(Probe::default());
        let plan = bind(vec![
            HandlerDescriptor::of("on_panic", Arc::clone(&probe), Probe::on_panic)
                .build()
                .unwrap(),
            HandlerDescriptor::of("on_exception", Arc::clone(&probe), Probe::on_exception)
                .build()
                .unwrap(),
        ]);

        let mut event = Tick::default();
        plan.dispatch(&mut event);

        assert_eq!(*probe.calls.lock().unwrap(), vec!["exception"]);
    }

    #[test]
    fn panicking_exception_handler_does_not_recurse() {
        struct Grenade;

        impl Grenade {
            fn on_exception(&self, _event: &mut ExceptionEvent) {
                panic!("exception handler exploded");
            }

            fn on_tick(&self, _event: &mut Tick) {
                panic!("first explosion");
            }
        }

        impl Handler for Grenade {
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let grenade = Arc::new(Grenade);
        let plan = bind(vec![
            HandlerDescriptor::of("on_tick", Arc::clone(&grenade), Grenade::on_tick)
                .build()
                .unwrap(),
            HandlerDescriptor::of("on_exception", grenade, Grenade::on_exception)
                .build()
                .unwrap(),
        ]);

        // Must terminate: the nested panic is logged and dropped.
        let mut event = Tick::default();
        plan.dispatch(&mut event);
    }

    #[test]
    fn panic_aborts_remaining_handlers_for_that_event() {
        struct Pair {
            calls: Mutex<Vec<&'static str>>,
        }

        impl Pair {
            fn first(&self, _event: &mut Tick) {
                self.calls.lock().unwrap().push("first");
                panic!("boom");
            }

            fn second(&self, _event: &mut Tick) {
                self.calls.lock().unwrap().push("second");
            }
        }

        impl Handler for Pair {
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let pair = Arc::new(Pair {
            calls: Mutex::new(Vec::new()),
        });
        let plan = bind(vec![
            HandlerDescriptor::of("first", Arc::clone(&pair), Pair::first)
                .priority(10)
                .build()
                .unwrap(),
            HandlerDescriptor::of("second", Arc::clone(&pair), Pair::second)
                .priority(5)
                .build()
                .unwrap(),
        ]);

        let mut event = Tick::default();
        plan.dispatch(&mut event);

        assert_eq!(*pair.calls.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn cancelled_event_entering_a_plan_invokes_nothing() {
        struct Quiet {
            calls: Mutex<Vec<&'static str>>,
        }

        impl Quiet {
            fn on_veto(&self, _event: &mut Veto) {
                self.calls.lock().unwrap().push("on_veto");
            }
        }

        impl Handler for Quiet {
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let quiet = Arc::new(Quiet {
            calls: Mutex::new(Vec::new()),
        });
        let plan = bind(vec![
            HandlerDescriptor::of("on_veto", Arc::clone(&quiet), Quiet::on_veto)
                .build()
                .unwrap(),
        ]);

        let mut event = Veto::default();
        event.cancel();
        plan.dispatch(&mut event);

        assert!(quiet.calls.lock().unwrap().is_empty());
    }
}
