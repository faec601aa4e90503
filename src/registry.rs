use crate::descriptor::HandlerDescriptor;
use std::any::TypeId;
use std::collections::HashMap;

/// Descriptors registered for one event type, in registration order.
#[derive(Clone)]
pub(crate) struct Bucket {
    pub(crate) event_type: TypeId,
    pub(crate) entries: Vec<HandlerDescriptor>,
}

/// The mutable registration table behind a shard.
///
/// Buckets are kept in first-registration order so that partitioning and
/// plan construction are deterministic for identical register sequences.
/// Subtype-accepting descriptors appear both in their declared-type bucket
/// and in the global `subclass` list.
#[derive(Default)]
pub(crate) struct Registry {
    buckets: Vec<Bucket>,
    index: HashMap<TypeId, usize>,
    subclass: Vec<HandlerDescriptor>,
    len: usize,
}

impl Registry {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn push(&mut self, descriptor: HandlerDescriptor) {
        let event_type = descriptor.event_type();
        let slot = *self.index.entry(event_type).or_insert_with(|| {
            self.buckets.push(Bucket {
                event_type,
                entries: Vec::new(),
            });
            self.buckets.len() - 1
        });
        if descriptor.accepts_subclasses() {
            self.subclass.push(descriptor.clone());
        }
        self.buckets[slot].entries.push(descriptor);
        self.len += 1;
    }

    /// Removes the first descriptor matching `matches`. Returns whether a
    /// descriptor was removed.
    pub(crate) fn remove_first(
        &mut self,
        matches: impl Fn(&HandlerDescriptor) -> bool,
    ) -> bool {
        let mut removed = None;
        for (slot, bucket) in self.buckets.iter_mut().enumerate() {
            if let Some(position) = bucket.entries.iter().position(&matches) {
                removed = Some((slot, bucket.entries.remove(position)));
                break;
            }
        }
        let Some((slot, descriptor)) = removed else {
            return false;
        };
        if descriptor.accepts_subclasses() {
            if let Some(position) = self
                .subclass
                .iter()
                .position(|entry| entry.same_registration(&descriptor))
            {
                self.subclass.remove(position);
            }
        }
        if self.buckets[slot].entries.is_empty() {
            let gone = self.buckets.remove(slot);
            self.index.remove(&gone.event_type);
            for value in self.index.values_mut() {
                if *value > slot {
                    *value -= 1;
                }
            }
        }
        self.len -= 1;
        true
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
        self.index.clear();
        self.subclass.clear();
        self.len = 0;
    }

    pub(crate) fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub(crate) fn subclass_entries(&self) -> &[HandlerDescriptor] {
        &self.subclass
    }

    /// All registered descriptors, bucket by bucket in registration order.
    pub(crate) fn snapshot(&self) -> Vec<HandlerDescriptor> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.entries.iter().cloned())
            .collect()
    }
}
