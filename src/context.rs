use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A single node of an event's context chain.
///
/// A context carries an arbitrary user payload and an optional parent,
/// forming a singly-linked ancestry. Nodes are shared by reference; the
/// chain itself is never copied.
pub struct Context {
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Context>>,
}

impl Context {
    /// Creates a parentless context around `value`.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            parent: None,
        }
    }

    /// Creates a context whose parent is fixed to `parent`.
    ///
    /// A context built this way keeps its parent when attached to an event;
    /// only parentless contexts adopt the previous head.
    pub fn child_of<T: Any + Send + Sync>(value: T, parent: Arc<Context>) -> Self {
        Self {
            value: Box::new(value),
            parent: Some(parent),
        }
    }

    /// Returns the payload if its runtime type is `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns true if the payload's runtime type is `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// The head of an event's context chain.
///
/// Attaching prepends: the new context becomes the head and, if it has no
/// parent of its own, adopts the previous head as parent. Lookup walks the
/// ancestry for the nearest payload of the requested type. Chains are
/// expected to be finite; no cycle detection is performed.
#[derive(Debug, Default, Clone)]
pub struct ContextChain {
    head: Option<Arc<Context>>,
}

impl ContextChain {
    /// Prepends `context` to the chain.
    pub fn attach(&mut self, mut context: Context) {
        if context.parent.is_none() {
            context.parent = self.head.take();
        }
        self.head = Some(Arc::new(context));
    }

    /// Returns the most recently attached context.
    pub fn head(&self) -> Option<&Arc<Context>> {
        self.head.as_ref()
    }

    /// Returns the nearest payload whose runtime type is `T`.
    pub fn find<T: Any>(&self) -> Option<&T> {
        let mut current = self.head.as_deref();
        while let Some(node) = current {
            if let Some(value) = node.get::<T>() {
                return Some(value);
            }
            current = node.parent.as_deref();
        }
        None
    }

    /// Returns every payload of type `T`, nearest first.
    pub fn find_all<T: Any>(&self) -> Vec<&T> {
        let mut found = Vec::new();
        let mut current = self.head.as_deref();
        while let Some(node) = current {
            if let Some(value) = node.get::<T>() {
                found.push(value);
            }
            current = node.parent.as_deref();
        }
        found
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct UserId(u64);

    #[derive(Debug, PartialEq)]
    struct TraceId(&'static str);

    #[test]
    fn attach_prepends_and_adopts_previous_head() {
        let mut chain = ContextChain::default();
        chain.attach(Context::new(UserId(1)));
        chain.attach(Context::new(TraceId("abc")));

        let head = chain.head().unwrap();
        assert!(head.is::<TraceId>());
        assert!(head.parent().unwrap().is::<UserId>());
    }

    #[test]
    fn find_returns_nearest_matching_type() {
        let mut chain = ContextChain::default();
        chain.attach(Context::new(UserId(1)));
        chain.attach(Context::new(UserId(2)));

        assert_eq!(chain.find::<UserId>(), Some(&UserId(2)));
        assert_eq!(chain.find::<TraceId>(), None);
    }

    #[test]
    fn find_all_collects_nearest_first() {
        let mut chain = ContextChain::default();
        chain.attach(Context::new(UserId(1)));
        chain.attach(Context::new(TraceId("abc")));
        chain.attach(Context::new(UserId(2)));

        assert_eq!(chain.find_all::<UserId>(), vec![&UserId(2), &UserId(1)]);
    }

    #[test]
    fn pre_parented_context_keeps_its_parent() {
        let root = Arc::new(Context::new(UserId(7)));
        let mut chain = ContextChain::default();
        chain.attach(Context::new(TraceId("old-head")));
        chain.attach(Context::child_of(TraceId("new-head"), root));

        // The old head is no longer reachable from the new head.
        let head = chain.head().unwrap();
        assert_eq!(head.get::<TraceId>(), Some(&TraceId("new-head")));
        assert_eq!(head.parent().unwrap().get::<UserId>(), Some(&UserId(7)));
        assert_eq!(chain.find::<UserId>(), Some(&UserId(7)));
    }
}
