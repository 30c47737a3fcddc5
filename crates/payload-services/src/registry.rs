//! Task registry — maps message IDs to the handlers that execute them.
//!
//! Built once at startup and shared read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use payload_core::Message;

use crate::context::PayloadContext;

/// A unit of work: one opaque payload in, an optional reply out.
///
/// Handlers run on the controller's blocking worker, so they may block.
pub trait TaskHandler: Send + Sync {
    fn handle(&self, ctx: &PayloadContext, payload: &[u8]) -> anyhow::Result<Option<Message>>;
}

impl<F> TaskHandler for F
where
    F: Fn(&PayloadContext, &[u8]) -> anyhow::Result<Option<Message>> + Send + Sync,
{
    fn handle(&self, ctx: &PayloadContext, payload: &[u8]) -> anyhow::Result<Option<Message>> {
        self(ctx, payload)
    }
}

/// Pins a closure to the handler signature so its argument and return
/// types are inferred.
pub fn handler_fn<F>(f: F) -> F
where
    F: Fn(&PayloadContext, &[u8]) -> anyhow::Result<Option<Message>> + Send + Sync + 'static,
{
    f
}

struct Registration {
    /// None = the controller's default priority.
    priority: Option<u8>,
    handler: Arc<dyn TaskHandler>,
}

#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<u8, Registration>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in handler; see [`crate::handlers`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::handlers::register_builtins(&mut registry);
        registry
    }

    /// Register a handler at the default priority. Replaces any previous
    /// registration for `id`.
    pub fn register(&mut self, id: u8, handler: impl TaskHandler + 'static) {
        self.insert(id, None, Arc::new(handler));
    }

    pub fn register_with_priority(
        &mut self,
        id: u8,
        priority: u8,
        handler: impl TaskHandler + 'static,
    ) {
        self.insert(id, Some(priority), Arc::new(handler));
    }

    fn insert(&mut self, id: u8, priority: Option<u8>, handler: Arc<dyn TaskHandler>) {
        if self
            .handlers
            .insert(id, Registration { priority, handler })
            .is_some()
        {
            tracing::warn!(id, "handler replaced");
        }
    }

    pub fn lookup(&self, id: u8) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&id).map(|r| r.handler.clone())
    }

    pub fn exists(&self, id: u8) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Registered priority for `id`, if the handler was registered with one.
    pub fn priority(&self, id: u8) -> Option<u8> {
        self.handlers.get(&id).and_then(|r| r.priority)
    }

    /// Registered IDs, ascending.
    pub fn ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
