use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

type Callback<V> = Arc<dyn Fn(&V) + Send + Sync>;

struct Registry<V> {
    next_index: u64,
    targets: HashMap<SubscriptionTarget, Vec<(u64, Callback<V>)>>,
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self {
            next_index: 0,
            targets: HashMap::new(),
        }
    }
}

/// Callbacks keyed by the entity they are interested in.
pub(super) struct EventHandlers<V: 'static> {
    registry: Arc<Mutex<Registry<V>>>,
}

impl<V: 'static> Clone for EventHandlers<V> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<V: Send + Sync + 'static> EventHandlers<V> {
    pub(super) fn new() -> Self {
        Self {
            registry: Arc::default(),
        }
    }

    pub(super) fn add(
        &self,
        target: SubscriptionTarget,
        callback: Callback<V>,
    ) -> SubscriptionHandler {
        let index = {
            let mut registry = self.registry.lock();
            let index = registry.next_index;
            registry.next_index += 1;
            registry
                .targets
                .entry(target)
                .or_default()
                .push((index, callback));
            index
        };

        let registry_weak: Weak<Mutex<Registry<V>>> = Arc::downgrade(&self.registry);

        SubscriptionHandler {
            remove_callback: Some(Box::new(move || {
                if let Some(registry) = registry_weak.upgrade() {
                    // Removed callback is dropped only after the lock is released, it may own an
                    // entity whose drop unsubscribes again.
                    let removed = {
                        let mut registry = registry.lock();
                        let mut removed = None;
                        let mut now_empty = false;
                        if let Some(list) = registry.targets.get_mut(&target) {
                            if let Some(position) = list.iter().position(|(i, _)| *i == index) {
                                removed = Some(list.remove(position));
                            }
                            now_empty = list.is_empty();
                        }
                        if now_empty {
                            registry.targets.remove(&target);
                        }
                        removed
                    };
                    drop(removed);
                }
            })),
        }
    }

    /// Calls every callback registered for `target`, without holding the lock while doing so.
    pub(super) fn call(&self, target: &SubscriptionTarget, value: &V) -> bool {
        let callbacks = {
            let registry = self.registry.lock();
            match registry.targets.get(target) {
                Some(list) => list
                    .iter()
                    .map(|(_, callback)| Arc::clone(callback))
                    .collect::<Vec<_>>(),
                None => return false,
            }
        };

        for callback in callbacks {
            callback(value);
        }

        true
    }

    pub(super) fn clear(&self) {
        let targets = std::mem::take(&mut self.registry.lock().targets);
        drop(targets);
    }
}

/// Entity that notifications are addressed to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) enum SubscriptionTarget {
    /// Routers, transports and everything below them.
    Uuid(Uuid),
    /// Worker itself, addressed by its process id.
    Number(u32),
}

impl From<u32> for SubscriptionTarget {
    fn from(number: u32) -> Self {
        Self::Number(number)
    }
}

impl fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid(uuid) => fmt::Display::fmt(uuid, f),
            Self::Number(number) => fmt::Display::fmt(number, f),
        }
    }
}

/// Subscription handler, will remove corresponding subscription when dropped
pub(crate) struct SubscriptionHandler {
    remove_callback: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl fmt::Debug for SubscriptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandler").finish()
    }
}

impl Drop for SubscriptionHandler {
    fn drop(&mut self) {
        if let Some(remove_callback) = self.remove_callback.take() {
            remove_callback();
        }
    }
}
