use crate::types::{ControllerState, DeviceInfo, InitialProps};
use common::PlaybackSource;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;
use uuid::Uuid;

type RawListener = Arc<dyn Fn(&ControllerState) + Send + Sync>;

struct ListenerEntry {
    id: u64,
    active: Arc<AtomicBool>,
    callback: RawListener,
}

struct StoreInner {
    id: Uuid,
    state: RwLock<Arc<ControllerState>>,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
    destroyed: AtomicBool,
}

/// Mutable container of a player's [`ControllerState`].
///
/// Reads hand out immutable snapshots. Mutation only goes through the intent
/// methods (see `intents.rs`); after [`ControllerStore::destroy`] every intent
/// is ignored, so late async continuations cannot resurrect state.
///
/// Listeners run synchronously after the state lock is released and always
/// receive the latest snapshot, which makes re-entrant intents from inside a
/// listener safe.
#[derive(Clone)]
pub struct ControllerStore {
    inner: Arc<StoreInner>,
}

impl ControllerStore {
    pub fn new(
        initial_props: InitialProps,
        source: Option<PlaybackSource>,
        device: DeviceInfo,
    ) -> Self {
        Self::from_state(ControllerState::new(initial_props, source, device))
    }

    pub fn from_state(state: ControllerState) -> Self {
        let id = Uuid::new_v4();
        debug!("Creating controller store {}", id);
        Self {
            inner: Arc::new(StoreInner {
                id,
                state: RwLock::new(Arc::new(state)),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Current snapshot.
    pub fn get_state(&self) -> Arc<ControllerState> {
        self.inner.state.read().clone()
    }

    /// Project the current state without cloning the snapshot handle.
    pub fn read<R>(&self, f: impl FnOnce(&ControllerState) -> R) -> R {
        f(&self.inner.state.read())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Apply `update` and notify listeners when the state actually changed.
    ///
    /// Returns `false` when the store is destroyed or the update was a no-op.
    pub(crate) fn set_state(&self, update: impl FnOnce(&mut ControllerState)) -> bool {
        if self.is_destroyed() {
            return false;
        }

        {
            let mut guard = self.inner.state.write();
            let mut next = ControllerState::clone(&guard);
            update(&mut next);
            if next == **guard {
                return false;
            }
            *guard = Arc::new(next);
        }

        self.notify();
        true
    }

    fn notify(&self) {
        let listeners: Vec<(Arc<AtomicBool>, RawListener)> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|entry| (entry.active.clone(), entry.callback.clone()))
            .collect();

        for (active, callback) in listeners {
            if !active.load(Ordering::SeqCst) || self.is_destroyed() {
                continue;
            }
            let snapshot = self.get_state();
            callback(&snapshot);
        }
    }

    /// Register a listener called with the latest snapshot after every change.
    pub fn subscribe_all<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ControllerState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(!self.is_destroyed()));

        if active.load(Ordering::SeqCst) {
            self.inner.listeners.lock().push(ListenerEntry {
                id,
                active: active.clone(),
                callback: Arc::new(listener),
            });
        }

        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
            active,
        }
    }

    /// Subscribe to a projection of the state, compared with `PartialEq`.
    pub fn subscribe<T, S, L>(&self, selector: S, listener: L) -> Subscription
    where
        T: PartialEq + Clone + Send + 'static,
        S: Fn(&ControllerState) -> T + Send + Sync + 'static,
        L: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.subscribe_with(selector, listener, |a: &T, b: &T| a == b)
    }

    /// Subscribe to a projection of the state with a custom equality.
    ///
    /// `listener(current, previous)` runs only when `equality(previous,
    /// current)` is false. The remembered slice follows every notification, so
    /// `equality` compares consecutive states.
    pub fn subscribe_with<T, S, L, E>(&self, selector: S, listener: L, equality: E) -> Subscription
    where
        T: Clone + Send + 'static,
        S: Fn(&ControllerState) -> T + Send + Sync + 'static,
        L: Fn(&T, &T) + Send + Sync + 'static,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let last = Mutex::new(self.read(|state| selector(state)));

        self.subscribe_all(move |state| {
            let next = selector(state);
            let previous = {
                let mut last = last.lock();
                if equality(&*last, &next) {
                    *last = next;
                    return;
                }
                std::mem::replace(&mut *last, next.clone())
            };
            listener(&next, &previous);
        })
    }

    /// Drop every listener and refuse further intents. Idempotent.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let listeners = std::mem::take(&mut *self.inner.listeners.lock());
        for entry in &listeners {
            entry.active.store(false, Ordering::SeqCst);
        }
        debug!(
            "Destroyed controller store {} ({} listeners released)",
            self.inner.id,
            listeners.len()
        );
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

/// Registration handle returned by the `subscribe*` methods.
///
/// Dropping the handle unsubscribes; keep it alive for as long as the
/// listener should run.
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Stop the listener. Once this returns the listener will not be invoked
    /// again, even from a notification already in progress. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.store.upgrade() {
            inner.listeners.lock().retain(|entry| entry.id != self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
