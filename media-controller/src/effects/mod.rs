//! Effect layer: subscriptions over the store that drive the element and the
//! active transport.
//!
//! Every effect owns its subscription and a child of the set's cancellation
//! token; none of them share cleanup state.

mod autohide;
mod poster;
pub mod source;
mod sync;

use crate::backoff::BackoffConfig;
use crate::element::MediaElement;
use crate::store::{ControllerStore, Subscription};
use crate::transport::Transports;
use crate::types::ControlsOptions;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Everything an effect may touch.
#[derive(Clone)]
pub struct EffectContext {
    pub store: ControllerStore,
    pub element: Arc<dyn MediaElement>,
    pub transports: Transports,
    pub options: ControlsOptions,
    pub backoff: BackoffConfig,
    runtime: Handle,
}

impl EffectContext {
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn new(
        store: ControllerStore,
        element: Arc<dyn MediaElement>,
        transports: Transports,
        options: ControlsOptions,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            store,
            element,
            transports,
            options,
            backoff,
            runtime: Handle::current(),
        }
    }

    /// Run `future` on the controller's runtime until `token` is cancelled.
    pub(crate) fn spawn_guarded<F>(&self, token: &CancellationToken, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = token.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = future => {}
            }
        })
    }
}

/// The installed effects of one player.
pub struct EffectSet {
    subscriptions: Mutex<Vec<Subscription>>,
    token: CancellationToken,
    source_task: Mutex<Option<JoinHandle<()>>>,
}

impl EffectSet {
    pub fn install(ctx: EffectContext) -> Self {
        let token = CancellationToken::new();

        let (source_subscription, source_task) = source::install(&ctx, token.child_token());

        let mut subscriptions = vec![source_subscription];
        subscriptions.extend(poster::install(&ctx, token.child_token()));
        subscriptions.extend(sync::install(&ctx, &token));
        subscriptions.extend(autohide::install(&ctx, token.child_token()));

        debug!(
            "Installed {} effects on store {}",
            subscriptions.len(),
            ctx.store.id()
        );

        Self {
            subscriptions: Mutex::new(subscriptions),
            token,
            source_task: Mutex::new(Some(source_task)),
        }
    }

    /// Stop every effect. Pending timers are cancelled and in-flight work can
    /// no longer reach the store once this returns. The active source is
    /// released in the background; use [`EffectSet::shutdown`] to wait for it.
    pub fn destroy(&self) {
        self.token.cancel();
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
    }

    /// [`EffectSet::destroy`], then wait until the active source is released.
    pub async fn shutdown(&self) {
        self.destroy();
        let task = self.source_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Source effect task failed: {}", e);
            }
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for EffectSet {
    fn drop(&mut self) {
        self.destroy();
    }
}
