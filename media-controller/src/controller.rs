use crate::backoff::BackoffConfig;
use crate::bridge::{BridgeOptions, EventBridge, UrlProbe};
use crate::config::ControllerConfig;
use crate::device::{initial_device_info, spawn_device_probe, CapabilityProbe};
use crate::effects::{EffectContext, EffectSet};
use crate::element::MediaElement;
use crate::store::ControllerStore;
use crate::transport::Transports;
use crate::types::{ControlsOptions, InitialProps};
use common::PlaybackSource;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Collaborators a controller needs besides the element.
#[derive(Clone)]
pub struct ControllerDeps {
    pub transports: Transports,
    pub url_probe: Arc<dyn UrlProbe>,
    /// `None` keeps the synchronous capability guess.
    pub capability_probe: Option<Arc<dyn CapabilityProbe>>,
}

/// Create a store for `element`, seeding the device info from what the
/// element reports synchronously.
pub fn create_controller_store(
    element: &dyn MediaElement,
    initial_props: InitialProps,
    source: Option<PlaybackSource>,
) -> ControllerStore {
    let kind = source
        .as_ref()
        .map(|source| source.media_kind())
        .unwrap_or_default();
    ControllerStore::new(initial_props, source, initial_device_info(element, kind))
}

/// A store wired to an element: listeners, effects and the device probe.
pub struct MediaController {
    store: ControllerStore,
    bridge: EventBridge,
    effects: EffectSet,
    probe_token: CancellationToken,
}

impl MediaController {
    /// Attach listeners and effects, then mark the player mounted, which
    /// starts the source.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(
        store: ControllerStore,
        element: Arc<dyn MediaElement>,
        deps: ControllerDeps,
        options: ControlsOptions,
        backoff: BackoffConfig,
    ) -> Self {
        let probe_token = CancellationToken::new();
        if let Some(probe) = deps.capability_probe {
            let kind = store.read(|state| state.media_kind());
            spawn_device_probe(store.clone(), probe, kind, probe_token.clone());
        }

        let bridge = EventBridge::attach(
            &store,
            element.clone(),
            deps.url_probe,
            BridgeOptions {
                autohide: options.autohide,
            },
        );
        let effects = EffectSet::install(EffectContext::new(
            store.clone(),
            element,
            deps.transports,
            options,
            backoff,
        ));

        store.set_mounted(true);
        info!(
            "Controller {} attached to {:?}",
            store.id(),
            store.read(|state| state.current_source.clone())
        );

        Self {
            store,
            bridge,
            effects,
            probe_token,
        }
    }

    /// Build the store and controller from a loaded configuration.
    pub fn from_config(
        config: &ControllerConfig,
        element: Arc<dyn MediaElement>,
        source: Option<PlaybackSource>,
        deps: ControllerDeps,
    ) -> Self {
        let store = create_controller_store(element.as_ref(), config.to_initial_props(), source);
        Self::attach(
            store,
            element,
            deps,
            config.to_controls_options(),
            config.backoff.clone(),
        )
    }

    pub fn store(&self) -> &ControllerStore {
        &self.store
    }

    pub fn is_destroyed(&self) -> bool {
        self.effects.is_destroyed()
    }

    /// Stop everything. The active source is released in the background.
    /// Idempotent.
    pub fn destroy(&self) {
        if self.effects.is_destroyed() {
            return;
        }
        self.probe_token.cancel();
        self.effects.destroy();
        self.bridge.detach();
        self.store.destroy();
        info!("Controller {} destroyed", self.store.id());
    }

    /// Like [`MediaController::destroy`], but waits for the active source to
    /// be released.
    pub async fn shutdown(&self) {
        self.probe_token.cancel();
        self.effects.shutdown().await;
        self.bridge.detach();
        if !self.store.is_destroyed() {
            self.store.destroy();
            info!("Controller {} shut down", self.store.id());
        }
    }
}

impl Drop for MediaController {
    fn drop(&mut self) {
        self.destroy();
    }
}
