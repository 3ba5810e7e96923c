use crate::element::MediaElement;
use crate::errors::ProbeError;
use crate::store::ControllerStore;
use crate::types::DeviceInfo;
use async_trait::async_trait;
use common::MediaKind;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Volume written to a scratch element to see whether the runtime honours it.
const PROBE_VOLUME: f64 = 0.342;

/// Capabilities the probe may prove or disprove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbedCapabilities {
    pub is_volume_change_supported: bool,
    pub is_picture_in_picture_supported: bool,
}

#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    async fn probe(&self, kind: MediaKind) -> Result<ProbedCapabilities, ProbeError>;
}

pub type ElementFactory = Arc<dyn Fn(MediaKind) -> Arc<dyn MediaElement> + Send + Sync>;

/// Probe that exercises a freshly created scratch element.
pub struct ElementCapabilityProbe {
    factory: ElementFactory,
}

impl ElementCapabilityProbe {
    pub fn new(factory: ElementFactory) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl CapabilityProbe for ElementCapabilityProbe {
    async fn probe(&self, kind: MediaKind) -> Result<ProbedCapabilities, ProbeError> {
        let element = (self.factory)(kind);

        element.set_volume(PROBE_VOLUME);
        // some runtimes apply the write on the next tick
        tokio::task::yield_now().await;
        let is_volume_change_supported = (element.volume() - PROBE_VOLUME).abs() < f64::EPSILON;

        let is_picture_in_picture_supported =
            kind == MediaKind::Video && element.supports_picture_in_picture();

        Ok(ProbedCapabilities {
            is_volume_change_supported,
            is_picture_in_picture_supported,
        })
    }
}

/// Capabilities known synchronously at creation time. Volume change is
/// assumed until the async probe disproves it.
pub fn initial_device_info(element: &dyn MediaElement, kind: MediaKind) -> DeviceInfo {
    DeviceInfo {
        is_volume_change_supported: true,
        is_picture_in_picture_supported: kind == MediaKind::Video
            && element.supports_picture_in_picture(),
        is_fullscreen_supported: element.supports_fullscreen(),
    }
}

/// Run `probe` in the background and write the result into the store.
///
/// Failures are logged and swallowed. Cancelling `token` drops the result.
pub fn spawn_device_probe(
    store: ControllerStore,
    probe: Arc<dyn CapabilityProbe>,
    kind: MediaKind,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = probe.probe(kind) => result,
        };

        match result {
            Ok(capabilities) => {
                if token.is_cancelled() {
                    return;
                }
                debug!("Device capabilities for {:?}: {:?}", kind, capabilities);
                store.update_device(|device| {
                    device.is_volume_change_supported = capabilities.is_volume_change_supported;
                    device.is_picture_in_picture_supported =
                        capabilities.is_picture_in_picture_supported;
                });
            }
            Err(e) => {
                warn!("Device capability probe failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockMediaElement;
    use crate::types::InitialProps;

    fn factory(locked: bool, pip: bool) -> ElementFactory {
        Arc::new(move |_kind| {
            let mut element = MockMediaElement::new().with_picture_in_picture_supported(pip);
            if locked {
                element = element.with_locked_volume();
            }
            Arc::new(element) as Arc<dyn MediaElement>
        })
    }

    struct FailingProbe;

    #[async_trait]
    impl CapabilityProbe for FailingProbe {
        async fn probe(&self, _kind: MediaKind) -> Result<ProbedCapabilities, ProbeError> {
            Err(ProbeError::Unavailable {
                reason: "no scratch element".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_probe_detects_locked_volume() {
        let probe = ElementCapabilityProbe::new(factory(true, true));
        let capabilities = probe.probe(MediaKind::Video).await.unwrap();
        assert!(!capabilities.is_volume_change_supported);
        assert!(capabilities.is_picture_in_picture_supported);

        let probe = ElementCapabilityProbe::new(factory(false, true));
        let capabilities = probe.probe(MediaKind::Audio).await.unwrap();
        assert!(capabilities.is_volume_change_supported);
        assert!(!capabilities.is_picture_in_picture_supported);
    }

    #[tokio::test]
    async fn test_probe_result_written_to_store() {
        let store = ControllerStore::new(InitialProps::default(), None, DeviceInfo::default());
        let probe: Arc<dyn CapabilityProbe> =
            Arc::new(ElementCapabilityProbe::new(factory(true, false)));

        spawn_device_probe(store.clone(), probe, MediaKind::Video, CancellationToken::new())
            .await
            .unwrap();

        let device = store.get_state().device;
        assert!(!device.is_volume_change_supported);
        assert!(!device.is_picture_in_picture_supported);
        assert!(device.is_fullscreen_supported);
    }

    #[tokio::test]
    async fn test_probe_failure_is_swallowed() {
        let store = ControllerStore::new(InitialProps::default(), None, DeviceInfo::default());

        spawn_device_probe(
            store.clone(),
            Arc::new(FailingProbe),
            MediaKind::Video,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(store.get_state().device, DeviceInfo::default());
    }

    #[tokio::test]
    async fn test_probe_after_destroy_is_ignored() {
        let store = ControllerStore::new(InitialProps::default(), None, DeviceInfo::default());
        store.destroy();

        let probe: Arc<dyn CapabilityProbe> =
            Arc::new(ElementCapabilityProbe::new(factory(true, false)));
        spawn_device_probe(store.clone(), probe, MediaKind::Video, CancellationToken::new())
            .await
            .unwrap();

        assert!(store.get_state().device.is_volume_change_supported);
    }

    #[test]
    fn test_initial_device_info() {
        let element = MockMediaElement::new().with_picture_in_picture_supported(true);
        let info = initial_device_info(&element, MediaKind::Audio);
        assert!(!info.is_picture_in_picture_supported);
        assert!(info.is_volume_change_supported);
    }
}
