pub mod backoff;
pub mod bridge;
#[cfg(test)]
mod bridge_test;
pub mod config;
pub mod controller;
#[cfg(test)]
mod controller_test;
pub mod device;
pub mod effects;
pub mod element;
pub mod errors;
pub mod intents;
pub mod metrics;
pub mod mock;
pub mod serde_helpers;
pub mod store;
pub mod transport;
pub mod types;

pub use backoff::BackoffConfig;
pub use bridge::{EventBridge, HttpUrlProbe, UrlProbe};
pub use config::{ConfigManager, ControllerConfig, EnvConfigOverride};
pub use controller::{create_controller_store, ControllerDeps, MediaController};
pub use element::{EventKind, EventTarget, MediaElement, MediaEvent};
pub use errors::*;
pub use metrics::{add_media_metrics, MediaMetrics, MetricsReporter, MetricsSink};
pub use store::{ControllerStore, Subscription};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockMediaElement, MockTransport, MockUrlProbe};
    use common::PlaybackSource;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_project_structure() {
        let element = Arc::new(MockMediaElement::new());
        let transport = Arc::new(MockTransport::new());
        let deps = ControllerDeps {
            transports: transport::Transports::new()
                .with_hls(transport.clone())
                .with_webrtc(transport),
            url_probe: Arc::new(MockUrlProbe::default()),
            capability_probe: None,
        };

        let controller = MediaController::from_config(
            &ControllerConfig::default(),
            element,
            Some(PlaybackSource::progressive("https://x/video.mp4")),
            deps,
        );
        assert!(controller.store().get_state().mounted);

        controller.shutdown().await;
        assert!(controller.store().is_destroyed());
    }

    #[test]
    fn test_error_types() {
        let error = ConfigError::Invalid {
            message: "bad".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid configuration: bad");

        let error = MetricsError::SinkClosed;
        assert!(matches!(error, MetricsError::SinkClosed));
    }
}
