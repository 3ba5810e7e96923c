#[cfg(test)]
mod tests {
    use crate::backoff::BackoffConfig;
    use crate::config::ControllerConfig;
    use crate::controller::{create_controller_store, ControllerDeps, MediaController};
    use crate::device::{CapabilityProbe, ElementCapabilityProbe, ElementFactory};
    use crate::element::{EventKind, EventTarget, MediaElement, INITIALIZED_ATTRIBUTE};
    use crate::metrics::{add_media_metrics, ChannelSink};
    use crate::mock::{MockMediaElement, MockTransport, MockUrlProbe, SessionBehavior};
    use crate::transport::Transports;
    use crate::types::{ControlsOptions, InitialProps};
    use common::{MediaKind, MetricsMessage, PlaybackSource, SourceKind};
    use std::sync::Arc;
    use std::time::Duration;

    const STREAM: &str = "https://cdn.test/hls/a/index.m3u8";

    fn deps(transport: &Arc<MockTransport>) -> ControllerDeps {
        ControllerDeps {
            transports: Transports::new()
                .with_hls(transport.clone())
                .with_webrtc(transport.clone()),
            url_probe: Arc::new(MockUrlProbe::default()),
            capability_probe: None,
        }
    }

    fn create_test_controller(
        element: &Arc<MockMediaElement>,
        transport: &Arc<MockTransport>,
    ) -> MediaController {
        let store = create_controller_store(
            element.as_ref(),
            InitialProps::default(),
            Some(PlaybackSource::hls(STREAM)),
        );
        MediaController::attach(
            store,
            element.clone() as Arc<dyn MediaElement>,
            deps(transport),
            ControlsOptions::default(),
            BackoffConfig::default(),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_mounts_and_connects() {
        let element = Arc::new(MockMediaElement::new());
        let transport = Arc::new(MockTransport::new());
        transport.push_behavior(SessionBehavior::Connect {
            live: true,
            duration: f64::INFINITY,
        });

        let controller = create_test_controller(&element, &transport);
        settle().await;

        let state = controller.store().get_state();
        assert!(state.mounted);
        assert!(state.can_play);
        assert!(state.live);
        assert_eq!(state.duration, 0.0);
        assert_eq!(transport.start_count(), 1);

        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_restores_element() {
        let element = Arc::new(MockMediaElement::new());
        let transport = Arc::new(MockTransport::new());
        let controller = create_test_controller(&element, &transport);
        settle().await;
        assert!(element.listener_count() > 0);

        controller.destroy();
        controller.destroy();
        settle().await;

        assert!(controller.is_destroyed());
        assert!(controller.store().is_destroyed());
        assert_eq!(controller.store().listener_count(), 0);
        assert_eq!(element.listener_count(), 0);
        assert!(element
            .attribute(EventTarget::Media, INITIALIZED_ATTRIBUTE)
            .is_none());
        assert_eq!(transport.active_count(), 0);

        // a late transport callback cannot revive the store
        transport.last_session().unwrap().events().on_can_play();
        assert!(!controller.store().get_state().can_play);

        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_source() {
        let element = Arc::new(MockMediaElement::new());
        let transport = Arc::new(MockTransport::new());
        {
            let _controller = create_test_controller(&element, &transport);
            settle().await;
            assert_eq!(transport.active_count(), 1);
        }
        settle().await;

        assert_eq!(transport.active_count(), 0);
        assert_eq!(element.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_keeps_session() {
        let element = Arc::new(MockMediaElement::new());
        let transport = Arc::new(MockTransport::new());
        let controller = create_test_controller(&element, &transport);
        settle().await;

        controller.store().set_mounted(false);
        settle().await;
        assert_eq!(transport.active_count(), 1);

        controller.store().set_mounted(true);
        settle().await;
        assert_eq!(transport.start_count(), 2);
        assert_eq!(transport.max_active(), 1);

        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_capability_probe_updates_device() {
        let element = Arc::new(MockMediaElement::new());
        let transport = Arc::new(MockTransport::new());
        let factory: ElementFactory = Arc::new(|_kind: MediaKind| {
            Arc::new(MockMediaElement::new().with_locked_volume()) as Arc<dyn MediaElement>
        });
        let probe: Arc<dyn CapabilityProbe> = Arc::new(ElementCapabilityProbe::new(factory));

        let store = create_controller_store(
            element.as_ref(),
            InitialProps::default(),
            Some(PlaybackSource::hls(STREAM)),
        );
        assert!(store.get_state().device.is_volume_change_supported);

        let controller = MediaController::attach(
            store,
            element.clone() as Arc<dyn MediaElement>,
            ControllerDeps {
                capability_probe: Some(probe),
                ..deps(&transport)
            },
            ControlsOptions::default(),
            BackoffConfig::default(),
        );
        settle().await;

        let device = controller.store().get_state().device;
        assert!(!device.is_volume_change_supported);
        assert!(device.is_picture_in_picture_supported);

        controller.store().set_volume(0.3);
        assert_eq!(element.volume(), 1.0);

        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config() {
        let element = Arc::new(MockMediaElement::new());
        let transport = Arc::new(MockTransport::new());
        let mut config = ControllerConfig::default();
        config.player.hotkeys = false;
        config.controls.autohide = Duration::ZERO;
        config.access.jwt = Some("J1".to_string());

        let controller = MediaController::from_config(
            &config,
            element.clone() as Arc<dyn MediaElement>,
            Some(PlaybackSource::from_url(STREAM)),
            deps(&transport),
        );
        settle().await;

        let state = controller.store().get_state();
        assert!(!state.initial_props.hotkeys);
        assert_eq!(state.initial_props.jwt.as_deref(), Some("J1"));
        assert_eq!(
            element.listener_count_for(EventTarget::Container, EventKind::KeyUp),
            0
        );
        assert_eq!(
            transport.last_session().unwrap().kind,
            SourceKind::Hls
        );

        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_metrics_without_controls() {
        let element = Arc::new(MockMediaElement::new());
        let (sink, mut rx) = ChannelSink::new(32);

        let metrics = add_media_metrics(
            element.clone() as Arc<dyn MediaElement>,
            Some("https://cdn.test/video.mp4".to_string()),
            Arc::new(sink),
            Arc::new(MockUrlProbe::default()),
            Duration::from_secs(5),
            None,
        );

        assert_eq!(
            element.listener_count_for(EventTarget::Container, EventKind::KeyUp),
            0
        );
        assert_eq!(
            element.listener_count_for(EventTarget::Container, EventKind::MouseMove),
            0
        );

        element.dispatch(EventKind::Play);
        tokio::time::sleep(Duration::from_secs(2)).await;
        element.dispatch(EventKind::Waiting);
        element.dispatch(EventKind::Pause);

        let report = metrics.snapshot();
        assert_eq!(report.source_kind, Some(SourceKind::Progressive));
        assert_eq!(report.playtime_ms, 2000);
        assert_eq!(report.waiting_count, 1);

        metrics.shutdown().await;
        assert_eq!(element.listener_count(), 0);
        assert!(metrics.store.is_destroyed());

        let mut last = None;
        while let Ok(message) = rx.try_recv() {
            last = Some(message);
        }
        assert!(matches!(last, Some(MetricsMessage::SessionEnded { .. })));
    }
}
