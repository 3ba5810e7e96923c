#[cfg(test)]
mod tests {
    use crate::bridge::{BridgeOptions, EventBridge, UrlProbe};
    use crate::element::{
        EventKind, EventTarget, MediaElement, MediaErrorCode, MediaErrorInfo, TimeRange,
        INITIALIZED_ATTRIBUTE,
    };
    use crate::mock::{MockMediaElement, MockUrlProbe};
    use crate::store::ControllerStore;
    use crate::types::{DeviceInfo, InitialProps};
    use common::{Dimensions, ErrorKind, PlaybackRate, PlaybackSource};
    use std::sync::Arc;
    use std::time::Duration;

    const VIDEO_URL: &str = "https://cdn.test/video.mp4";

    struct Fixture {
        store: ControllerStore,
        element: Arc<MockMediaElement>,
        probe: Arc<MockUrlProbe>,
        bridge: EventBridge,
    }

    fn fixture(props: InitialProps, source: PlaybackSource, autohide: Duration) -> Fixture {
        fixture_with(MockMediaElement::new(), props, source, autohide)
    }

    fn fixture_with(
        element: MockMediaElement,
        props: InitialProps,
        source: PlaybackSource,
        autohide: Duration,
    ) -> Fixture {
        let store = ControllerStore::new(props, Some(source), DeviceInfo::default());
        let element = Arc::new(element);
        let probe = Arc::new(MockUrlProbe::with_status(401));
        let bridge = EventBridge::attach(
            &store,
            element.clone() as Arc<dyn MediaElement>,
            probe.clone() as Arc<dyn UrlProbe>,
            BridgeOptions { autohide },
        );
        Fixture {
            store,
            element,
            probe,
            bridge,
        }
    }

    fn progressive() -> Fixture {
        fixture(
            InitialProps::default(),
            PlaybackSource::progressive(VIDEO_URL),
            Duration::from_secs(3),
        )
    }

    fn network_error() -> MediaErrorInfo {
        MediaErrorInfo {
            code: MediaErrorCode::Network,
            message: "network failure".to_string(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn test_attach_prepares_element() {
        let f = progressive();

        assert!(f.bridge.is_attached());
        assert_eq!(f.element.load_count(), 1);
        assert_eq!(
            f.element.attribute(EventTarget::Media, INITIALIZED_ATTRIBUTE).as_deref(),
            Some("true")
        );
        assert_eq!(
            f.element.attribute(EventTarget::Container, "tabindex").as_deref(),
            Some("0")
        );
        assert_eq!(
            f.element
                .listener_count_for(EventTarget::Container, EventKind::KeyUp),
            1
        );
        assert_eq!(
            f.element
                .listener_count_for(EventTarget::Container, EventKind::MouseMove),
            1
        );

        let size = f.store.read(|state| state.size);
        assert_eq!(size.container, Some(Dimensions::new(1280, 720)));
        assert_eq!(size.media, None);
        // the initial load() is reported back as loadstart
        assert!(f.store.read(|state| state.loading));
    }

    #[tokio::test]
    async fn test_detach_leaves_element_pristine() {
        let f = progressive();
        f.bridge.detach();
        f.bridge.detach();

        assert!(!f.bridge.is_attached());
        assert_eq!(f.element.listener_count(), 0);
        assert!(f
            .element
            .attribute(EventTarget::Media, INITIALIZED_ATTRIBUTE)
            .is_none());
        assert!(f
            .element
            .attribute(EventTarget::Container, "tabindex")
            .is_none());

        f.element.dispatch(EventKind::Play);
        assert!(!f.store.read(|state| state.playing));
    }

    #[tokio::test]
    async fn test_existing_tabindex_is_kept() {
        let element = MockMediaElement::new();
        element.set_attribute(EventTarget::Container, "tabindex", "3");
        let f = fixture_with(
            element,
            InitialProps::default(),
            PlaybackSource::progressive(VIDEO_URL),
            Duration::ZERO,
        );
        drop(f.bridge);

        assert_eq!(
            f.element.attribute(EventTarget::Container, "tabindex").as_deref(),
            Some("3")
        );
        assert_eq!(f.element.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_progressive_401_is_access_control() {
        let f = progressive();
        f.element.raise_error(network_error());
        settle().await;

        let state = f.store.get_state();
        assert_eq!(state.error.as_ref().unwrap().kind, ErrorKind::AccessControl);
        assert_eq!(state.error_count, 1);
        assert_eq!(f.probe.urls(), vec![VIDEO_URL.to_string()]);
    }

    #[tokio::test]
    async fn test_progressive_404_is_offline() {
        let f = progressive();
        f.probe.set_status(Some(404));
        f.element.raise_error(network_error());
        settle().await;

        assert!(f.store.get_state().error.as_ref().unwrap().is_offline());
    }

    #[tokio::test]
    async fn test_unreachable_probe_reports_fetch_error() {
        let f = progressive();
        f.probe.set_status(None);
        f.element.raise_error(network_error());
        settle().await;

        let error = f.store.get_state().error.clone().unwrap();
        assert_eq!(error.kind, ErrorKind::Unknown);
        assert_eq!(error.message, common::VIDEO_FETCH_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_decode_error_skips_probe() {
        let f = progressive();
        f.element.raise_error(MediaErrorInfo {
            code: MediaErrorCode::Decode,
            message: "bad frame".to_string(),
        });
        settle().await;

        let error = f.store.get_state().error.clone().unwrap();
        assert_eq!(error.kind, ErrorKind::Media);
        assert_eq!(error.message, "bad frame");
        assert_eq!(f.probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_hls_element_error_skips_probe() {
        let f = fixture(
            InitialProps::default(),
            PlaybackSource::hls("https://cdn.test/hls/a/index.m3u8"),
            Duration::ZERO,
        );
        f.element.raise_error(network_error());
        settle().await;

        assert_eq!(f.store.get_state().error.as_ref().unwrap().kind, ErrorKind::Media);
        assert_eq!(f.probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_probe_result_dropped_after_detach() {
        let f = progressive();
        f.element.raise_error(network_error());
        f.bridge.detach();
        settle().await;

        assert_eq!(f.store.get_state().error_count, 0);
    }

    #[tokio::test]
    async fn test_hotkeys() {
        let f = progressive();

        f.element.press_key("Space");
        assert!(f.store.read(|state| state.controls.requested_play_pause_last_time) > 0);

        f.element.press_key("KeyM");
        assert!(f.store.read(|state| state.muted));

        f.element.press_key("ArrowRight");
        assert_eq!(f.store.read(|state| state.progress), 5.0);
        f.element.press_key("ArrowLeft");
        assert_eq!(f.store.read(|state| state.progress), 0.0);

        f.element.press_key("KeyF");
        f.element.press_key("KeyI");
        let controls = f.store.read(|state| state.controls.clone());
        assert!(controls.requested_fullscreen_last_time > 0);
        assert!(controls.requested_picture_in_picture_last_time > 0);

        let before = f.store.get_state();
        f.element.press_key("KeyV");
        let after = f.store.get_state();
        assert!(after.controls.last_interaction > before.controls.last_interaction);
        assert_eq!(after.controls.requested_seek, before.controls.requested_seek);
        assert_eq!(after.muted, before.muted);
    }

    #[tokio::test]
    async fn test_hotkeys_disabled() {
        let props = InitialProps {
            hotkeys: false,
            ..InitialProps::default()
        };
        let f = fixture(props, PlaybackSource::progressive(VIDEO_URL), Duration::ZERO);

        assert_eq!(
            f.element
                .listener_count_for(EventTarget::Container, EventKind::KeyUp),
            0
        );
        assert_eq!(
            f.element
                .listener_count_for(EventTarget::Container, EventKind::MouseMove),
            0
        );
        assert!(f
            .element
            .attribute(EventTarget::Container, "tabindex")
            .is_none());
    }

    #[tokio::test]
    async fn test_pointer_activity_updates_interaction() {
        let f = progressive();
        for kind in [
            EventKind::MouseMove,
            EventKind::MouseOver,
            EventKind::MouseEnter,
            EventKind::MouseOut,
            EventKind::TouchStart,
            EventKind::TouchMove,
            EventKind::TouchEnd,
        ] {
            assert_eq!(f.element.listener_count_for(EventTarget::Container, kind), 1);

            let before = f.store.read(|state| state.controls.last_interaction);
            f.element
                .dispatch_to(EventTarget::Container, crate::element::MediaEvent::new(kind));
            let after = f.store.read(|state| state.controls.last_interaction);
            assert!(after > before, "{:?} did not count as an interaction", kind);
        }
    }

    #[tokio::test]
    async fn test_time_update_reports_progress_and_buffer() {
        let f = progressive();
        f.element.set_duration_value(100.0);
        f.element.set_current_time_value(12.0);
        f.element.set_buffered_ranges(vec![
            TimeRange::new(0.0, 5.0),
            TimeRange::new(10.0, 30.0),
        ]);
        f.store.on_waiting();

        f.element.dispatch(EventKind::TimeUpdate);
        let state = f.store.get_state();
        assert_eq!(state.progress, 12.0);
        assert_eq!(state.buffered, 30.0);
        assert!(!state.waiting);
    }

    #[tokio::test]
    async fn test_media_feedback_events() {
        let f = progressive();

        f.element.set_muted(true);
        assert_eq!(f.store.read(|state| state.volume), 0.0);
        f.element.set_muted(false);
        f.element.set_volume(0.3);
        assert_eq!(f.store.read(|state| state.volume), 0.3);

        f.element.set_playback_rate(2.0);
        assert_eq!(f.store.read(|state| state.playback_rate), PlaybackRate::Rate(2.0));

        f.element.dispatch(EventKind::LoadedMetadata);
        assert!(f.store.read(|state| state.can_play));

        f.element.set_duration_value(f64::INFINITY);
        f.element.dispatch(EventKind::DurationChange);
        assert_eq!(f.store.read(|state| state.duration), 0.0);

        f.element.dispatch(EventKind::Stalled);
        f.element.dispatch(EventKind::Ended);
        let state = f.store.get_state();
        assert!(state.stalled);
        assert!(state.ended);

        f.element.set_video_size_value(Dimensions::new(1920, 1080));
        f.element.dispatch(EventKind::Resize);
        assert_eq!(
            f.store.read(|state| state.size.media),
            Some(Dimensions::new(1920, 1080))
        );
    }

    #[tokio::test]
    async fn test_fullscreen_and_pip_feedback() {
        let f = progressive();

        f.element.request_fullscreen().await.unwrap();
        assert!(f.store.read(|state| state.fullscreen));
        f.element.exit_fullscreen().await.unwrap();
        assert!(!f.store.read(|state| state.fullscreen));

        f.element.request_picture_in_picture().await.unwrap();
        assert!(f.store.read(|state| state.picture_in_picture));
        f.element.exit_picture_in_picture().await.unwrap();
        assert!(!f.store.read(|state| state.picture_in_picture));
    }

    #[tokio::test]
    async fn test_constant_rate_ignores_element_feedback() {
        let props = InitialProps {
            playback_rate: PlaybackRate::Constant,
            ..InitialProps::default()
        };
        let f = fixture(props, PlaybackSource::progressive(VIDEO_URL), Duration::ZERO);

        f.element.set_playback_rate(1.5);
        assert_eq!(f.store.read(|state| state.playback_rate), PlaybackRate::Constant);
    }
}
