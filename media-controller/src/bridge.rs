use crate::element::{
    EventDetail, EventHandler, EventKind, EventTarget, ListenerId, MediaElement, MediaEvent,
    TimeRange, INITIALIZED_ATTRIBUTE,
};
use crate::errors::ProbeError;
use crate::store::ControllerStore;
use crate::types::SizeUpdate;
use async_trait::async_trait;
use common::{
    PlaybackError, PlaybackRate, PlaybackSource, UNKNOWN_VIDEO_ERROR_MESSAGE,
    VIDEO_FETCH_ERROR_MESSAGE,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const URL_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// URL Probe
// ============================================================================

/// Fetches a media URL to explain an element error by its HTTP status.
#[async_trait]
pub trait UrlProbe: Send + Sync {
    async fn status(&self, url: &str) -> Result<u16, ProbeError>;
}

pub struct HttpUrlProbe {
    client: reqwest::Client,
}

impl HttpUrlProbe {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(URL_PROBE_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlProbe for HttpUrlProbe {
    async fn status(&self, url: &str) -> Result<u16, ProbeError> {
        let url = url::Url::parse(url).map_err(|_| ProbeError::InvalidUrl {
            url: url.to_string(),
        })?;
        let response = self.client.get(url).send().await?;
        Ok(response.status().as_u16())
    }
}

/// Map the outcome of a URL probe onto the stored error.
pub fn classify_probe_result(result: Result<u16, ProbeError>) -> PlaybackError {
    match result {
        Ok(404) => {
            warn!("Video not found");
            PlaybackError::offline()
        }
        Ok(401) => {
            warn!("Unauthorized to view video");
            PlaybackError::access_control()
        }
        Ok(status) => {
            warn!("Unknown error loading video (HTTP {})", status);
            PlaybackError::unknown(UNKNOWN_VIDEO_ERROR_MESSAGE)
        }
        Err(e) => {
            warn!("Failed to fetch video URL: {}", e);
            PlaybackError::unknown(VIDEO_FETCH_ERROR_MESSAGE)
        }
    }
}

// ============================================================================
// Pure helpers
// ============================================================================

/// End of the buffered range containing `current_time`, scanning from the
/// most recent range; 0 when no range contains the playhead.
pub fn effective_buffered(ranges: &[TimeRange], current_time: f64) -> f64 {
    ranges
        .iter()
        .rev()
        .find(|range| range.contains(current_time))
        .map(|range| range.end)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    TogglePlay,
    ToggleFullscreen,
    TogglePictureInPicture,
    SeekForward,
    SeekBack,
    ToggleMute,
    Clip,
}

pub fn hotkey_action(code: &str) -> Option<HotkeyAction> {
    match code {
        "Space" | "KeyK" => Some(HotkeyAction::TogglePlay),
        "KeyF" => Some(HotkeyAction::ToggleFullscreen),
        "KeyI" => Some(HotkeyAction::TogglePictureInPicture),
        "ArrowRight" => Some(HotkeyAction::SeekForward),
        "ArrowLeft" => Some(HotkeyAction::SeekBack),
        "KeyM" => Some(HotkeyAction::ToggleMute),
        "KeyX" => Some(HotkeyAction::Clip),
        _ => None,
    }
}

fn apply_hotkey(store: &ControllerStore, action: HotkeyAction) {
    match action {
        HotkeyAction::TogglePlay => store.toggle_play(),
        HotkeyAction::ToggleFullscreen => store.request_toggle_fullscreen(),
        HotkeyAction::TogglePictureInPicture => store.request_toggle_picture_in_picture(),
        HotkeyAction::SeekForward => store.request_seek_forward(),
        HotkeyAction::SeekBack => store.request_seek_back(),
        HotkeyAction::ToggleMute => store.request_toggle_mute(),
        HotkeyAction::Clip => store.request_clip(),
    }
}

/// Available size pairs of the element; unknown pairs are left out.
pub fn measure(element: &dyn MediaElement) -> SizeUpdate {
    let media = element.video_size();
    SizeUpdate {
        media: media.is_available().then_some(media),
        container: element.container_size().filter(|size| size.is_available()),
    }
}

// ============================================================================
// Event Bridge
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Zero disables the pointer listeners.
    pub autohide: Duration,
}

/// Native element events translated into store intents.
///
/// The bridge reads from the element but never commands it, with the one
/// exception of the initial `load()` at attach time.
pub struct EventBridge {
    element: Arc<dyn MediaElement>,
    listeners: Mutex<Vec<ListenerId>>,
    tabindex_set: bool,
    token: CancellationToken,
}

struct BridgeContext {
    store: ControllerStore,
    element: Weak<dyn MediaElement>,
    url_probe: Arc<dyn UrlProbe>,
    runtime: Option<Handle>,
    token: CancellationToken,
}

impl BridgeContext {
    fn element(&self) -> Option<Arc<dyn MediaElement>> {
        self.element.upgrade()
    }

    fn on_time_update(&self) {
        let Some(element) = self.element() else {
            return;
        };
        let current_time = element.current_time();
        self.store.on_progress(current_time);

        if element.duration() > 0.0 {
            let buffered = effective_buffered(&element.buffered(), current_time);
            self.store.update_buffered(buffered);
        }
    }

    fn on_volume_change(&self) {
        if let Some(element) = self.element() {
            let volume = if element.muted() { 0.0 } else { element.volume() };
            self.store.set_volume(volume);
        }
    }

    fn on_key(&self, event: &MediaEvent) {
        self.store.update_last_interaction();

        if let EventDetail::Key { code } = &event.detail {
            if let Some(action) = hotkey_action(code) {
                debug!("Hotkey {} -> {:?}", code, action);
                apply_hotkey(&self.store, action);
            }
        }
    }

    fn on_error(&self, event: &MediaEvent) {
        let element = self.element();
        let info = match &event.detail {
            EventDetail::Error(info) => Some(info.clone()),
            _ => element.as_ref().and_then(|element| element.error()),
        };

        let source = self.store.read(|state| state.current_source.clone());
        let network_related = info
            .as_ref()
            .map_or(true, |info| info.code.is_network_related());

        let Some(PlaybackSource::Progressive { src, .. }) = source.filter(|_| network_related)
        else {
            let message = info
                .map(|info| info.message)
                .unwrap_or_else(|| "media error".to_string());
            self.store.on_error(PlaybackError::media(message));
            return;
        };

        let url = element.and_then(|element| element.current_src()).unwrap_or(src);

        let Some(runtime) = self.runtime.clone() else {
            warn!("No async runtime to probe {}, reporting unknown error", url);
            self.store
                .on_error(PlaybackError::unknown(UNKNOWN_VIDEO_ERROR_MESSAGE));
            return;
        };

        let store = self.store.clone();
        let probe = self.url_probe.clone();
        let token = self.token.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = probe.status(&url) => {
                    if !token.is_cancelled() {
                        store.on_error(classify_probe_result(result));
                    }
                }
            }
        });
    }

    fn on_resize(&self) {
        if let Some(element) = self.element() {
            self.store.set_size(measure(element.as_ref()));
        }
    }
}

impl EventBridge {
    pub fn attach(
        store: &ControllerStore,
        element: Arc<dyn MediaElement>,
        url_probe: Arc<dyn UrlProbe>,
        options: BridgeOptions,
    ) -> Self {
        let token = CancellationToken::new();
        let context = Arc::new(BridgeContext {
            store: store.clone(),
            element: Arc::downgrade(&element),
            url_probe,
            runtime: Handle::try_current().ok(),
            token: token.clone(),
        });

        let mut listeners = Vec::new();
        let mut listen = |target: EventTarget, kind: EventKind, f: fn(&BridgeContext, &MediaEvent)| {
            let context = context.clone();
            let handler: EventHandler = Arc::new(move |event: &MediaEvent| f(&context, event));
            listeners.push(element.add_event_listener(target, kind, handler));
        };

        use EventKind::*;
        use EventTarget::{Container, Media};

        listen(Media, VolumeChange, |ctx, _| ctx.on_volume_change());
        listen(Media, RateChange, |ctx, _| {
            if let Some(element) = ctx.element() {
                ctx.store
                    .set_playback_rate(PlaybackRate::Rate(element.playback_rate()));
            }
        });
        listen(Media, LoadedMetadata, |ctx, _| ctx.store.on_can_play());
        listen(Media, Play, |ctx, _| ctx.store.on_play());
        listen(Media, Pause, |ctx, _| ctx.store.on_pause());
        listen(Media, DurationChange, |ctx, _| {
            let duration = ctx.element().map_or(0.0, |element| element.duration());
            ctx.store.on_duration_change(duration);
        });
        listen(Media, TimeUpdate, |ctx, _| ctx.on_time_update());
        listen(Media, Error, |ctx, event| ctx.on_error(event));
        listen(Media, Waiting, |ctx, _| ctx.store.on_waiting());
        listen(Media, Stalled, |ctx, _| ctx.store.on_stalled());
        listen(Media, LoadStart, |ctx, _| ctx.store.on_loading());
        listen(Media, Resize, |ctx, _| ctx.on_resize());
        listen(Media, Ended, |ctx, _| ctx.store.on_ended());
        listen(Media, EnterPictureInPicture, |ctx, _| {
            ctx.store.set_picture_in_picture(true)
        });
        listen(Media, LeavePictureInPicture, |ctx, _| {
            ctx.store.set_picture_in_picture(false)
        });
        listen(Container, FullscreenChange, |ctx, _| {
            if let Some(element) = ctx.element() {
                ctx.store.set_fullscreen(element.is_fullscreen());
            }
        });

        if !options.autohide.is_zero() {
            for kind in [
                MouseMove, MouseOver, MouseEnter, MouseOut, TouchStart, TouchMove, TouchEnd,
            ] {
                listen(Container, kind, |ctx, _| ctx.store.update_last_interaction());
            }
        }

        let hotkeys = store.read(|state| state.initial_props.hotkeys);
        if hotkeys {
            listen(Container, KeyUp, |ctx, event| ctx.on_key(event));
        }

        context.on_resize();

        let tabindex_set = hotkeys && element.attribute(Container, "tabindex").is_none();
        if tabindex_set {
            element.set_attribute(Container, "tabindex", "0");
        }

        element.load();
        element.set_attribute(Media, INITIALIZED_ATTRIBUTE, "true");

        debug!(
            "Event bridge attached to store {} ({} listeners)",
            store.id(),
            listeners.len()
        );

        Self {
            element,
            listeners: Mutex::new(listeners),
            tabindex_set,
            token,
        }
    }

    /// Remove exactly the listeners added by `attach`. Idempotent.
    pub fn detach(&self) {
        let listeners = std::mem::take(&mut *self.listeners.lock());
        if listeners.is_empty() {
            return;
        }

        self.token.cancel();
        for id in listeners {
            self.element.remove_event_listener(id);
        }
        if self.tabindex_set {
            self.element.remove_attribute(EventTarget::Container, "tabindex");
        }
        self.element
            .remove_attribute(EventTarget::Media, INITIALIZED_ATTRIBUTE);
        debug!("Event bridge detached");
    }

    pub fn is_attached(&self) -> bool {
        !self.listeners.lock().is_empty()
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_effective_buffered() {
        let ranges = [TimeRange::new(0.0, 10.0), TimeRange::new(20.0, 35.0)];
        assert_eq!(effective_buffered(&ranges, 5.0), 10.0);
        assert_eq!(effective_buffered(&ranges, 25.0), 35.0);
        assert_eq!(effective_buffered(&ranges, 15.0), 0.0);
        assert_eq!(effective_buffered(&[], 1.0), 0.0);
    }

    #[test]
    fn test_hotkey_mapping() {
        assert_eq!(hotkey_action("Space"), Some(HotkeyAction::TogglePlay));
        assert_eq!(hotkey_action("KeyK"), Some(HotkeyAction::TogglePlay));
        assert_eq!(hotkey_action("KeyX"), Some(HotkeyAction::Clip));
        assert_eq!(hotkey_action("KeyV"), None);
        assert_eq!(hotkey_action("Enter"), None);
    }

    #[test]
    fn test_classify_probe_result() {
        assert!(classify_probe_result(Ok(404)).is_offline());
        assert!(classify_probe_result(Ok(401)).is_access_control());
        assert_eq!(
            classify_probe_result(Ok(500)).message,
            UNKNOWN_VIDEO_ERROR_MESSAGE
        );
        let error = classify_probe_result(Err(ProbeError::InvalidUrl {
            url: "nope".to_string(),
        }));
        assert_eq!(error.message, VIDEO_FETCH_ERROR_MESSAGE);
    }

    proptest! {
        #[test]
        fn prop_buffered_is_zero_or_covering_end(
            bounds in proptest::collection::vec((0.0f64..100.0, 0.0f64..20.0), 0..6),
            time in 0.0f64..120.0,
        ) {
            let ranges: Vec<TimeRange> = bounds
                .iter()
                .map(|(start, len)| TimeRange::new(*start, start + len))
                .collect();
            let buffered = effective_buffered(&ranges, time);

            if ranges.iter().any(|range| range.contains(time)) {
                prop_assert!(ranges.iter().any(|r| r.contains(time) && r.end == buffered));
                prop_assert!(buffered >= time);
            } else {
                prop_assert_eq!(buffered, 0.0);
            }
        }
    }
}
