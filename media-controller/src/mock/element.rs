use crate::element::{
    EventHandler, EventKind, EventTarget, ListenerId, MediaElement, MediaErrorInfo, MediaEvent,
    TimeRange,
};
use crate::errors::ElementError;
use async_trait::async_trait;
use common::Dimensions;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone)]
struct ElementState {
    paused: bool,
    current_time: f64,
    duration: f64,
    buffered: Vec<TimeRange>,
    ready_state: Option<u8>,
    volume: f64,
    muted: bool,
    playback_rate: f64,
    src: Option<String>,
    poster: Option<String>,
    error: Option<MediaErrorInfo>,
    video_size: Dimensions,
    container_size: Option<Dimensions>,
    fullscreen: bool,
    picture_in_picture: bool,
    attributes: HashMap<(EventTarget, String), String>,

    volume_locked: bool,
    fullscreen_supported: bool,
    picture_in_picture_supported: bool,
    picture_in_picture_error: Option<ElementError>,
    play_error: Option<ElementError>,

    seeks: Vec<f64>,
    load_count: usize,
    play_calls: usize,
    pause_calls: usize,
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            paused: true,
            current_time: 0.0,
            duration: f64::NAN,
            buffered: Vec::new(),
            ready_state: Some(0),
            volume: 1.0,
            muted: false,
            playback_rate: 1.0,
            src: None,
            poster: None,
            error: None,
            video_size: Dimensions::default(),
            container_size: Some(Dimensions::new(1280, 720)),
            fullscreen: false,
            picture_in_picture: false,
            attributes: HashMap::new(),
            volume_locked: false,
            fullscreen_supported: true,
            picture_in_picture_supported: true,
            picture_in_picture_error: None,
            play_error: None,
            seeks: Vec::new(),
            load_count: 0,
            play_calls: 0,
            pause_calls: 0,
        }
    }
}

struct Registration {
    id: ListenerId,
    target: EventTarget,
    kind: EventKind,
    handler: EventHandler,
}

/// In-memory media element that records every command and lets callers fire
/// native events by hand.
///
/// Property writes emit the matching change event synchronously, like a
/// browser would on the next task.
#[derive(Default)]
pub struct MockMediaElement {
    state: Mutex<ElementState>,
    listeners: Mutex<Vec<Registration>>,
    next_listener_id: AtomicU64,
}

impl MockMediaElement {
    pub fn new() -> Self {
        Self::default()
    }

    /// An element whose volume cannot be changed by script (iOS Safari).
    pub fn with_locked_volume(self) -> Self {
        self.state.lock().volume_locked = true;
        self
    }

    pub fn with_picture_in_picture_supported(self, supported: bool) -> Self {
        self.state.lock().picture_in_picture_supported = supported;
        self
    }

    pub fn with_fullscreen_supported(self, supported: bool) -> Self {
        self.state.lock().fullscreen_supported = supported;
        self
    }

    pub fn with_container_size(self, size: Option<Dimensions>) -> Self {
        self.state.lock().container_size = size;
        self
    }

    pub fn fail_picture_in_picture(&self, error: ElementError) {
        self.state.lock().picture_in_picture_error = Some(error);
    }

    pub fn fail_play(&self, error: Option<ElementError>) {
        self.state.lock().play_error = error;
    }

    // ------------------------------------------------------------------
    // Simulated media progress
    // ------------------------------------------------------------------

    pub fn set_duration_value(&self, duration: f64) {
        self.state.lock().duration = duration;
    }

    pub fn set_current_time_value(&self, time: f64) {
        self.state.lock().current_time = time;
    }

    pub fn set_buffered_ranges(&self, ranges: Vec<TimeRange>) {
        self.state.lock().buffered = ranges;
    }

    pub fn set_ready_state_value(&self, ready_state: Option<u8>) {
        self.state.lock().ready_state = ready_state;
    }

    pub fn set_video_size_value(&self, size: Dimensions) {
        self.state.lock().video_size = size;
    }

    pub fn set_container_size_value(&self, size: Option<Dimensions>) {
        self.state.lock().container_size = size;
    }

    pub fn set_error_value(&self, error: Option<MediaErrorInfo>) {
        self.state.lock().error = error;
    }

    // ------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------

    /// Fire `event` at every listener registered for its kind on `target`.
    pub fn dispatch_to(&self, target: EventTarget, event: MediaEvent) {
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .iter()
            .filter(|entry| entry.target == target && entry.kind == event.kind)
            .map(|entry| entry.handler.clone())
            .collect();

        for handler in handlers {
            handler(&event);
        }
    }

    /// Fire a detail-less event at the media element.
    pub fn dispatch(&self, kind: EventKind) {
        self.dispatch_to(EventTarget::Media, MediaEvent::new(kind));
    }

    /// Simulate a key press on the container.
    pub fn press_key(&self, code: &str) {
        self.dispatch_to(EventTarget::Container, MediaEvent::key(code));
    }

    /// Set the element error and fire the `error` event.
    pub fn raise_error(&self, info: MediaErrorInfo) {
        self.state.lock().error = Some(info.clone());
        self.dispatch_to(EventTarget::Media, MediaEvent::error(info));
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn listener_count_for(&self, target: EventTarget, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|entry| entry.target == target && entry.kind == kind)
            .count()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().seeks.clone()
    }

    pub fn load_count(&self) -> usize {
        self.state.lock().load_count
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }

    pub fn pause_calls(&self) -> usize {
        self.state.lock().pause_calls
    }

    pub fn poster(&self) -> Option<String> {
        self.state.lock().poster.clone()
    }
}

#[async_trait]
impl MediaElement for MockMediaElement {
    async fn play(&self) -> Result<(), ElementError> {
        {
            let mut state = self.state.lock();
            state.play_calls += 1;
            if let Some(error) = state.play_error.clone() {
                return Err(error);
            }
            if !state.paused {
                return Ok(());
            }
            state.paused = false;
        }
        self.dispatch(EventKind::Play);
        Ok(())
    }

    fn pause(&self) {
        {
            let mut state = self.state.lock();
            state.pause_calls += 1;
            if state.paused {
                return;
            }
            state.paused = true;
        }
        self.dispatch(EventKind::Pause);
    }

    fn paused(&self) -> bool {
        self.state.lock().paused
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, time: f64) {
        let mut state = self.state.lock();
        state.current_time = time;
        state.seeks.push(time);
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.state.lock().buffered.clone()
    }

    fn ready_state(&self) -> Option<u8> {
        self.state.lock().ready_state
    }

    fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    fn set_volume(&self, volume: f64) {
        {
            let mut state = self.state.lock();
            if state.volume_locked || state.volume == volume {
                return;
            }
            state.volume = volume;
        }
        self.dispatch(EventKind::VolumeChange);
    }

    fn muted(&self) -> bool {
        self.state.lock().muted
    }

    fn set_muted(&self, muted: bool) {
        {
            let mut state = self.state.lock();
            if state.muted == muted {
                return;
            }
            state.muted = muted;
        }
        self.dispatch(EventKind::VolumeChange);
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().playback_rate
    }

    fn set_playback_rate(&self, rate: f64) {
        {
            let mut state = self.state.lock();
            if state.playback_rate == rate {
                return;
            }
            state.playback_rate = rate;
        }
        self.dispatch(EventKind::RateChange);
    }

    fn current_src(&self) -> Option<String> {
        self.state.lock().src.clone()
    }

    fn set_src(&self, src: &str) {
        self.state.lock().src = Some(src.to_string());
    }

    fn load(&self) {
        {
            let mut state = self.state.lock();
            state.load_count += 1;
            state.error = None;
        }
        self.dispatch(EventKind::LoadStart);
    }

    fn set_poster(&self, poster: Option<&str>) {
        self.state.lock().poster = poster.map(str::to_string);
    }

    fn error(&self) -> Option<MediaErrorInfo> {
        self.state.lock().error.clone()
    }

    fn video_size(&self) -> Dimensions {
        self.state.lock().video_size
    }

    fn container_size(&self) -> Option<Dimensions> {
        self.state.lock().container_size
    }

    fn supports_fullscreen(&self) -> bool {
        self.state.lock().fullscreen_supported
    }

    fn is_fullscreen(&self) -> bool {
        self.state.lock().fullscreen
    }

    async fn request_fullscreen(&self) -> Result<(), ElementError> {
        {
            let mut state = self.state.lock();
            if !state.fullscreen_supported {
                return Err(ElementError::Unsupported {
                    feature: "fullscreen",
                });
            }
            state.fullscreen = true;
        }
        self.dispatch_to(
            EventTarget::Container,
            MediaEvent::new(EventKind::FullscreenChange),
        );
        Ok(())
    }

    async fn exit_fullscreen(&self) -> Result<(), ElementError> {
        self.state.lock().fullscreen = false;
        self.dispatch_to(
            EventTarget::Container,
            MediaEvent::new(EventKind::FullscreenChange),
        );
        Ok(())
    }

    fn supports_picture_in_picture(&self) -> bool {
        self.state.lock().picture_in_picture_supported
    }

    fn is_picture_in_picture(&self) -> bool {
        self.state.lock().picture_in_picture
    }

    async fn request_picture_in_picture(&self) -> Result<(), ElementError> {
        {
            let mut state = self.state.lock();
            if !state.picture_in_picture_supported {
                return Err(ElementError::Unsupported {
                    feature: "picture-in-picture",
                });
            }
            if let Some(error) = state.picture_in_picture_error.clone() {
                return Err(error);
            }
            state.picture_in_picture = true;
        }
        self.dispatch(EventKind::EnterPictureInPicture);
        Ok(())
    }

    async fn exit_picture_in_picture(&self) -> Result<(), ElementError> {
        {
            let mut state = self.state.lock();
            if let Some(error) = state.picture_in_picture_error.clone() {
                return Err(error);
            }
            state.picture_in_picture = false;
        }
        self.dispatch(EventKind::LeavePictureInPicture);
        Ok(())
    }

    fn attribute(&self, target: EventTarget, name: &str) -> Option<String> {
        self.state
            .lock()
            .attributes
            .get(&(target, name.to_string()))
            .cloned()
    }

    fn set_attribute(&self, target: EventTarget, name: &str, value: &str) {
        self.state
            .lock()
            .attributes
            .insert((target, name.to_string()), value.to_string());
    }

    fn remove_attribute(&self, target: EventTarget, name: &str) {
        self.state
            .lock()
            .attributes
            .remove(&(target, name.to_string()));
    }

    fn add_event_listener(
        &self,
        target: EventTarget,
        kind: EventKind,
        handler: EventHandler,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push(Registration {
            id,
            target,
            kind,
            handler,
        });
        id
    }

    fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        let removed = listeners.len() != before;
        if !removed {
            debug!("Listener {:?} was not registered", id);
        }
        removed
    }
}
