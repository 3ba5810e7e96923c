use crate::errors::ElementError;
use async_trait::async_trait;
use common::Dimensions;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Marker attribute set on the media element while listeners are attached.
pub const INITIALIZED_ATTRIBUTE: &str = "data-controller-initialized";

/// Native events the controller listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    // media element
    LoadedMetadata,
    CanPlay,
    Play,
    Pause,
    DurationChange,
    TimeUpdate,
    VolumeChange,
    RateChange,
    Error,
    Waiting,
    Stalled,
    LoadStart,
    Ended,
    Resize,
    EnterPictureInPicture,
    LeavePictureInPicture,
    // container
    FullscreenChange,
    KeyUp,
    MouseMove,
    MouseOver,
    MouseEnter,
    MouseOut,
    TouchStart,
    TouchMove,
    TouchEnd,
}

/// Where a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    Media,
    Container,
}

/// `MediaError.code` values of an HTML media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SrcNotSupported,
}

impl MediaErrorCode {
    /// Errors that may be explained by the HTTP status of the source URL.
    pub fn is_network_related(&self) -> bool {
        matches!(self, MediaErrorCode::Network | MediaErrorCode::SrcNotSupported)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaErrorInfo {
    pub code: MediaErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventDetail {
    None,
    Key { code: String },
    Error(MediaErrorInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub kind: EventKind,
    pub detail: EventDetail,
}

impl MediaEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            detail: EventDetail::None,
        }
    }

    pub fn key(code: impl Into<String>) -> Self {
        Self {
            kind: EventKind::KeyUp,
            detail: EventDetail::Key { code: code.into() },
        }
    }

    pub fn error(info: MediaErrorInfo) -> Self {
        Self {
            kind: EventKind::Error,
            detail: EventDetail::Error(info),
        }
    }
}

/// A buffered range, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

pub type EventHandler = Arc<dyn Fn(&MediaEvent) + Send + Sync>;

/// The media element a player drives, together with its container.
///
/// Getters and plain property writes are synchronous like their DOM
/// counterparts; operations the runtime may reject or defer are async.
/// Implementations use interior mutability, the element is shared as
/// `Arc<dyn MediaElement>`.
#[async_trait]
pub trait MediaElement: Send + Sync {
    // playback
    async fn play(&self) -> Result<(), ElementError>;
    fn pause(&self);
    fn paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&self, time: f64);
    /// `NaN` or infinite when unknown.
    fn duration(&self) -> f64;
    fn buffered(&self) -> Vec<TimeRange>;
    /// `None` when the runtime does not report a ready state.
    fn ready_state(&self) -> Option<u8>;

    // audio
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool);
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64);

    // source
    fn current_src(&self) -> Option<String>;
    fn set_src(&self, src: &str);
    fn load(&self);
    fn set_poster(&self, poster: Option<&str>);
    fn error(&self) -> Option<MediaErrorInfo>;

    // size
    /// Intrinsic media size, zero when unknown.
    fn video_size(&self) -> Dimensions;
    /// Container size, `None` when there is no container.
    fn container_size(&self) -> Option<Dimensions>;

    // fullscreen
    fn supports_fullscreen(&self) -> bool;
    fn is_fullscreen(&self) -> bool;
    async fn request_fullscreen(&self) -> Result<(), ElementError>;
    async fn exit_fullscreen(&self) -> Result<(), ElementError>;

    // picture-in-picture
    fn supports_picture_in_picture(&self) -> bool;
    fn is_picture_in_picture(&self) -> bool;
    async fn request_picture_in_picture(&self) -> Result<(), ElementError>;
    async fn exit_picture_in_picture(&self) -> Result<(), ElementError>;

    // attributes
    fn attribute(&self, target: EventTarget, name: &str) -> Option<String>;
    fn set_attribute(&self, target: EventTarget, name: &str, value: &str);
    fn remove_attribute(&self, target: EventTarget, name: &str);

    // events
    fn add_event_listener(
        &self,
        target: EventTarget,
        kind: EventKind,
        handler: EventHandler,
    ) -> ListenerId;
    /// Returns `false` when the listener was not registered.
    fn remove_event_listener(&self, id: ListenerId) -> bool;
}
