use common::{
    Dimensions, MediaKind, PlaybackError, PlaybackRate, PlaybackSource, VideoQuality,
};
use crate::transport::RequestHook;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_VOLUME_LEVEL: f64 = 1.0;
pub const DEFAULT_AUTOHIDE_TIME: Duration = Duration::from_millis(3000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10000);
pub const DEFAULT_POSTER_LIVE_UPDATE: Duration = Duration::from_millis(30000);
pub const DEFAULT_ASPECT_RATIO: f64 = 16.0 / 9.0;
/// Step used by the seek forward/back hotkeys, in seconds.
pub const SEEK_STEP_SECONDS: f64 = 5.0;

// ============================================================================
// Initial Props
// ============================================================================

/// Immutable configuration a player instance is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialProps {
    pub autoplay: bool,
    pub aspect_ratio: Option<f64>,
    pub access_key: Option<String>,
    pub jwt: Option<String>,
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub timeout: Duration,
    pub hotkeys: bool,
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub poster_live_update: Duration,
    /// Clip length in seconds; clipping is disabled when unset.
    pub clip_length: Option<u32>,
    pub volume: f64,
    pub playback_rate: PlaybackRate,
    pub video_quality: VideoQuality,
}

impl Default for InitialProps {
    fn default() -> Self {
        Self {
            autoplay: false,
            aspect_ratio: Some(DEFAULT_ASPECT_RATIO),
            access_key: None,
            jwt: None,
            timeout: DEFAULT_TIMEOUT,
            hotkeys: true,
            poster_live_update: DEFAULT_POSTER_LIVE_UPDATE,
            clip_length: None,
            volume: DEFAULT_VOLUME_LEVEL,
            playback_rate: PlaybackRate::default(),
            video_quality: VideoQuality::Auto,
        }
    }
}

// ============================================================================
// Controls Options
// ============================================================================

/// Options of the listener and effect layer, as opposed to the store's
/// initial props.
#[derive(Clone)]
pub struct ControlsOptions {
    /// Zero disables autohide.
    pub autohide: Duration,
    /// Passed through to the HLS adapter untouched.
    pub hls_options: HashMap<String, Value>,
    pub request_hook: Option<RequestHook>,
}

impl Default for ControlsOptions {
    fn default() -> Self {
        Self {
            autohide: DEFAULT_AUTOHIDE_TIME,
            hls_options: HashMap::new(),
            request_hook: None,
        }
    }
}

impl fmt::Debug for ControlsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlsOptions")
            .field("autohide", &self.autohide)
            .field("hls_options", &self.hls_options)
            .field("request_hook", &self.request_hook.is_some())
            .finish()
    }
}

// ============================================================================
// Device Capabilities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub is_volume_change_supported: bool,
    pub is_picture_in_picture_supported: bool,
    pub is_fullscreen_supported: bool,
}

impl Default for DeviceInfo {
    /// Assume support until a probe proves otherwise.
    fn default() -> Self {
        Self {
            is_volume_change_supported: true,
            is_picture_in_picture_supported: true,
            is_fullscreen_supported: true,
        }
    }
}

// ============================================================================
// UI Request Markers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeekRequest {
    /// Target position in seconds
    pub target: f64,
    pub requested_at: u64,
}

/// Clip window in estimated server time (milliseconds since epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipParams {
    pub start_ms: i64,
    pub end_ms: i64,
    pub requested_at: u64,
}

/// Monotonic request markers written by intents and consumed by effects.
///
/// Markers are timestamps rather than flags so that two identical requests in a
/// row still look like a change to the subscribed effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlsState {
    pub last_interaction: u64,
    pub requested_play_pause_last_time: u64,
    pub requested_fullscreen_last_time: u64,
    pub requested_picture_in_picture_last_time: u64,
    pub requested_seek: Option<SeekRequest>,
    pub requested_clip: Option<ClipParams>,
    pub thumbnail: Option<String>,
}

// ============================================================================
// Size & Metadata
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSize {
    pub container: Option<Dimensions>,
    pub media: Option<Dimensions>,
}

/// Partial size update; absent pairs keep their previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeUpdate {
    pub container: Option<Dimensions>,
    pub media: Option<Dimensions>,
}

/// Stream metadata pushed by the low-latency transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub bframes: bool,
}

// ============================================================================
// Controller State
// ============================================================================

/// The single source of truth of a player instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerState {
    pub initial_props: InitialProps,
    pub current_source: Option<PlaybackSource>,
    pub mounted: bool,

    pub playing: bool,
    pub can_play: bool,
    pub live: bool,
    pub muted: bool,
    pub volume: f64,
    pub playback_rate: PlaybackRate,
    pub progress: f64,
    pub duration: f64,
    pub buffered: f64,
    pub hidden: bool,
    pub loading: bool,
    pub waiting: bool,
    pub stalled: bool,
    pub ended: bool,
    pub fullscreen: bool,
    pub picture_in_picture: bool,

    pub poster: Option<String>,
    pub final_url: Option<String>,
    pub playback_offset_ms: Option<f64>,
    pub video_quality: VideoQuality,

    pub error: Option<PlaybackError>,
    pub error_count: u32,

    pub device: DeviceInfo,
    pub controls: ControlsState,
    pub metadata: Option<StreamMetadata>,
    pub size: ElementSize,
}

impl ControllerState {
    pub fn new(
        initial_props: InitialProps,
        source: Option<PlaybackSource>,
        device: DeviceInfo,
    ) -> Self {
        let volume = initial_props.volume.clamp(0.0, 1.0);
        Self {
            current_source: source,
            mounted: false,
            playing: false,
            can_play: false,
            live: false,
            muted: volume == 0.0,
            volume,
            playback_rate: initial_props.playback_rate,
            progress: 0.0,
            duration: 0.0,
            buffered: 0.0,
            hidden: false,
            loading: true,
            waiting: false,
            stalled: false,
            ended: false,
            fullscreen: false,
            picture_in_picture: false,
            poster: None,
            final_url: None,
            playback_offset_ms: None,
            video_quality: initial_props.video_quality,
            error: None,
            error_count: 0,
            device,
            controls: ControlsState::default(),
            metadata: None,
            size: ElementSize::default(),
            initial_props,
        }
    }

    /// Media kind of the configured source, video when nothing is selected.
    pub fn media_kind(&self) -> MediaKind {
        self.current_source
            .as_ref()
            .map(|source| source.media_kind())
            .unwrap_or_default()
    }
}
