use crate::store::ControllerStore;
use crate::types::{
    ClipParams, ControllerState, DeviceInfo, SeekRequest, SizeUpdate, StreamMetadata,
    DEFAULT_VOLUME_LEVEL, SEEK_STEP_SECONDS,
};
use chrono::Utc;
use common::{PlaybackError, PlaybackRate, PlaybackSource, VideoQuality};
use tracing::{debug, info, warn};

/// Wall clock in milliseconds since the epoch.
pub(crate) fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Next value of a request marker: the current time, but always strictly
/// greater than the previous marker so back-to-back requests stay distinct.
fn next_marker(previous: u64) -> u64 {
    now_ms().max(previous.saturating_add(1))
}

fn touch_interaction(state: &mut ControllerState) {
    state.controls.last_interaction = next_marker(state.controls.last_interaction);
}

fn clamp_seek(state: &ControllerState, target: f64) -> f64 {
    let target = if target.is_finite() { target } else { 0.0 };
    if state.duration > 0.0 {
        target.clamp(0.0, state.duration)
    } else {
        target.max(0.0)
    }
}

/// Intent functions: the only sanctioned way to mutate a [`ControllerState`].
///
/// Every intent is a silent no-op once the store has been destroyed.
impl ControllerStore {
    // ------------------------------------------------------------------
    // UI requests
    // ------------------------------------------------------------------

    pub fn toggle_play(&self) {
        self.set_state(|state| {
            state.controls.requested_play_pause_last_time =
                next_marker(state.controls.requested_play_pause_last_time);
            touch_interaction(state);
        });
    }

    pub fn request_toggle_play_pause(&self) {
        self.toggle_play();
    }

    pub fn request_toggle_fullscreen(&self) {
        self.set_state(|state| {
            state.controls.requested_fullscreen_last_time =
                next_marker(state.controls.requested_fullscreen_last_time);
            touch_interaction(state);
        });
    }

    pub fn request_toggle_picture_in_picture(&self) {
        self.set_state(|state| {
            state.controls.requested_picture_in_picture_last_time =
                next_marker(state.controls.requested_picture_in_picture_last_time);
            touch_interaction(state);
        });
    }

    /// Seek to an absolute position in seconds, clamped to the known duration.
    pub fn request_seek(&self, target: f64) {
        self.set_state(|state| {
            let target = clamp_seek(state, target);
            let previous = state
                .controls
                .requested_seek
                .map(|seek| seek.requested_at)
                .unwrap_or(0);
            state.controls.requested_seek = Some(SeekRequest {
                target,
                requested_at: next_marker(previous),
            });
            state.progress = target;
            touch_interaction(state);
        });
    }

    pub fn request_seek_forward(&self) {
        let target = self.read(|state| state.progress + SEEK_STEP_SECONDS);
        self.request_seek(target);
    }

    pub fn request_seek_back(&self) {
        let target = self.read(|state| state.progress - SEEK_STEP_SECONDS);
        self.request_seek(target);
    }

    /// Toggle mute. Unmuting a silent player restores the default volume.
    pub fn request_toggle_mute(&self) {
        self.set_state(|state| {
            if state.muted {
                state.muted = false;
                if state.volume == 0.0 {
                    state.volume = DEFAULT_VOLUME_LEVEL;
                }
            } else {
                state.muted = true;
            }
            touch_interaction(state);
        });
    }

    /// Record a clip of the last `clip_length` seconds, in estimated server
    /// time. Ignored when clipping is not configured.
    pub fn request_clip(&self) {
        self.set_state(|state| {
            let Some(clip_length) = state.initial_props.clip_length else {
                debug!("Clip requested without a configured clip length, ignoring");
                return;
            };

            let now = now_ms();
            let offset = state.playback_offset_ms.unwrap_or(0.0).max(0.0) as i64;
            let end_ms = now as i64 - offset;
            let start_ms = end_ms - i64::from(clip_length) * 1000;
            let previous = state
                .controls
                .requested_clip
                .map(|clip| clip.requested_at)
                .unwrap_or(0);

            info!("Requesting clip {} -> {}", start_ms, end_ms);
            state.controls.requested_clip = Some(ClipParams {
                start_ms,
                end_ms,
                requested_at: next_marker(previous),
            });
            touch_interaction(state);
        });
    }

    pub fn update_last_interaction(&self) {
        self.set_state(touch_interaction);
    }

    // ------------------------------------------------------------------
    // Playback settings
    // ------------------------------------------------------------------

    /// Set the volume (clamped to 0.0-1.0); a zero volume also mutes.
    pub fn set_volume(&self, volume: f64) {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.set_state(|state| {
            state.volume = volume;
            state.muted = volume == 0.0;
        });
    }

    /// A stored `Constant` rate is locked and ignores numeric updates.
    pub fn set_playback_rate(&self, rate: PlaybackRate) {
        self.set_state(|state| match (state.playback_rate, rate) {
            (PlaybackRate::Constant, PlaybackRate::Rate(_)) => {}
            (_, PlaybackRate::Rate(value)) if !(value.is_finite() && value > 0.0) => {
                warn!("Ignoring invalid playback rate {}", value);
            }
            _ => state.playback_rate = rate,
        });
    }

    pub fn set_video_quality(&self, quality: VideoQuality) {
        self.set_state(|state| state.video_quality = quality);
    }

    // ------------------------------------------------------------------
    // Element feedback
    // ------------------------------------------------------------------

    pub fn update_buffered(&self, buffered: f64) {
        self.set_state(|state| state.buffered = buffered.max(0.0));
    }

    pub fn on_progress(&self, time: f64) {
        self.set_state(|state| {
            state.progress = if time.is_finite() { time.max(0.0) } else { 0.0 };
            state.waiting = false;
            state.stalled = false;
        });
    }

    /// Unknown or unbounded durations are stored as 0.
    pub fn on_duration_change(&self, duration: f64) {
        let duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        };
        self.set_state(|state| state.duration = duration);
    }

    /// Verified successful connection: clears the error streak.
    pub fn on_can_play(&self) {
        self.set_state(|state| {
            state.can_play = true;
            state.loading = false;
            state.error = None;
            state.error_count = 0;
        });
    }

    pub fn on_play(&self) {
        self.set_state(|state| {
            state.playing = true;
            state.ended = false;
        });
    }

    pub fn on_pause(&self) {
        self.set_state(|state| state.playing = false);
    }

    /// Record a failed attempt. Incrementing `error_count` is what drives the
    /// source effect's backoff-then-reconnect path.
    pub fn on_error(&self, error: PlaybackError) {
        warn!("Playback error: {}", error);
        self.set_state(|state| {
            state.error_count = state.error_count.saturating_add(1);
            state.error = Some(error);
            state.can_play = false;
            state.playing = false;
            state.loading = false;
        });
    }

    pub fn on_waiting(&self) {
        self.set_state(|state| state.waiting = true);
    }

    pub fn on_stalled(&self) {
        self.set_state(|state| state.stalled = true);
    }

    pub fn on_loading(&self) {
        self.set_state(|state| {
            state.loading = true;
            state.ended = false;
        });
    }

    pub fn on_ended(&self) {
        self.set_state(|state| {
            state.ended = true;
            state.playing = false;
        });
    }

    /// Merge new dimensions; absent pairs keep their previous value.
    pub fn set_size(&self, size: SizeUpdate) {
        self.set_state(|state| {
            if let Some(container) = size.container {
                state.size.container = Some(container);
            }
            if let Some(media) = size.media {
                state.size.media = Some(media);
            }
        });
    }

    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.set_state(|state| state.fullscreen = fullscreen);
    }

    pub fn set_picture_in_picture(&self, picture_in_picture: bool) {
        self.set_state(|state| state.picture_in_picture = picture_in_picture);
    }

    // ------------------------------------------------------------------
    // Transport feedback
    // ------------------------------------------------------------------

    /// A live signal is a successful connection, so it clears the error streak.
    pub fn set_live(&self, live: bool) {
        self.set_state(|state| {
            state.live = live;
            if live {
                state.error = None;
                state.error_count = 0;
            }
        });
    }

    pub fn on_final_url(&self, url: Option<String>) {
        self.set_state(|state| state.final_url = url);
    }

    pub fn update_playback_offset_ms(&self, offset_ms: f64) {
        if !offset_ms.is_finite() {
            return;
        }
        self.set_state(|state| state.playback_offset_ms = Some(offset_ms));
    }

    pub fn set_metadata(&self, metadata: StreamMetadata) {
        self.set_state(|state| state.metadata = Some(metadata));
    }

    // ------------------------------------------------------------------
    // UI state
    // ------------------------------------------------------------------

    pub fn set_hidden(&self, hidden: bool) {
        self.set_state(|state| state.hidden = hidden);
    }

    pub fn set_poster(&self, poster: Option<String>) {
        self.set_state(|state| state.poster = poster);
    }

    pub fn set_thumbnail(&self, thumbnail: Option<String>) {
        self.set_state(|state| state.controls.thumbnail = thumbnail);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Select a new source. Does not touch `error_count`; only a verified
    /// connection resets it.
    pub fn set_source(&self, source: Option<PlaybackSource>) {
        self.set_state(|state| {
            if state.current_source != source {
                state.can_play = false;
                state.loading = source.is_some();
                state.final_url = None;
                state.current_source = source;
            }
        });
    }

    pub fn set_mounted(&self, mounted: bool) {
        self.set_state(|state| state.mounted = mounted);
    }

    pub fn update_device(&self, update: impl FnOnce(&mut DeviceInfo)) {
        self.set_state(|state| update(&mut state.device));
    }
}
