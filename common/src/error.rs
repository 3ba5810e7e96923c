use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const STREAM_OPEN_ERROR_MESSAGE: &str = "stream open failed";
pub const STREAM_OFFLINE_ERROR_MESSAGE: &str = "stream is offline";
pub const STREAM_WAITING_FOR_DATA_ERROR_MESSAGE: &str = "stream is waiting for data";
pub const ACCESS_CONTROL_ERROR_MESSAGE: &str =
    "shutting down since this session is not allowed to view this stream";
pub const BFRAMES_ERROR_MESSAGE: &str =
    "metadata indicates that webrtc playback contains bframes, which is not supported";
pub const CANPLAY_TIMEOUT_ERROR_MESSAGE: &str =
    "timeout reached for canplay, triggering playback error";
pub const HLS_GENERIC_ERROR_MESSAGE: &str = "error with hls playback";
pub const VIDEO_FETCH_ERROR_MESSAGE: &str = "error fetching video url";
pub const UNKNOWN_VIDEO_ERROR_MESSAGE: &str = "unknown error loading video";

const OFFLINE_MARKERS: [&str; 3] = [
    STREAM_OPEN_ERROR_MESSAGE,
    STREAM_OFFLINE_ERROR_MESSAGE,
    STREAM_WAITING_FOR_DATA_ERROR_MESSAGE,
];

/// 播放错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Origin unreachable or stream not started yet (404)
    Offline,
    /// 401 / forbidden
    AccessControl,
    /// Stream incompatible with the chosen transport (B-frames over WebRTC)
    Compatibility,
    /// No ready signal within the configured budget
    Timeout,
    /// Adapter-specific failure
    Transport,
    /// Decode or other non-network media element failure
    Media,
    /// Unclassified element error
    Unknown,
}

impl ErrorKind {
    /// Map a free-form adapter message onto the taxonomy.
    pub fn classify(message: &str) -> ErrorKind {
        let message = message.to_ascii_lowercase();

        if OFFLINE_MARKERS.iter().any(|marker| message.contains(marker)) {
            ErrorKind::Offline
        } else if message.contains(ACCESS_CONTROL_ERROR_MESSAGE) {
            ErrorKind::AccessControl
        } else if message.contains(BFRAMES_ERROR_MESSAGE) {
            ErrorKind::Compatibility
        } else if message.contains(CANPLAY_TIMEOUT_ERROR_MESSAGE) {
            ErrorKind::Timeout
        } else {
            ErrorKind::Unknown
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Offline => "offline",
            ErrorKind::AccessControl => "access-control",
            ErrorKind::Compatibility => "compatibility",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transport => "transport",
            ErrorKind::Media => "media",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// 播放错误（写入控制器状态）
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct PlaybackError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PlaybackError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build from an adapter message, falling back to `fallback` when the
    /// message carries no known marker.
    pub fn from_message(message: impl Into<String>, fallback: ErrorKind) -> Self {
        let message = message.into();
        let kind = match ErrorKind::classify(&message) {
            ErrorKind::Unknown => fallback,
            kind => kind,
        };
        Self { kind, message }
    }

    pub fn offline() -> Self {
        Self::new(ErrorKind::Offline, STREAM_OFFLINE_ERROR_MESSAGE)
    }

    pub fn access_control() -> Self {
        Self::new(ErrorKind::AccessControl, ACCESS_CONTROL_ERROR_MESSAGE)
    }

    pub fn bframes() -> Self {
        Self::new(ErrorKind::Compatibility, BFRAMES_ERROR_MESSAGE)
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, CANPLAY_TIMEOUT_ERROR_MESSAGE)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn media(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Media, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Offline is the expected state of a stream that has not started yet;
    /// the UI shows a waiting message instead of a failure.
    pub fn is_offline(&self) -> bool {
        self.kind == ErrorKind::Offline
    }

    pub fn is_access_control(&self) -> bool {
        self.kind == ErrorKind::AccessControl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_messages() {
        assert_eq!(
            ErrorKind::classify("Stream open failed: upstream unreachable"),
            ErrorKind::Offline
        );
        assert_eq!(
            ErrorKind::classify(STREAM_WAITING_FOR_DATA_ERROR_MESSAGE),
            ErrorKind::Offline
        );
        assert_eq!(
            ErrorKind::classify(ACCESS_CONTROL_ERROR_MESSAGE),
            ErrorKind::AccessControl
        );
        assert_eq!(ErrorKind::classify(BFRAMES_ERROR_MESSAGE), ErrorKind::Compatibility);
        assert_eq!(ErrorKind::classify("segment 12 failed"), ErrorKind::Unknown);
    }

    #[test]
    fn test_from_message_fallback() {
        let error = PlaybackError::from_message("ice connection failed", ErrorKind::Transport);
        assert_eq!(error.kind, ErrorKind::Transport);

        let error = PlaybackError::from_message(STREAM_OFFLINE_ERROR_MESSAGE, ErrorKind::Transport);
        assert!(error.is_offline());
    }

    #[test]
    fn test_error_kind_serde() {
        let json = serde_json::to_string(&ErrorKind::AccessControl).unwrap();
        assert_eq!(json, "\"access-control\"");
        assert_eq!(PlaybackError::timeout().to_string(), format!("timeout error: {}", CANPLAY_TIMEOUT_ERROR_MESSAGE));
    }
}
