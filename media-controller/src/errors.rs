use std::io;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Media Element Errors
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ElementError {
    #[error("{feature} is not supported by this element")]
    Unsupported { feature: &'static str },

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Playback request rejected: {reason}")]
    PlayRejected { reason: String },

    #[error("Element is detached")]
    Detached,
}

// ============================================================================
// Transport Errors
// ============================================================================

/// HTTP response attached to an adapter failure, when the adapter saw one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub code: u16,
    pub data: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("HLS error: {message}")]
    Hls {
        message: String,
        response: Option<TransportResponse>,
    },

    #[error("WebRTC error: {message}")]
    WebRtc { message: String },

    #[error("Connection setup timed out after {timeout_ms} ms")]
    SetupTimeout { timeout_ms: u64 },

    #[error("Transport unavailable: {reason}")]
    Unavailable { reason: String },
}

impl TransportError {
    pub fn message(&self) -> String {
        match self {
            TransportError::Hls { message, .. } | TransportError::WebRtc { message } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }

    pub fn response(&self) -> Option<&TransportResponse> {
        match self {
            TransportError::Hls { response, .. } => response.as_ref(),
            _ => None,
        }
    }
}

// ============================================================================
// Probe Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Probe unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Element error: {0}")]
    Element(#[from] ElementError),
}

// ============================================================================
// Metrics Errors
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Metrics sink closed")]
    SinkClosed,

    #[error("Failed to deliver metrics: {reason}")]
    DeliveryFailed { reason: String },
}

// ============================================================================
// Configuration Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}
