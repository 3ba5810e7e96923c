//! Transport adapter contracts.
//!
//! Adapters wrap one playback technology each. They are started by the source
//! effect against the media element and report back through
//! [`TransportEvents`]; the returned [`SourceHandle`] is the only way to
//! release them.

pub mod hls;
pub mod webrtc;

use crate::errors::TransportError;
use crate::types::StreamMetadata;
use async_trait::async_trait;
use common::VideoQuality;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use tracing::warn;

pub use hls::{HlsConfig, HlsStartRequest, HlsTransport, ManifestAuth, OutboundRequest, RequestHook};
pub use webrtc::{WebRtcStartRequest, WebRtcTransport};

pub const ACCESS_KEY_HEADER: HeaderName = HeaderName::from_static("livepeer-access-key");
pub const JWT_HEADER: HeaderName = HeaderName::from_static("livepeer-jwt");

/// Credentials forwarded to the origin. The access key wins when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControl {
    pub jwt: Option<String>,
    pub access_key: Option<String>,
}

impl AccessControl {
    pub fn new(jwt: Option<String>, access_key: Option<String>) -> Self {
        Self { jwt, access_key }
    }

    /// Insert the credential header, if any credential is configured.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let (name, value) = match (&self.access_key, &self.jwt) {
            (Some(key), _) => (ACCESS_KEY_HEADER, key),
            (None, Some(jwt)) => (JWT_HEADER, jwt),
            (None, None) => return,
        };

        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(e) => warn!("Credential is not a valid header value ({}): {}", name, e),
        }
    }
}

/// Callback set every adapter reports through.
pub trait TransportEvents: Send + Sync {
    /// Live status known (WebRTC: connection established).
    fn on_live(&self, live: bool);
    fn on_duration(&self, duration: f64);
    fn on_can_play(&self);
    fn on_error(&self, error: TransportError);
    fn on_playback_offset(&self, offset_ms: f64);
    fn on_redirect(&self, final_url: Option<String>);
    /// Stream metadata (WebRTC only).
    fn on_metadata(&self, _metadata: StreamMetadata) {}
}

/// A started adapter.
#[async_trait]
pub trait SourceHandle: Send + Sync {
    /// Release the connection. Must be idempotent.
    async fn destroy(&self);

    /// Switch rendition on the fly (HLS only).
    fn set_quality(&self, _quality: VideoQuality) -> Result<(), TransportError> {
        Err(TransportError::Unavailable {
            reason: "quality switching is not supported by this transport".to_string(),
        })
    }
}

/// The adapters available to a controller.
#[derive(Clone, Default)]
pub struct Transports {
    pub hls: Option<Arc<dyn HlsTransport>>,
    pub webrtc: Option<Arc<dyn WebRtcTransport>>,
}

impl Transports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hls(mut self, hls: Arc<dyn HlsTransport>) -> Self {
        self.hls = Some(hls);
        self
    }

    pub fn with_webrtc(mut self, webrtc: Arc<dyn WebRtcTransport>) -> Self {
        self.webrtc = Some(webrtc);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_key_takes_precedence() {
        let access = AccessControl::new(Some("jwt-token".to_string()), Some("K1".to_string()));
        let mut headers = HeaderMap::new();
        access.apply_headers(&mut headers);

        assert_eq!(headers.get("Livepeer-Access-Key").unwrap(), "K1");
        assert!(headers.get("Livepeer-Jwt").is_none());
    }

    #[test]
    fn test_jwt_header() {
        let access = AccessControl::new(Some("jwt-token".to_string()), None);
        let mut headers = HeaderMap::new();
        access.apply_headers(&mut headers);

        assert_eq!(headers.get(JWT_HEADER).unwrap(), "jwt-token");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_invalid_credential_skipped() {
        let access = AccessControl::new(None, Some("bad\nkey".to_string()));
        let mut headers = HeaderMap::new();
        access.apply_headers(&mut headers);
        assert!(headers.is_empty());
    }
}
