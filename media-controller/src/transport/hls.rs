use super::{AccessControl, SourceHandle, TransportEvents};
use crate::element::MediaElement;
use crate::errors::TransportError;
use async_trait::async_trait;
use common::{ErrorKind, PlaybackError, VideoQuality, HLS_GENERIC_ERROR_MESSAGE};
use regex::Regex;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Manifest URLs of the streaming origin; only these get credential headers.
static MANIFEST_URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^/\s]+/hls/[^/\s]+/index\.m3u8").expect("manifest pattern is valid")
});

pub fn is_manifest_url(url: &str) -> bool {
    MANIFEST_URL_PATTERN.is_match(url)
}

/// A request the HLS adapter is about to send.
#[derive(Debug, Clone, Default)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: HeaderMap,
}

impl OutboundRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }
}

/// Caller hook run on every outbound request before credentials are added.
pub type RequestHook = Arc<dyn Fn(&mut OutboundRequest) + Send + Sync>;

/// Prepares outbound adapter requests: user hook first, then credentials
/// on manifest requests.
#[derive(Clone, Default)]
pub struct ManifestAuth {
    access: AccessControl,
    hook: Option<RequestHook>,
}

impl ManifestAuth {
    pub fn new(access: AccessControl, hook: Option<RequestHook>) -> Self {
        Self { access, hook }
    }

    pub fn prepare(&self, request: &mut OutboundRequest) {
        if let Some(hook) = &self.hook {
            hook(request);
        }
        if is_manifest_url(&request.url) {
            self.access.apply_headers(&mut request.headers);
        }
    }
}

impl fmt::Debug for ManifestAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestAuth")
            .field("jwt", &self.access.jwt.is_some())
            .field("access_key", &self.access.access_key.is_some())
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// Adapter configuration: caller passthrough options plus the fields the
/// controller owns.
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    pub options: HashMap<String, Value>,
    pub autoplay: bool,
    pub auth: ManifestAuth,
}

pub struct HlsStartRequest {
    pub src: String,
    pub element: Arc<dyn MediaElement>,
    pub initial_quality: VideoQuality,
    pub aspect_ratio: f64,
    pub config: HlsConfig,
}

#[async_trait]
pub trait HlsTransport: Send + Sync {
    async fn start(
        &self,
        request: HlsStartRequest,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn SourceHandle>, TransportError>;
}

/// Turn an adapter failure into the error stored on the controller.
///
/// The response payload wins, then a 401 becomes an access-control error,
/// anything else is the generic HLS error.
pub fn normalize_hls_error(error: &TransportError) -> PlaybackError {
    let response = error.response();

    if let Some(data) = response.and_then(|r| r.data.as_deref()) {
        return PlaybackError::from_message(data, ErrorKind::Transport);
    }

    match response.map(|r| r.code) {
        Some(401) => PlaybackError::access_control(),
        _ => PlaybackError::transport(HLS_GENERIC_ERROR_MESSAGE),
    }
}
