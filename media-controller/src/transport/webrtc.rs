use super::{AccessControl, SourceHandle, TransportEvents};
use crate::element::MediaElement;
use crate::errors::TransportError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;

const SDP_CONTENT_TYPE: &str = "application/sdp";

pub struct WebRtcStartRequest {
    pub src: String,
    pub element: Arc<dyn MediaElement>,
    pub access: AccessControl,
    /// Budget for the SDP offer/answer exchange.
    pub sdp_timeout: Duration,
}

impl WebRtcStartRequest {
    /// Headers of the WHEP offer request.
    pub fn offer_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(SDP_CONTENT_TYPE));
        self.access.apply_headers(&mut headers);
        headers
    }
}

/// Low-latency WHEP adapter. `on_live(true)` signals an established
/// connection; B-frame metadata is reported through `on_metadata`.
#[async_trait]
pub trait WebRtcTransport: Send + Sync {
    async fn start(
        &self,
        request: WebRtcStartRequest,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn SourceHandle>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockMediaElement;

    #[test]
    fn test_offer_headers() {
        let request = WebRtcStartRequest {
            src: "https://x/webrtc/abc".to_string(),
            element: Arc::new(MockMediaElement::new()),
            access: AccessControl::new(Some("jwt".to_string()), None),
            sdp_timeout: Duration::from_secs(10),
        };

        let headers = request.offer_headers();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/sdp");
        assert_eq!(headers.get("Livepeer-Jwt").unwrap(), "jwt");
    }
}
