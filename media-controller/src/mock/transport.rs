use crate::errors::TransportError;
use crate::transport::{
    AccessControl, HlsStartRequest, HlsTransport, OutboundRequest, SourceHandle, TransportEvents,
    WebRtcStartRequest, WebRtcTransport,
};
use async_trait::async_trait;
use common::{SourceKind, VideoQuality};
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// What a started session does on its own.
#[derive(Debug, Clone)]
pub enum SessionBehavior {
    /// Nothing; the test drives callbacks through [`MockSession::events`].
    Manual,
    /// Report live, duration and can-play right away.
    Connect { live: bool, duration: f64 },
    /// Fail the session right away.
    Fail(TransportError),
    /// Refuse to start.
    Refuse(TransportError),
}

/// What the adapter was started with.
#[derive(Debug, Clone)]
pub enum StartDetails {
    Hls {
        initial_quality: VideoQuality,
        aspect_ratio: f64,
        autoplay: bool,
        manifest_request: OutboundRequest,
    },
    WebRtc {
        access: AccessControl,
        sdp_timeout: Duration,
        offer_headers: HeaderMap,
    },
}

pub struct MockSession {
    pub index: usize,
    pub kind: SourceKind,
    pub src: String,
    pub details: StartDetails,
    pub started_at: Instant,
    events: Arc<dyn TransportEvents>,
    destroyed: AtomicBool,
    qualities: Mutex<Vec<VideoQuality>>,
}

impl MockSession {
    pub fn events(&self) -> Arc<dyn TransportEvents> {
        self.events.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn qualities(&self) -> Vec<VideoQuality> {
        self.qualities.lock().clone()
    }
}

struct MockHandle {
    session: Arc<MockSession>,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl SourceHandle for MockHandle {
    async fn destroy(&self) {
        if !self.session.destroyed.swap(true, Ordering::SeqCst) {
            self.active.fetch_sub(1, Ordering::SeqCst);
            debug!("Mock {} session {} destroyed", self.session.kind, self.session.index);
        }
    }

    fn set_quality(&self, quality: VideoQuality) -> Result<(), TransportError> {
        if self.session.kind != SourceKind::Hls {
            return Err(TransportError::Unavailable {
                reason: "quality switching is HLS only".to_string(),
            });
        }
        self.session.qualities.lock().push(quality);
        Ok(())
    }
}

/// Scriptable HLS and WebRTC adapter.
#[derive(Default)]
pub struct MockTransport {
    sessions: Mutex<Vec<Arc<MockSession>>>,
    script: Mutex<VecDeque<SessionBehavior>>,
    active: Arc<AtomicUsize>,
    max_active: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behavior of the next started session. Sessions beyond the
    /// script are [`SessionBehavior::Manual`].
    pub fn push_behavior(&self, behavior: SessionBehavior) {
        self.script.lock().push_back(behavior);
    }

    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().clone()
    }

    pub fn last_session(&self) -> Option<Arc<MockSession>> {
        self.sessions.lock().last().cloned()
    }

    pub fn start_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live sessions seen so far.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn open(
        &self,
        kind: SourceKind,
        src: String,
        details: StartDetails,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn SourceHandle>, TransportError> {
        let next = self.script.lock().pop_front();
        let behavior = match next.unwrap_or(SessionBehavior::Manual) {
            SessionBehavior::Refuse(error) => return Err(error),
            behavior => behavior,
        };

        let session = {
            let mut sessions = self.sessions.lock();
            let session = Arc::new(MockSession {
                index: sessions.len(),
                kind,
                src,
                details,
                started_at: Instant::now(),
                events: events.clone(),
                destroyed: AtomicBool::new(false),
                qualities: Mutex::new(Vec::new()),
            });
            sessions.push(session.clone());
            session
        };

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        debug!("Mock {} session {} started ({} active)", kind, session.index, active);

        match behavior {
            SessionBehavior::Connect { live, duration } => {
                events.on_live(live);
                events.on_duration(duration);
                events.on_can_play();
            }
            SessionBehavior::Fail(error) => events.on_error(error),
            SessionBehavior::Manual | SessionBehavior::Refuse(_) => {}
        }

        Ok(Arc::new(MockHandle {
            session,
            active: self.active.clone(),
        }))
    }
}

#[async_trait]
impl HlsTransport for MockTransport {
    async fn start(
        &self,
        request: HlsStartRequest,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn SourceHandle>, TransportError> {
        let mut manifest_request = OutboundRequest::new(request.src.clone());
        request.config.auth.prepare(&mut manifest_request);

        let details = StartDetails::Hls {
            initial_quality: request.initial_quality,
            aspect_ratio: request.aspect_ratio,
            autoplay: request.config.autoplay,
            manifest_request,
        };
        self.open(SourceKind::Hls, request.src, details, events)
    }
}

#[async_trait]
impl WebRtcTransport for MockTransport {
    async fn start(
        &self,
        request: WebRtcStartRequest,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn SourceHandle>, TransportError> {
        let details = StartDetails::WebRtc {
            offer_headers: request.offer_headers(),
            access: request.access.clone(),
            sdp_timeout: request.sdp_timeout,
        };
        self.open(SourceKind::Webrtc, request.src, details, events)
    }
}
