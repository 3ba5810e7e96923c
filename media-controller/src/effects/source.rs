//! Source lifecycle: at most one transport session per player, rebuilt with
//! exponential backoff after failures.

use super::EffectContext;
use crate::element::{EventHandler, EventKind, EventTarget, ListenerId, MediaElement, MediaEvent};
use crate::errors::TransportError;
use crate::store::{ControllerStore, Subscription};
use crate::transport::hls::normalize_hls_error;
use crate::transport::{
    AccessControl, HlsConfig, HlsStartRequest, ManifestAuth, SourceHandle, TransportEvents,
    WebRtcStartRequest,
};
use crate::types::{ControllerState, StreamMetadata, DEFAULT_ASPECT_RATIO};
use common::{ErrorKind, PlaybackError, PlaybackSource, SourceKind, VideoQuality};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The slice of state the source effect reads.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceKey {
    pub access_key: Option<String>,
    pub aspect_ratio: Option<f64>,
    pub autoplay: bool,
    pub error_count: u32,
    pub jwt: Option<String>,
    pub live: bool,
    pub mounted: bool,
    pub progress: f64,
    pub source: Option<PlaybackSource>,
    pub timeout: Duration,
    pub video_quality: VideoQuality,
}

impl SourceKey {
    pub fn from_state(state: &ControllerState) -> Self {
        Self {
            access_key: state.initial_props.access_key.clone(),
            aspect_ratio: state.initial_props.aspect_ratio,
            autoplay: state.initial_props.autoplay,
            error_count: state.error_count,
            jwt: state.initial_props.jwt.clone(),
            live: state.live,
            mounted: state.mounted,
            progress: state.progress,
            source: state.current_source.clone(),
            timeout: state.initial_props.timeout,
            video_quality: state.video_quality,
        }
    }

    fn src(&self) -> Option<&str> {
        self.source.as_ref().map(|source| source.src())
    }

    /// Coarse equality: only the error count, the source URL and the mount
    /// flag trigger a rebuild. A reset of the error count to zero is the
    /// success signal of the running session and must not rebuild it, or
    /// every successful connection would be torn down and reconnected.
    pub fn same_trigger(previous: &SourceKey, next: &SourceKey) -> bool {
        let errors_unchanged = previous.error_count == next.error_count || next.error_count == 0;
        errors_unchanged && previous.src() == next.src() && previous.mounted == next.mounted
    }

    fn access(&self) -> AccessControl {
        AccessControl::new(self.jwt.clone(), self.access_key.clone())
    }
}

/// Guard of the session the driver most recently activated.
///
/// The store listener cancels it in the same notification that supersedes
/// the session, so the session's callbacks are silenced before the driver
/// task gets around to releasing the adapter.
#[derive(Clone, Default)]
struct CurrentGuard(Arc<Mutex<Option<CancellationToken>>>);

impl CurrentGuard {
    fn replace(&self, guard: CancellationToken) {
        *self.0.lock() = Some(guard);
    }

    fn cancel(&self) {
        if let Some(guard) = self.0.lock().take() {
            guard.cancel();
        }
    }
}

pub(super) fn install(
    ctx: &EffectContext,
    token: CancellationToken,
) -> (Subscription, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let current = CurrentGuard::default();

    let initial = ctx.store.read(SourceKey::from_state);
    if initial.mounted {
        let _ = tx.send(initial);
    }

    let listener_current = current.clone();
    let subscription = ctx.store.subscribe_with(
        SourceKey::from_state,
        move |next: &SourceKey, _previous: &SourceKey| {
            // an unmounted player keeps its session until the next rebuild
            if next.mounted {
                listener_current.cancel();
            }
            let _ = tx.send(next.clone());
        },
        SourceKey::same_trigger,
    );

    let task = ctx.runtime.spawn(run(ctx.clone(), rx, current, token));
    (subscription, task)
}

async fn run(
    ctx: EffectContext,
    mut rx: mpsc::UnboundedReceiver<SourceKey>,
    current: CurrentGuard,
    token: CancellationToken,
) {
    let mut active: Option<ActiveSource> = None;
    let mut pending: Option<SourceKey> = None;

    loop {
        let key = match pending.take() {
            Some(key) => key,
            None => tokio::select! {
                _ = token.cancelled() => break,
                key = rx.recv() => match key {
                    Some(key) => key,
                    None => break,
                },
            },
        };
        let key = latest(&mut rx, key);

        if !key.mounted {
            continue;
        }

        if let Some(previous) = active.take() {
            previous.teardown().await;
        }

        if key.error_count > 0 {
            if !ctx.backoff.allows(key.error_count) {
                warn!(
                    "Giving up on {:?} after {} consecutive errors",
                    key.src(),
                    key.error_count
                );
                continue;
            }

            let delay = ctx.backoff.delay_for(key.error_count);
            info!(
                "Reconnecting in {:?} (consecutive errors: {})",
                delay, key.error_count
            );

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
                next = rx.recv() => {
                    match next {
                        Some(next) => {
                            debug!("Backoff superseded by a newer source change");
                            pending = Some(next);
                            continue;
                        }
                        None => break,
                    }
                }
            }
        }

        let guard = token.child_token();
        current.replace(guard.clone());

        // everything but the trigger is read after the delay
        let key = ctx.store.read(SourceKey::from_state);
        if !key.mounted || ctx.store.is_destroyed() {
            continue;
        }
        if guard.is_cancelled() {
            // superseded between the read and now; the newer key is queued
            continue;
        }
        let Some(source) = key.source.clone() else {
            debug!("No source configured");
            continue;
        };

        let activation = tokio::select! {
            _ = token.cancelled() => break,
            activation = activate(&ctx, &key, source, guard) => activation,
        };
        active = Some(activation);
    }

    if let Some(previous) = active.take() {
        previous.teardown().await;
    }
    debug!("Source effect stopped");
}

/// Skip to the most recent queued key.
fn latest(rx: &mut mpsc::UnboundedReceiver<SourceKey>, mut key: SourceKey) -> SourceKey {
    while let Ok(next) = rx.try_recv() {
        key = next;
    }
    key
}

// ============================================================================
// Active Source
// ============================================================================

/// Owned handle of the running session. Dropping without `teardown` still
/// cancels its guard, but leaves the adapter to its own devices.
struct ActiveSource {
    kind: SourceKind,
    guard: CancellationToken,
    handle: Option<Arc<dyn SourceHandle>>,
    subscriptions: Vec<Subscription>,
    element: Arc<dyn MediaElement>,
    listener: Option<ListenerId>,
}

impl ActiveSource {
    fn new(kind: SourceKind, guard: CancellationToken, element: Arc<dyn MediaElement>) -> Self {
        Self {
            kind,
            guard,
            handle: None,
            subscriptions: Vec::new(),
            element,
            listener: None,
        }
    }

    async fn teardown(mut self) {
        self.guard.cancel();
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        if let Some(id) = self.listener.take() {
            self.element.remove_event_listener(id);
        }
        if let Some(handle) = self.handle.take() {
            handle.destroy().await;
        }
        info!("Tore down {} source", self.kind);
    }
}

impl Drop for ActiveSource {
    fn drop(&mut self) {
        self.guard.cancel();
    }
}

/// Seek back to the saved position once per activation, for non-live
/// content with a saved position.
struct ResumeSeek {
    element: Arc<dyn MediaElement>,
    target: Option<f64>,
    jumped: AtomicBool,
}

impl ResumeSeek {
    fn new(element: Arc<dyn MediaElement>, key: &SourceKey) -> Self {
        let target = (!key.live && key.progress > 0.0).then_some(key.progress);
        Self {
            element,
            target,
            jumped: AtomicBool::new(false),
        }
    }

    fn fire(&self) {
        let Some(target) = self.target else {
            return;
        };
        if !self.jumped.swap(true, Ordering::SeqCst) {
            debug!("Resuming playback at {}s", target);
            self.element.set_current_time(target);
        }
    }
}

/// Transport callbacks wired into the store, silenced once the session is
/// torn down.
struct SourceEvents {
    store: ControllerStore,
    guard: CancellationToken,
    resume: Arc<ResumeSeek>,
    kind: SourceKind,
}

impl SourceEvents {
    fn live(&self) -> bool {
        !self.guard.is_cancelled()
    }

    fn report(&self, error: PlaybackError) {
        if self.live() {
            self.store.on_error(error);
        } else {
            debug!("Dropping error of a torn down source: {}", error);
        }
    }
}

impl TransportEvents for SourceEvents {
    fn on_live(&self, live: bool) {
        if !self.live() {
            return;
        }
        self.store.set_live(live);
        // a WebRTC live signal is the connection being established
        if live && self.kind == SourceKind::Webrtc {
            self.resume.fire();
        }
    }

    fn on_duration(&self, duration: f64) {
        if self.live() {
            self.store.on_duration_change(duration);
        }
    }

    fn on_can_play(&self) {
        if self.live() {
            self.store.on_can_play();
            self.resume.fire();
        }
    }

    fn on_error(&self, error: TransportError) {
        let error = match self.kind {
            SourceKind::Hls => normalize_hls_error(&error),
            _ => PlaybackError::from_message(error.message(), ErrorKind::Transport),
        };
        self.report(error);
    }

    fn on_playback_offset(&self, offset_ms: f64) {
        if self.live() {
            self.store.update_playback_offset_ms(offset_ms);
        }
    }

    fn on_redirect(&self, final_url: Option<String>) {
        if self.live() {
            self.store.on_final_url(final_url);
        }
    }

    fn on_metadata(&self, metadata: StreamMetadata) {
        if self.live() {
            self.store.set_metadata(metadata);
        }
    }
}

// ============================================================================
// Activation
// ============================================================================

async fn activate(
    ctx: &EffectContext,
    key: &SourceKey,
    source: PlaybackSource,
    guard: CancellationToken,
) -> ActiveSource {
    let kind = source.kind();
    info!("Activating {} source {}", kind, source.src());

    let resume = Arc::new(ResumeSeek::new(ctx.element.clone(), key));
    let events = Arc::new(SourceEvents {
        store: ctx.store.clone(),
        guard: guard.clone(),
        resume: resume.clone(),
        kind,
    });
    let mut active = ActiveSource::new(kind, guard, ctx.element.clone());

    match source {
        PlaybackSource::Webrtc { src } => {
            activate_webrtc(ctx, key, src, events, &mut active).await;
        }
        PlaybackSource::Hls { src } => {
            activate_hls(ctx, key, src, events, &mut active).await;
        }
        PlaybackSource::Progressive { src, .. } => {
            activate_progressive(ctx, src, resume, &mut active);
        }
    }

    active
}

async fn activate_webrtc(
    ctx: &EffectContext,
    key: &SourceKey,
    src: String,
    events: Arc<SourceEvents>,
    active: &mut ActiveSource,
) {
    let store = ctx.store.clone();
    let bframes_events = events.clone();
    active.subscriptions.push(ctx.store.subscribe(
        |state| state.metadata.is_some_and(|metadata| metadata.bframes),
        move |bframes: &bool, _| {
            if *bframes {
                bframes_events.report(PlaybackError::bframes());
            }
        },
    ));

    let timeout = key.timeout;
    let timeout_events = events.clone();
    ctx.spawn_guarded(&active.guard, async move {
        tokio::time::sleep(timeout).await;
        if !store.read(|state| state.can_play) {
            warn!("No playable signal within {:?}", timeout);
            timeout_events.report(PlaybackError::timeout());
        }
    });

    let Some(transport) = ctx.transports.webrtc.clone() else {
        events.report(PlaybackError::transport("no WebRTC transport configured"));
        return;
    };

    let request = WebRtcStartRequest {
        src,
        element: ctx.element.clone(),
        access: key.access(),
        sdp_timeout: key.timeout,
    };
    match transport.start(request, events.clone()).await {
        Ok(handle) => active.handle = Some(handle),
        Err(e) => events.on_error(e),
    }
}

async fn activate_hls(
    ctx: &EffectContext,
    key: &SourceKey,
    src: String,
    events: Arc<SourceEvents>,
    active: &mut ActiveSource,
) {
    let Some(transport) = ctx.transports.hls.clone() else {
        events.report(PlaybackError::transport("no HLS transport configured"));
        return;
    };

    let request = HlsStartRequest {
        src,
        element: ctx.element.clone(),
        initial_quality: key.video_quality,
        aspect_ratio: key.aspect_ratio.unwrap_or(DEFAULT_ASPECT_RATIO),
        config: HlsConfig {
            options: ctx.options.hls_options.clone(),
            autoplay: key.autoplay,
            auth: ManifestAuth::new(key.access(), ctx.options.request_hook.clone()),
        },
    };

    let handle = match transport.start(request, events.clone()).await {
        Ok(handle) => handle,
        Err(e) => {
            events.on_error(e);
            return;
        }
    };

    let quality_handle = handle.clone();
    let guard = active.guard.clone();
    active.subscriptions.push(ctx.store.subscribe(
        |state| state.video_quality,
        move |quality: &VideoQuality, _| {
            if guard.is_cancelled() {
                return;
            }
            if let Err(e) = quality_handle.set_quality(*quality) {
                warn!("Failed to switch quality to {:?}: {}", quality, e);
            }
        },
    ));
    active.handle = Some(handle);
}

fn activate_progressive(
    ctx: &EffectContext,
    src: String,
    resume: Arc<ResumeSeek>,
    active: &mut ActiveSource,
) {
    ctx.store.on_final_url(Some(src.clone()));

    let guard = active.guard.clone();
    let handler: EventHandler = Arc::new(move |_event: &MediaEvent| {
        if !guard.is_cancelled() {
            resume.fire();
        }
    });
    active.listener = Some(
        ctx.element
            .add_event_listener(EventTarget::Media, EventKind::CanPlay, handler),
    );

    ctx.element.set_src(&src);
    ctx.element.load();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceInfo, InitialProps};

    fn key(error_count: u32, src: Option<&str>, mounted: bool) -> SourceKey {
        let store = ControllerStore::new(
            InitialProps::default(),
            src.map(PlaybackSource::hls),
            DeviceInfo::default(),
        );
        let mut key = store.read(SourceKey::from_state);
        key.error_count = error_count;
        key.mounted = mounted;
        key
    }

    #[test]
    fn test_same_trigger_ignores_unrelated_fields() {
        let a = key(0, Some("https://x/hls/a/index.m3u8"), true);
        let mut b = a.clone();
        b.progress = 42.0;
        b.live = true;
        b.video_quality = VideoQuality::P720;
        assert!(SourceKey::same_trigger(&a, &b));
    }

    #[test]
    fn test_same_trigger_detects_rebuilds() {
        let a = key(0, Some("https://x/hls/a/index.m3u8"), true);

        assert!(!SourceKey::same_trigger(&a, &key(1, Some("https://x/hls/a/index.m3u8"), true)));
        assert!(!SourceKey::same_trigger(&a, &key(0, Some("https://x/hls/b/index.m3u8"), true)));
        assert!(!SourceKey::same_trigger(&a, &key(0, None, true)));
        assert!(!SourceKey::same_trigger(&a, &key(0, Some("https://x/hls/a/index.m3u8"), false)));
    }

    #[test]
    fn test_error_reset_does_not_rebuild() {
        let failing = key(3, Some("https://x/hls/a/index.m3u8"), true);
        let recovered = key(0, Some("https://x/hls/a/index.m3u8"), true);
        assert!(SourceKey::same_trigger(&failing, &recovered));
        assert!(!SourceKey::same_trigger(&recovered, &failing));
    }
}
