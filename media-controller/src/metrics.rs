use crate::bridge::{BridgeOptions, EventBridge, UrlProbe};
use crate::device::initial_device_info;
use crate::element::MediaElement;
use crate::errors::MetricsError;
use crate::store::{ControllerStore, Subscription};
use crate::types::{ControllerState, InitialProps};
use async_trait::async_trait;
use chrono::Utc;
use common::{MetricsMessage, MetricsReport, PlaybackError, PlaybackSource};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

pub type MetricsErrorCallback = Arc<dyn Fn(MetricsError) + Send + Sync>;

/// Destination of metrics messages.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn send(&self, message: MetricsMessage) -> Result<(), MetricsError>;
}

/// Sink backed by a bounded channel.
pub struct ChannelSink {
    tx: mpsc::Sender<MetricsMessage>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MetricsMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MetricsSink for ChannelSink {
    async fn send(&self, message: MetricsMessage) -> Result<(), MetricsError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| MetricsError::SinkClosed)
    }
}

// ============================================================================
// Collector
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct PlaybackSignals {
    playing: bool,
    waiting: bool,
    stalled: bool,
    error_count: u32,
    error: Option<PlaybackError>,
}

impl PlaybackSignals {
    fn from_state(state: &ControllerState) -> Self {
        Self {
            playing: state.playing,
            waiting: state.waiting,
            stalled: state.stalled,
            error_count: state.error_count,
            error: state.error.clone(),
        }
    }
}

/// Accumulates counters from state transitions.
#[derive(Debug)]
pub struct MetricsCollector {
    session_id: Uuid,
    source_url: Option<String>,
    started: Instant,
    playing_since: Option<Instant>,
    playtime: Duration,
    time_to_first_play: Option<Duration>,
    waiting_count: u32,
    stall_count: u32,
    error_total: u32,
    last_error: Option<PlaybackError>,
}

impl MetricsCollector {
    pub fn new(source_url: Option<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            source_url,
            started: Instant::now(),
            playing_since: None,
            playtime: Duration::ZERO,
            time_to_first_play: None,
            waiting_count: 0,
            stall_count: 0,
            error_total: 0,
            last_error: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    fn observe(&mut self, next: &PlaybackSignals, previous: &PlaybackSignals) {
        let now = Instant::now();

        if next.playing && !previous.playing {
            self.playing_since = Some(now);
            if self.time_to_first_play.is_none() {
                self.time_to_first_play = Some(now - self.started);
            }
        } else if !next.playing && previous.playing {
            if let Some(since) = self.playing_since.take() {
                self.playtime += now - since;
            }
        }

        if next.waiting && !previous.waiting {
            self.waiting_count += 1;
        }
        if next.stalled && !previous.stalled {
            self.stall_count += 1;
        }
        if next.error_count > previous.error_count {
            self.error_total += next.error_count - previous.error_count;
            self.last_error = next.error.clone();
        }
    }

    fn playtime(&self) -> Duration {
        let running = self
            .playing_since
            .map(|since| Instant::now() - since)
            .unwrap_or_default();
        self.playtime + running
    }

    pub fn report(&self, state: &ControllerState) -> MetricsReport {
        let source_url = self
            .source_url
            .clone()
            .or_else(|| state.current_source.as_ref().map(|s| s.src().to_string()));
        let source_kind = state
            .current_source
            .as_ref()
            .map(|source| source.kind())
            .or_else(|| {
                source_url
                    .as_deref()
                    .map(|url| PlaybackSource::from_url(url).kind())
            });

        MetricsReport {
            session_id: self.session_id,
            timestamp: Utc::now(),
            source_kind,
            source_url,
            final_url: state.final_url.clone(),
            playtime_ms: self.playtime().as_millis() as u64,
            time_to_first_play_ms: self.time_to_first_play.map(|d| d.as_millis() as u64),
            waiting_count: self.waiting_count,
            stall_count: self.stall_count,
            error_count: self.error_total,
            last_error: self.last_error.clone(),
            progress: state.progress,
            duration: state.duration,
            buffered: state.buffered,
            live: state.live,
            playing: state.playing,
            playback_rate: state.playback_rate.effective(),
            playback_offset_ms: state.playback_offset_ms,
            media_size: state.size.media,
            container_size: state.size.container,
        }
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Streams periodic [`MetricsReport`]s of a store to a sink. Sink failures go
/// to `on_error` and never touch playback.
pub struct MetricsReporter {
    store: ControllerStore,
    collector: Arc<Mutex<MetricsCollector>>,
    subscription: Subscription,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsReporter {
    pub fn start(
        store: &ControllerStore,
        sink: Arc<dyn MetricsSink>,
        source_url: Option<String>,
        interval: Duration,
        on_error: Option<MetricsErrorCallback>,
    ) -> Self {
        let collector = Arc::new(Mutex::new(MetricsCollector::new(source_url)));

        let observer = collector.clone();
        let subscription = store.subscribe(
            PlaybackSignals::from_state,
            move |next: &PlaybackSignals, previous: &PlaybackSignals| {
                observer.lock().observe(next, previous);
            },
        );

        let token = CancellationToken::new();
        let task = tokio::spawn(report_loop(
            store.clone(),
            collector.clone(),
            sink,
            interval,
            on_error,
            token.clone(),
        ));

        Self {
            store: store.clone(),
            collector,
            subscription,
            token,
            task: Mutex::new(Some(task)),
        }
    }

    /// Current report, without sending it.
    pub fn snapshot(&self) -> MetricsReport {
        let collector = self.collector.lock();
        self.store.read(|state| collector.report(state))
    }

    /// Stop observing; the final report and session end are sent in the
    /// background.
    pub fn destroy(&self) {
        self.subscription.unsubscribe();
        self.token.cancel();
    }

    /// [`MetricsReporter::destroy`] and wait for the final messages.
    pub async fn shutdown(&self) {
        self.destroy();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Metrics task failed: {}", e);
            }
        }
    }
}

impl Drop for MetricsReporter {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn report_loop(
    store: ControllerStore,
    collector: Arc<Mutex<MetricsCollector>>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    on_error: Option<MetricsErrorCallback>,
    token: CancellationToken,
) {
    let deliver = |result: Result<(), MetricsError>| {
        if let Err(e) = result {
            warn!("Failed to deliver metrics: {}", e);
            if let Some(on_error) = &on_error {
                on_error(e);
            }
        }
    };

    let session_id = collector.lock().session_id();
    let source_url = collector.lock().source_url.clone();
    deliver(
        sink.send(MetricsMessage::SessionStarted {
            session_id,
            timestamp: Utc::now(),
            source_url,
        })
        .await,
    );

    let mut ticker = interval_at(Instant::now() + interval, interval);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let report = {
                    let collector = collector.lock();
                    store.read(|state| collector.report(state))
                };
                deliver(sink.send(MetricsMessage::Report(report)).await);
            }
        }
    }

    let report = {
        let collector = collector.lock();
        store.read(|state| collector.report(state))
    };
    deliver(sink.send(MetricsMessage::Report(report)).await);
    deliver(
        sink.send(MetricsMessage::SessionEnded {
            session_id,
            timestamp: Utc::now(),
        })
        .await,
    );
    debug!("Metrics session {} ended", session_id);
}

// ============================================================================
// Standalone entry point
// ============================================================================

/// Store, listeners and reporter created by [`add_media_metrics`].
pub struct MediaMetrics {
    pub store: ControllerStore,
    bridge: EventBridge,
    reporter: MetricsReporter,
}

impl MediaMetrics {
    pub fn snapshot(&self) -> MetricsReport {
        self.reporter.snapshot()
    }

    /// Tear down listeners, reporter and store. Idempotent.
    pub fn destroy(&self) {
        self.bridge.detach();
        self.reporter.destroy();
        self.store.destroy();
    }

    pub async fn shutdown(&self) {
        self.bridge.detach();
        self.reporter.shutdown().await;
        self.store.destroy();
    }
}

/// Gather playback metrics from a bare media element, with no controls
/// attached: hotkeys and autohide are off and no effects are installed.
pub fn add_media_metrics(
    element: Arc<dyn MediaElement>,
    source_url: Option<String>,
    sink: Arc<dyn MetricsSink>,
    url_probe: Arc<dyn UrlProbe>,
    interval: Duration,
    on_error: Option<MetricsErrorCallback>,
) -> MediaMetrics {
    let source = source_url.as_deref().map(PlaybackSource::from_url);
    let kind = source.as_ref().map(|s| s.media_kind()).unwrap_or_default();
    let props = InitialProps {
        hotkeys: false,
        ..InitialProps::default()
    };

    let store = ControllerStore::new(props, source, initial_device_info(element.as_ref(), kind));
    let bridge = EventBridge::attach(
        &store,
        element,
        url_probe,
        BridgeOptions {
            autohide: Duration::ZERO,
        },
    );
    let reporter = MetricsReporter::start(&store, sink, source_url, interval, on_error);

    MediaMetrics {
        store,
        bridge,
        reporter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceInfo;

    #[tokio::test(start_paused = true)]
    async fn test_collector_counts_transitions() {
        let store = ControllerStore::new(
            InitialProps::default(),
            Some(PlaybackSource::hls("https://x/hls/abc/index.m3u8")),
            DeviceInfo::default(),
        );
        let (sink, _rx) = ChannelSink::new(16);
        let reporter = MetricsReporter::start(
            &store,
            Arc::new(sink),
            None,
            Duration::from_secs(60),
            None,
        );

        tokio::time::advance(Duration::from_millis(250)).await;
        store.on_play();
        tokio::time::advance(Duration::from_millis(1000)).await;
        store.on_waiting();
        store.on_progress(1.0);
        store.on_waiting();
        store.on_stalled();
        store.on_pause();
        store.on_error(PlaybackError::offline());

        let report = reporter.snapshot();
        assert_eq!(report.time_to_first_play_ms, Some(250));
        assert_eq!(report.playtime_ms, 1000);
        assert_eq!(report.waiting_count, 2);
        assert_eq!(report.stall_count, 1);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.last_error, Some(PlaybackError::offline()));
        assert_eq!(report.source_kind, Some(common::SourceKind::Hls));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_sends_session_lifecycle() {
        let store = ControllerStore::new(InitialProps::default(), None, DeviceInfo::default());
        let (sink, mut rx) = ChannelSink::new(16);
        let reporter = MetricsReporter::start(
            &store,
            Arc::new(sink),
            Some("https://x/video.mp4".to_string()),
            Duration::from_secs(5),
            None,
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        reporter.shutdown().await;

        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }

        assert!(matches!(messages.first(), Some(MetricsMessage::SessionStarted { .. })));
        assert!(matches!(messages.last(), Some(MetricsMessage::SessionEnded { .. })));
        let reports = messages
            .iter()
            .filter(|m| matches!(m, MetricsMessage::Report(_)))
            .count();
        // two ticks plus the final report
        assert_eq!(reports, 3);
        assert!(messages.iter().all(|m| m.session_id() == messages[0].session_id()));
    }

    #[tokio::test]
    async fn test_sink_failure_reported_to_callback() {
        let store = ControllerStore::new(InitialProps::default(), None, DeviceInfo::default());
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);

        let failures = Arc::new(Mutex::new(Vec::<MetricsError>::new()));
        let seen = failures.clone();
        let reporter = MetricsReporter::start(
            &store,
            Arc::new(sink),
            None,
            Duration::from_secs(5),
            Some(Arc::new(move |e: MetricsError| seen.lock().push(e))),
        );
        reporter.shutdown().await;

        let failures = failures.lock();
        assert!(!failures.is_empty());
        assert!(failures.iter().all(|e| *e == MetricsError::SinkClosed));
    }
}
