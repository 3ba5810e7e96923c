use anyhow::{Context, Result};
use clap::Parser;
use common::{PlaybackSource, SourceKind, STREAM_OPEN_ERROR_MESSAGE};
use media_controller::config::{ConfigManager, ControllerConfig, EnvConfigOverride};
use media_controller::controller::{ControllerDeps, MediaController};
use media_controller::element::{EventKind, MediaElement};
use media_controller::errors::{MetricsError, TransportError, TransportResponse};
use media_controller::metrics::{ChannelSink, MetricsReporter};
use media_controller::mock::{MockMediaElement, MockTransport, MockUrlProbe, SessionBehavior};
use media_controller::transport::Transports;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "player-sim")]
#[command(about = "Run the playback controller against simulated media", long_about = None)]
struct Args {
    /// TOML config file, created with defaults when missing
    #[arg(long, env = "MEDIA_CONTROLLER_CONFIG")]
    config: Option<PathBuf>,

    /// Source URL; the transport is picked from its shape
    #[arg(long, default_value = "https://example.com/hls/demo/index.m3u8")]
    source: String,

    /// Failed sessions before the stream connects
    #[arg(long, default_value = "3")]
    failures: usize,

    /// Report the stream as live once connected
    #[arg(long)]
    live: bool,

    /// Seconds to run before shutting down
    #[arg(long, default_value = "15")]
    run_for: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.clone()).await?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_target(false)
        .init();

    let source = PlaybackSource::from_url(&args.source);
    info!("Simulating {} playback of {}", source.kind(), source.src());

    let element = Arc::new(MockMediaElement::new());
    let transport = Arc::new(MockTransport::new());
    for _ in 0..args.failures {
        transport.push_behavior(SessionBehavior::Fail(scripted_failure(source.kind())));
    }
    transport.push_behavior(SessionBehavior::Connect {
        live: args.live,
        duration: if args.live { f64::INFINITY } else { 120.0 },
    });

    let deps = ControllerDeps {
        transports: Transports::new()
            .with_hls(transport.clone())
            .with_webrtc(transport.clone()),
        url_probe: Arc::new(MockUrlProbe::with_status(503)),
        capability_probe: None,
    };

    let controller = MediaController::from_config(
        &config,
        element.clone() as Arc<dyn MediaElement>,
        Some(source.clone()),
        deps,
    );
    let store = controller.store().clone();

    let reporter = if config.metrics.enabled {
        let (sink, mut rx) = ChannelSink::new(64);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match serde_json::to_string(&message) {
                    Ok(json) => info!("metrics: {}", json),
                    Err(e) => warn!("Unserializable metrics message: {}", e),
                }
            }
        });
        Some(MetricsReporter::start(
            &store,
            Arc::new(sink),
            Some(args.source.clone()),
            config.metrics.interval,
            Some(Arc::new(|e: MetricsError| warn!("Metrics delivery failed: {}", e))),
        ))
    } else {
        None
    };

    if source.kind() == SourceKind::Progressive {
        // the simulated element has no decoder, so it reports readiness itself
        element.set_duration_value(120.0);
        element.dispatch(EventKind::DurationChange);
        element.dispatch(EventKind::LoadedMetadata);
        element.dispatch(EventKind::CanPlay);
    }

    store.request_toggle_play_pause();

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.run_for)) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Interrupted");
        }
    }

    let state = store.get_state();
    info!(
        "Final state: can_play={} live={} playing={} error_count={} error={:?}",
        state.can_play, state.live, state.playing, state.error_count, state.error
    );
    info!(
        "Transport sessions started: {} (max concurrently active: {})",
        transport.start_count(),
        transport.max_active()
    );

    if let Some(reporter) = reporter {
        reporter.shutdown().await;
    }
    controller.shutdown().await;
    info!("Player simulation complete");

    Ok(())
}

async fn load_config(path: Option<PathBuf>) -> Result<ControllerConfig> {
    let mut config = match path {
        Some(path) => {
            let mut manager = ConfigManager::new(path);
            manager
                .load()
                .await
                .with_context(|| format!("Failed to load {}", manager.path().display()))?;
            manager.get_config().clone()
        }
        None => ControllerConfig::default(),
    };

    EnvConfigOverride::apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn scripted_failure(kind: SourceKind) -> TransportError {
    match kind {
        SourceKind::Webrtc => TransportError::WebRtc {
            message: STREAM_OPEN_ERROR_MESSAGE.to_string(),
        },
        _ => TransportError::Hls {
            message: "manifestLoadError".to_string(),
            response: Some(TransportResponse {
                code: 503,
                data: None,
            }),
        },
    }
}
