use crate::error::PlaybackError;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 播放指标报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source_kind: Option<SourceKind>,
    pub source_url: Option<String>,
    pub final_url: Option<String>,
    /// Accumulated time spent playing
    pub playtime_ms: u64,
    /// Time from session start to the first `play`
    pub time_to_first_play_ms: Option<u64>,
    pub waiting_count: u32,
    pub stall_count: u32,
    pub error_count: u32,
    pub last_error: Option<PlaybackError>,
    pub progress: f64,
    pub duration: f64,
    pub buffered: f64,
    pub live: bool,
    pub playing: bool,
    pub playback_rate: f64,
    pub playback_offset_ms: Option<f64>,
    pub media_size: Option<Dimensions>,
    pub container_size: Option<Dimensions>,
}

/// 指标消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricsMessage {
    SessionStarted {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
        source_url: Option<String>,
    },
    Report(MetricsReport),
    SessionEnded {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl MetricsMessage {
    pub fn session_id(&self) -> Uuid {
        match self {
            MetricsMessage::SessionStarted { session_id, .. }
            | MetricsMessage::SessionEnded { session_id, .. } => *session_id,
            MetricsMessage::Report(report) => report.session_id,
        }
    }
}
