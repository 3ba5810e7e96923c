use serde::{Deserialize, Serialize};
use std::fmt;

/// 媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    #[default]
    Video,
}

/// 传输后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// 渐进式下载（MP4/WebM/音频文件）
    Progressive,
    /// HLS分片流
    Hls,
    /// WebRTC/WHEP低延迟流
    Webrtc,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Progressive => write!(f, "progressive"),
            SourceKind::Hls => write!(f, "hls"),
            SourceKind::Webrtc => write!(f, "webrtc"),
        }
    }
}

/// 播放源
///
/// Immutable once selected. Replacing the source of a player tears down the
/// active transport and builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlaybackSource {
    Progressive {
        src: String,
        #[serde(default)]
        media: MediaKind,
    },
    Hls {
        src: String,
    },
    Webrtc {
        src: String,
    },
}

const AUDIO_EXTENSIONS: [&str; 6] = [".mp3", ".wav", ".ogg", ".m4a", ".aac", ".flac"];

impl PlaybackSource {
    pub fn progressive(src: impl Into<String>) -> Self {
        PlaybackSource::Progressive {
            src: src.into(),
            media: MediaKind::Video,
        }
    }

    pub fn hls(src: impl Into<String>) -> Self {
        PlaybackSource::Hls { src: src.into() }
    }

    pub fn webrtc(src: impl Into<String>) -> Self {
        PlaybackSource::Webrtc { src: src.into() }
    }

    /// Guess the transport from a bare URL.
    pub fn from_url(url: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_ascii_lowercase();

        if path.ends_with(".m3u8") {
            PlaybackSource::hls(url)
        } else if path.contains("/webrtc/") || path.contains("/whep/") {
            PlaybackSource::webrtc(url)
        } else if AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            PlaybackSource::Progressive {
                src: url.to_string(),
                media: MediaKind::Audio,
            }
        } else {
            PlaybackSource::progressive(url)
        }
    }

    pub fn src(&self) -> &str {
        match self {
            PlaybackSource::Progressive { src, .. }
            | PlaybackSource::Hls { src }
            | PlaybackSource::Webrtc { src } => src,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            PlaybackSource::Progressive { .. } => SourceKind::Progressive,
            PlaybackSource::Hls { .. } => SourceKind::Hls,
            PlaybackSource::Webrtc { .. } => SourceKind::Webrtc,
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        match self {
            PlaybackSource::Progressive { media, .. } => *media,
            _ => MediaKind::Video,
        }
    }
}

/// 播放速率
///
/// `Constant` locks the element to 1.0x (used for live streams) and is
/// serialized as the string `"constant"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlaybackRateRepr", into = "PlaybackRateRepr")]
pub enum PlaybackRate {
    Constant,
    Rate(f64),
}

impl PlaybackRate {
    /// Rate to apply to a media element.
    pub fn effective(&self) -> f64 {
        match self {
            PlaybackRate::Constant => 1.0,
            PlaybackRate::Rate(rate) => *rate,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, PlaybackRate::Constant)
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        PlaybackRate::Rate(1.0)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PlaybackRateRepr {
    Number(f64),
    Keyword(String),
}

impl TryFrom<PlaybackRateRepr> for PlaybackRate {
    type Error = String;

    fn try_from(repr: PlaybackRateRepr) -> Result<Self, Self::Error> {
        match repr {
            PlaybackRateRepr::Number(rate) if rate > 0.0 && rate.is_finite() => {
                Ok(PlaybackRate::Rate(rate))
            }
            PlaybackRateRepr::Number(rate) => Err(format!("invalid playback rate: {}", rate)),
            PlaybackRateRepr::Keyword(word) if word == "constant" => Ok(PlaybackRate::Constant),
            PlaybackRateRepr::Keyword(word) => Err(format!("unknown playback rate: {}", word)),
        }
    }
}

impl From<PlaybackRate> for PlaybackRateRepr {
    fn from(rate: PlaybackRate) -> Self {
        match rate {
            PlaybackRate::Constant => PlaybackRateRepr::Keyword("constant".to_string()),
            PlaybackRate::Rate(rate) => PlaybackRateRepr::Number(rate),
        }
    }
}

/// 清晰度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VideoQuality {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "240p")]
    P240,
    #[serde(rename = "144p")]
    P144,
}

impl VideoQuality {
    /// Target rendition height, `None` for adaptive selection.
    pub fn height(&self) -> Option<u32> {
        match self {
            VideoQuality::Auto => None,
            VideoQuality::P1080 => Some(1080),
            VideoQuality::P720 => Some(720),
            VideoQuality::P480 => Some(480),
            VideoQuality::P360 => Some(360),
            VideoQuality::P240 => Some(240),
            VideoQuality::P144 => Some(144),
        }
    }
}

/// 尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both sides known (non-zero).
    pub fn is_available(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_from_url() {
        let source = PlaybackSource::from_url("https://x/hls/abc/index.m3u8?token=1");
        assert_eq!(source.kind(), SourceKind::Hls);
        assert_eq!(source.src(), "https://x/hls/abc/index.m3u8?token=1");

        let source = PlaybackSource::from_url("https://x/webrtc/abc");
        assert_eq!(source.kind(), SourceKind::Webrtc);

        let source = PlaybackSource::from_url("https://x/podcast.MP3");
        assert_eq!(source.media_kind(), MediaKind::Audio);

        let source = PlaybackSource::from_url("https://x/video.mp4");
        assert_eq!(source.kind(), SourceKind::Progressive);
        assert_eq!(source.media_kind(), MediaKind::Video);
    }

    #[test]
    fn test_playback_rate_serde() {
        let constant: PlaybackRate = serde_json::from_str("\"constant\"").unwrap();
        assert_eq!(constant, PlaybackRate::Constant);
        assert_eq!(constant.effective(), 1.0);

        let rate: PlaybackRate = serde_json::from_str("1.5").unwrap();
        assert_eq!(rate, PlaybackRate::Rate(1.5));

        assert!(serde_json::from_str::<PlaybackRate>("\"fast\"").is_err());
        assert!(serde_json::from_str::<PlaybackRate>("0").is_err());
        assert_eq!(serde_json::to_string(&PlaybackRate::Constant).unwrap(), "\"constant\"");
    }

    #[test]
    fn test_source_serde_tag() {
        let json = serde_json::to_value(PlaybackSource::hls("https://x/hls/abc/index.m3u8")).unwrap();
        assert_eq!(json["type"], "hls");

        let quality: VideoQuality = serde_json::from_str("\"720p\"").unwrap();
        assert_eq!(quality.height(), Some(720));
    }
}
