use std::fmt;
use serde::Serialize;

/// Quality labels understood by the resolver
pub const QUALITY_LABELS: &[&str] = &["low", "medium", "high", "original"];

/// Bitrate cap in kilobits per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bitrate(pub u32);

impl Bitrate {
    /// Value in the form ffmpeg expects, e.g. `500k`
    pub fn to_ffmpeg_arg(self) -> String {
        format!("{}k", self.0)
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.0)
    }
}

/// Bitrate constraints applied to one conversion.
///
/// Absent bitrates mean the source quality is passed through unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityPreset {
    pub video_bitrate: Option<Bitrate>,
    pub audio_bitrate: Option<Bitrate>,
}

impl QualityPreset {
    pub const LOW: QualityPreset = QualityPreset::capped(500, 64);
    pub const MEDIUM: QualityPreset = QualityPreset::capped(1000, 128);
    pub const HIGH: QualityPreset = QualityPreset::capped(2000, 192);
    pub const ORIGINAL: QualityPreset = QualityPreset {
        video_bitrate: None,
        audio_bitrate: None,
    };

    const fn capped(video_kbps: u32, audio_kbps: u32) -> Self {
        QualityPreset {
            video_bitrate: Some(Bitrate(video_kbps)),
            audio_bitrate: Some(Bitrate(audio_kbps)),
        }
    }
}

/// Resolve a quality label to its preset.
///
/// Unrecognised labels resolve to `medium` instead of failing.
pub fn resolve(label: &str) -> QualityPreset {
    match label.trim().to_lowercase().as_str() {
        "low" => QualityPreset::LOW,
        "medium" => QualityPreset::MEDIUM,
        "high" => QualityPreset::HIGH,
        "original" => QualityPreset::ORIGINAL,
        other => {
            log::debug!("Unknown quality label {:?}, using medium", other);
            QualityPreset::MEDIUM
        }
    }
}
