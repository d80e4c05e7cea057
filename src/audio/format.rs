//! Delivery formats

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Audio container/codec a profile delivers its stems in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Lossless working representation for every separation step
    #[default]
    Wav,
    Flac,
    Mp3,
    Ogg,
    M4a,
}

impl AudioFormat {
    /// Format every intermediate stem is written in.
    pub const INTERMEDIATE: AudioFormat = AudioFormat::Wav;

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::M4a => "m4a",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "wav" | "wave" => Some(Self::Wav),
            "flac" => Some(Self::Flac),
            "mp3" => Some(Self::Mp3),
            "ogg" | "oga" => Some(Self::Ogg),
            "m4a" | "aac" => Some(Self::M4a),
            _ => None,
        }
    }

    /// Format of a file, judged by its extension.
    pub fn of_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Wav | Self::Flac)
    }

    /// Whether stems must be transcoded before delivery.
    pub fn needs_conversion(&self) -> bool {
        *self != Self::INTERMEDIATE
    }

    /// Encoder name passed to ffmpeg's `-c:a`.
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            Self::Wav => "pcm_s16le",
            Self::Flac => "flac",
            Self::Mp3 => "libmp3lame",
            Self::Ogg => "libvorbis",
            Self::M4a => "aac",
        }
    }

    /// Same file name, this format's extension.
    pub fn apply_to(&self, path: &Path) -> PathBuf {
        path.with_extension(self.extension())
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
