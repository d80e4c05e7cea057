//! Processing profiles
//!
//! A profile picks the strategy and the delivery format for a recording.
//! Many profiles may share one strategy.

use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;

/// A named processing profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Strategy used to split the recording
    pub strategy: String,

    /// Format stems are delivered in
    #[serde(default)]
    pub output_format: AudioFormat,

    /// Bitrate for lossy delivery formats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
}

impl Profile {
    pub fn new(strategy: impl Into<String>, output_format: AudioFormat) -> Self {
        Self {
            strategy: strategy.into(),
            output_format,
            bitrate_kbps: None,
        }
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = Some(kbps);
        self
    }

    /// Whether delivering this profile involves a conversion stage.
    pub fn needs_conversion(&self) -> bool {
        self.output_format.needs_conversion()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_profile_defaults_to_wav() {
        let profile: Profile = serde_yaml::from_str("strategy: four_stem").unwrap();
        assert_eq!(profile.output_format, AudioFormat::Wav);
        assert!(!profile.needs_conversion());
    }

    #[test]
    fn test_lossy_profile_needs_conversion() {
        let profile: Profile =
            serde_yaml::from_str("strategy: four_stem\noutput_format: mp3\nbitrate_kbps: 320")
                .unwrap();
        assert!(profile.needs_conversion());
        assert_eq!(profile.bitrate_kbps, Some(320));
    }
}
