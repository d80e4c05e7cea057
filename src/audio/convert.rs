//! Transcoding lossless stems to a delivery format

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::audio::AudioFormat;
use crate::error::{Result, StemforgeError};

/// Transcodes one lossless intermediate into a delivery format.
pub trait FormatConverter: Send + Sync {
    /// Write `input` as `format` next to it (extension substituted) and
    /// return the new path.
    fn convert(&self, input: &Path, format: AudioFormat, bitrate_kbps: Option<u32>)
        -> Result<PathBuf>;
}

/// Converter that shells out to `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    binary: PathBuf,
}

impl FfmpegConverter {
    pub fn new() -> Self {
        let binary = std::env::var("STEMFORGE_FFMPEG").unwrap_or_else(|_| "ffmpeg".into());
        Self {
            binary: PathBuf::from(binary),
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments for one conversion, without the binary.
    pub fn build_args(
        input: &Path,
        output: &Path,
        format: AudioFormat,
        bitrate_kbps: Option<u32>,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:a".to_string(),
            format.ffmpeg_codec().to_string(),
        ];
        if let Some(kbps) = bitrate_kbps.filter(|_| !format.is_lossless()) {
            args.push("-b:a".to_string());
            args.push(format!("{}k", kbps));
        }
        args.push(output.to_string_lossy().to_string());
        args
    }
}

impl Default for FfmpegConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter for FfmpegConverter {
    fn convert(
        &self,
        input: &Path,
        format: AudioFormat,
        bitrate_kbps: Option<u32>,
    ) -> Result<PathBuf> {
        if !format.needs_conversion() {
            return Ok(input.to_path_buf());
        }

        let output = format.apply_to(input);
        let args = Self::build_args(input, &output, format, bitrate_kbps);
        debug!(input = %input.display(), %format, "Transcoding stem");

        let result = Command::new(&self.binary).args(&args).output().map_err(|e| {
            StemforgeError::Conversion {
                path: input.to_path_buf(),
                reason: format!("could not run {}: {}", self.binary.display(), e),
            }
        })?;

        if !result.status.success() {
            return Err(StemforgeError::Conversion {
                path: input.to_path_buf(),
                reason: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lossy_args_carry_bitrate() {
        let args = FfmpegConverter::build_args(
            Path::new("in.wav"),
            Path::new("in.mp3"),
            AudioFormat::Mp3,
            Some(320),
        );
        assert_eq!(args.last().map(String::as_str), Some("in.mp3"));
        assert!(args.windows(2).any(|w| w[0] == "-b:a" && w[1] == "320k"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "libmp3lame"));
    }

    #[test]
    fn test_lossless_args_ignore_bitrate() {
        let args = FfmpegConverter::build_args(
            Path::new("in.wav"),
            Path::new("in.flac"),
            AudioFormat::Flac,
            Some(320),
        );
        assert!(!args.iter().any(|a| a == "-b:a"));
    }

    #[test]
    fn test_intermediate_format_is_passthrough() {
        let converter = FfmpegConverter::with_binary("/nonexistent/ffmpeg");
        let out = converter
            .convert(Path::new("stem.wav"), AudioFormat::Wav, None)
            .unwrap();
        assert_eq!(out, PathBuf::from("stem.wav"));
    }

    #[test]
    fn test_missing_binary_is_conversion_error() {
        let converter = FfmpegConverter::with_binary("/nonexistent/ffmpeg");
        let err = converter
            .convert(Path::new("stem.wav"), AudioFormat::Mp3, Some(192))
            .unwrap_err();
        assert_eq!(err.error_code(), "CONVERSION_ERROR");
    }
}
