//! WAV file I/O
//!
//! Intermediate stems are always WAV. Analysis works on a mono f32 mixdown.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{Result, StemforgeError};

/// Interleaved samples with their layout.
#[derive(Debug, Clone, PartialEq)]
pub struct WavData {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl WavData {
    pub fn num_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// Average all channels into one.
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Read a WAV file as interleaved f32 samples.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<WavData> {
    let path = path.as_ref();
    let reader = WavReader::open(path).map_err(|e| StemforgeError::AudioRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| {
                s.map_err(|e| StemforgeError::AudioRead {
                    path: path.to_path_buf(),
                    source: e,
                })
            })
            .collect::<Result<Vec<f32>>>()?,
        SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| {
                    s.map(|v| v as f32 / max_val)
                        .map_err(|e| StemforgeError::AudioRead {
                            path: path.to_path_buf(),
                            source: e,
                        })
                })
                .collect::<Result<Vec<f32>>>()?
        }
    };

    Ok(WavData {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

/// Write interleaved samples as a 32-bit float WAV file.
pub fn write_wav<P: AsRef<Path>>(path: P, data: &WavData) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: data.channels,
        sample_rate: data.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let write_err = |e| StemforgeError::AudioWrite {
        path: path.to_path_buf(),
        source: e,
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_err)?;
    for &sample in &data.samples {
        writer.write_sample(sample).map_err(write_err)?;
    }
    writer.finalize().map_err(write_err)?;

    Ok(())
}

/// Duration from the WAV header, without decoding samples.
pub fn wav_duration_seconds<P: AsRef<Path>>(path: P) -> Result<f64> {
    let path = path.as_ref();
    let reader = WavReader::open(path).map_err(|e| StemforgeError::AudioRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Ok(0.0);
    }
    // duration() counts frames, not interleaved samples
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn stereo_tone(seconds: f32, sample_rate: u32) -> WavData {
        let frames = (seconds * sample_rate as f32) as usize;
        let mut samples = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let v = (i as f32 * 0.01).sin() * 0.5;
            samples.push(v);
            samples.push(-v);
        }
        WavData {
            samples,
            channels: 2,
            sample_rate,
        }
    }

    #[test]
    fn test_write_then_read_preserves_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let original = stereo_tone(0.25, 8000);

        write_wav(&path, &original).unwrap();
        let loaded = read_wav(&path).unwrap();

        assert_eq!(loaded.channels, 2);
        assert_eq!(loaded.sample_rate, 8000);
        assert_eq!(loaded.num_frames(), original.num_frames());
        assert_relative_eq!(wav_duration_seconds(&path).unwrap(), 0.25, epsilon = 1e-3);
    }

    #[test]
    fn test_mono_mixdown_cancels_opposite_channels() {
        let data = stereo_tone(0.1, 8000);
        assert!(data.to_mono().iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_wav("does_not_exist.wav");
        assert!(matches!(result, Err(StemforgeError::AudioRead { .. })));
    }
}
