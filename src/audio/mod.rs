//! Audio file handling
//!
//! WAV I/O for intermediate stems, delivery format conversion, and the
//! loudness/waveform analysis that feeds the completion payload.

pub mod analysis;
pub mod convert;
pub mod format;
pub mod io;

pub use analysis::{waveform_peaks, LoudnessAnalyzer, StemMetrics, WavLoudnessAnalyzer, WaveformPeaks};
pub use convert::{FfmpegConverter, FormatConverter};
pub use format::AudioFormat;
pub use io::{read_wav, wav_duration_seconds, write_wav, WavData};
