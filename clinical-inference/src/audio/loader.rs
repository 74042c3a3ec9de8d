//! Decode audio files through an ordered list of backends
//!
//! Backends are tried in turn until one yields a non-empty signal. Every
//! failure is recorded and, if all backends fail, reported together in
//! [`InferenceError::AudioDecode`].

use std::fs::File;
use std::path::Path;
use std::process::Command;

use hound::{SampleFormat, WavReader};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use super::{downmix, pcm_to_float, resample, AudioBuffer};
use crate::config::AudioConfig;
use crate::error::{InferenceError, InferenceResult};

/// Raw output of a backend before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved when `channels > 1`
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode `path`. Backends that can resample natively may target
    /// `target_rate` directly.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Audio`] when this backend cannot read the file.
    fn decode(&self, path: &Path, target_rate: u32) -> InferenceResult<DecodedAudio>;
}

/// Native WAV reader
#[derive(Debug, Clone, Copy, Default)]
pub struct HoundBackend;

impl AudioBackend for HoundBackend {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn decode(&self, path: &Path, _target_rate: u32) -> InferenceResult<DecodedAudio> {
        let mut reader =
            WavReader::open(path).map_err(|e| InferenceError::Audio(format!("Failed to open WAV: {e}")))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>(),
            SampleFormat::Int => reader
                .samples::<i32>()
                .map(|s| s.map(|v| pcm_to_float(v, spec.bits_per_sample)))
                .collect::<Result<_, _>>(),
        }
        .map_err(|e| InferenceError::Audio(format!("Failed to read WAV samples: {e}")))?;

        Ok(DecodedAudio {
            samples,
            channels: usize::from(spec.channels),
            sample_rate: spec.sample_rate,
        })
    }
}

/// Container/codec decoding (MP3, FLAC, OGG, AAC, ...)
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaBackend;

impl AudioBackend for SymphoniaBackend {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn decode(&self, path: &Path, _target_rate: u32) -> InferenceResult<DecodedAudio> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| InferenceError::Audio(format!("Failed to probe audio format: {e}")))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| InferenceError::Audio("No audio track found".to_string()))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track.codec_params.channels.map_or(0, |c| c.count());

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| InferenceError::Audio(format!("Failed to create decoder: {e}")))?;

        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(InferenceError::Audio(format!("Failed to read packet: {e}"))),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt packets are skipped
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!(error = %e, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(InferenceError::Audio(format!("Decoder failed: {e}"))),
            };

            let spec = *decoded.spec();
            if decoded.frames() == 0 {
                continue;
            }
            sample_rate = spec.rate;
            channels = spec.channels.count();

            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }

        if sample_rate == 0 {
            return Err(InferenceError::Audio("Stream does not declare a sample rate".to_string()));
        }

        Ok(DecodedAudio {
            samples,
            channels: channels.max(1),
            sample_rate,
        })
    }
}

/// External `ffmpeg` process, asked for mono s16le at the target rate
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: String,
}

impl FfmpegBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl AudioBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn decode(&self, path: &Path, target_rate: u32) -> InferenceResult<DecodedAudio> {
        let output = Command::new(&self.binary)
            .args(["-nostdin", "-v", "error", "-i"])
            .arg(path)
            .args(["-f", "s16le", "-acodec", "pcm_s16le", "-ac", "1", "-ar"])
            .arg(target_rate.to_string())
            .arg("-")
            .output()
            .map_err(|e| InferenceError::Audio(format!("Failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InferenceError::Audio(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let samples = output
            .stdout
            .chunks_exact(2)
            .map(|pair| pcm_to_float(i32::from(i16::from_le_bytes([pair[0], pair[1]])), 16))
            .collect();

        Ok(DecodedAudio {
            samples,
            channels: 1,
            sample_rate: target_rate,
        })
    }
}

/// Mono at `target_rate`
///
/// # Errors
///
/// Returns [`InferenceError::Audio`] when resampling fails.
pub fn normalize(decoded: DecodedAudio, target_rate: u32) -> InferenceResult<AudioBuffer> {
    let mono = downmix(&decoded.samples, decoded.channels);
    let samples = resample::resample(&mono, decoded.sample_rate, target_rate)?;
    Ok(AudioBuffer::new(samples, target_rate))
}

pub struct AudioLoader {
    backends: Vec<Box<dyn AudioBackend>>,
    target_rate: u32,
}

impl AudioLoader {
    pub fn new(backends: Vec<Box<dyn AudioBackend>>, target_rate: u32) -> Self {
        Self { backends, target_rate }
    }

    /// WAV, then symphonia, then ffmpeg
    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(
            vec![
                Box::new(HoundBackend),
                Box::new(SymphoniaBackend),
                Box::new(FfmpegBackend::new(config.ffmpeg_binary.clone())),
            ],
            config.target_sample_rate,
        )
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Decode `path` to mono at the target rate
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::AudioDecode`] listing every backend's
    /// failure when none produced samples.
    pub fn load(&self, path: &Path) -> InferenceResult<AudioBuffer> {
        if !path.is_file() {
            return Err(InferenceError::AudioDecode {
                path: path.to_path_buf(),
                attempts: vec!["file not found".to_string()],
            });
        }

        let mut attempts = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let result = backend
                .decode(path, self.target_rate)
                .and_then(|decoded| normalize(decoded, self.target_rate));

            match result {
                Ok(buffer) if !buffer.is_empty() => {
                    info!(
                        backend = backend.name(),
                        samples = buffer.len(),
                        duration_s = buffer.duration_seconds(),
                        "Audio decoded"
                    );
                    return Ok(buffer);
                }
                Ok(_) => {
                    warn!(backend = backend.name(), "Audio backend produced no samples");
                    attempts.push(format!("{}: decoded no samples", backend.name()));
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Audio backend failed");
                    attempts.push(format!("{}: {e}", backend.name()));
                }
            }
        }

        Err(InferenceError::AudioDecode {
            path: path.to_path_buf(),
            attempts,
        })
    }
}
