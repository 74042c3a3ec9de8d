//! Audio ingestion: decoding, normalization, chunking and features

pub mod chunker;
pub mod features;
pub mod loader;
pub mod resample;

pub use chunker::{Chunk, Chunker};
pub use features::{cmvn, FbankConfig, FbankExtractor};
pub use loader::{AudioBackend, AudioLoader, DecodedAudio, FfmpegBackend, HoundBackend, SymphoniaBackend};

/// Mono float samples at a known rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Average interleaved channels into one
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Full-scale magnitude of signed PCM at `bits` per sample
pub fn pcm_full_scale(bits: u16) -> f32 {
    // 2^(bits - 1): 32768 for 16-bit, 2147483648 for 32-bit
    2f32.powi(i32::from(bits.clamp(1, 32)) - 1)
}

/// Signed integer PCM to [-1, 1)
pub fn pcm_to_float(sample: i32, bits: u16) -> f32 {
    sample as f32 / pcm_full_scale(bits)
}
