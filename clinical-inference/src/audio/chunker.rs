//! Fixed-length overlapping windows over a sample buffer

use super::AudioBuffer;
use crate::config::AudioConfig;
use crate::error::{InferenceError, InferenceResult};

/// A window into an [`AudioBuffer`], `[start, end)` in samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk<'a> {
    pub samples: &'a [f32],
    pub start: usize,
    pub end: usize,
}

impl Chunk<'_> {
    pub fn start_seconds(&self, sample_rate: u32) -> f64 {
        self.start as f64 / f64::from(sample_rate.max(1))
    }

    pub fn end_seconds(&self, sample_rate: u32) -> f64 {
        self.end as f64 / f64::from(sample_rate.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunker {
    chunk_seconds: f32,
    overlap_seconds: f32,
}

impl Chunker {
    /// # Errors
    ///
    /// Returns [`InferenceError::Config`] unless `0 <= overlap < chunk`.
    pub fn new(chunk_seconds: f32, overlap_seconds: f32) -> InferenceResult<Self> {
        if chunk_seconds.is_nan() || chunk_seconds <= 0.0 || !(0.0..chunk_seconds).contains(&overlap_seconds) {
            return Err(InferenceError::Config(format!(
                "chunk of {chunk_seconds}s with {overlap_seconds}s overlap never advances"
            )));
        }
        Ok(Self {
            chunk_seconds,
            overlap_seconds,
        })
    }

    /// # Errors
    ///
    /// See [`Chunker::new`].
    pub fn from_config(config: &AudioConfig) -> InferenceResult<Self> {
        Self::new(config.chunk_seconds, config.overlap_seconds)
    }

    /// `(start, end)` sample bounds for a signal of `total` samples
    ///
    /// Windows start every `chunk - overlap` samples; the last one is cut
    /// at the end of the signal. A signal no longer than one chunk, empty
    /// included, is a single window.
    pub fn boundaries(&self, total: usize, sample_rate: u32) -> Vec<(usize, usize)> {
        let chunk = seconds_to_samples(self.chunk_seconds, sample_rate).max(1);
        let overlap = seconds_to_samples(self.overlap_seconds, sample_rate);
        let step = chunk.saturating_sub(overlap).max(1);

        if total <= chunk {
            return vec![(0, total)];
        }

        let mut bounds = Vec::with_capacity(total / step + 1);
        let mut start = 0;
        loop {
            let end = (start + chunk).min(total);
            bounds.push((start, end));
            if end >= total {
                break;
            }
            start += step;
        }
        bounds
    }

    pub fn split<'a>(&self, buffer: &'a AudioBuffer) -> Vec<Chunk<'a>> {
        self.boundaries(buffer.len(), buffer.sample_rate)
            .into_iter()
            .map(|(start, end)| Chunk {
                samples: &buffer.samples[start..end],
                start,
                end,
            })
            .collect()
    }
}

fn seconds_to_samples(seconds: f32, sample_rate: u32) -> usize {
    (f64::from(seconds) * f64::from(sample_rate)).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunker() -> Chunker {
        Chunker::new(20.0, 2.0).unwrap()
    }

    #[test]
    fn test_fifty_seconds_at_16k() {
        let bounds = chunker().boundaries(800_000, 16_000);
        assert_eq!(
            bounds,
            vec![(0, 320_000), (288_000, 608_000), (576_000, 800_000)]
        );
    }

    #[test]
    fn test_short_and_empty_buffers_are_one_chunk() {
        assert_eq!(chunker().boundaries(16_000, 16_000), vec![(0, 16_000)]);
        assert_eq!(chunker().boundaries(320_000, 16_000), vec![(0, 320_000)]);

        let empty = AudioBuffer::new(Vec::new(), 16_000);
        let chunks = chunker().split(&empty);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].samples.is_empty());
    }

    #[test]
    fn test_overlap_must_be_shorter_than_chunk() {
        assert!(Chunker::new(20.0, 20.0).is_err());
        assert!(Chunker::new(20.0, -1.0).is_err());
        assert!(Chunker::new(0.0, 0.0).is_err());
    }

    #[test]
    fn test_chunk_times() {
        let buffer = AudioBuffer::new(vec![0.0; 400_000], 16_000);
        let chunks = chunker().split(&buffer);
        assert_eq!(chunks.len(), 2);
        assert!((chunks[1].start_seconds(16_000) - 18.0).abs() < 1e-9);
        assert!((chunks[1].end_seconds(16_000) - 25.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn chunks_cover_signal_with_fixed_overlap(total in 0usize..2_000_000) {
            let bounds = chunker().boundaries(total, 16_000);
            prop_assert_eq!(bounds[0].0, 0);
            prop_assert_eq!(bounds[bounds.len() - 1].1, total);
            for (start, end) in &bounds {
                prop_assert!(end - start <= 320_000);
            }
            for pair in bounds.windows(2) {
                prop_assert_eq!(pair[1].0 - pair[0].0, 288_000);
                prop_assert_eq!(pair[0].1 - pair[1].0, 32_000);
            }
        }
    }
}
