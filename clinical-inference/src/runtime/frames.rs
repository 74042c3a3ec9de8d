//! Row-major frame matrices exchanged with speech models

use crate::error::{InferenceError, InferenceResult};

/// Index of the first maximum; NaN never wins
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

/// Per-frame scores over the vocabulary, `frames x vocab`
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLogits {
    frames: usize,
    vocab: usize,
    data: Vec<f32>,
}

impl FrameLogits {
    /// # Errors
    ///
    /// Returns [`InferenceError::Runtime`] when `data` is not `frames * vocab` long.
    pub fn new(frames: usize, vocab: usize, data: Vec<f32>) -> InferenceResult<Self> {
        if frames.checked_mul(vocab) != Some(data.len()) {
            return Err(InferenceError::Runtime(format!(
                "logits shape {frames}x{vocab} does not match {} values",
                data.len()
            )));
        }
        Ok(Self { frames, vocab, data })
    }

    /// # Errors
    ///
    /// Returns [`InferenceError::Runtime`] for ragged rows.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> InferenceResult<Self> {
        let frames = rows.len();
        let vocab = rows.first().map_or(0, Vec::len);
        let data: Vec<f32> = rows.into_iter().flatten().collect();
        Self::new(frames, vocab, data)
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn vocab(&self) -> usize {
        self.vocab
    }

    pub fn row(&self, frame: usize) -> Option<&[f32]> {
        if frame >= self.frames || self.vocab == 0 {
            return None;
        }
        let start = frame * self.vocab;
        self.data.get(start..start + self.vocab)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on a zero width
        self.data.chunks_exact(self.vocab.max(1)).take(self.frames)
    }

    /// Arg-max id of every frame
    pub fn argmax_ids(&self) -> Vec<u32> {
        self.rows()
            .filter_map(argmax)
            .filter_map(|id| u32::try_from(id).ok())
            .collect()
    }
}

/// Acoustic features, `frames x dims`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    frames: usize,
    dims: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    /// # Errors
    ///
    /// Returns [`InferenceError::Runtime`] when `data` is not `frames * dims` long.
    pub fn new(frames: usize, dims: usize, data: Vec<f32>) -> InferenceResult<Self> {
        if frames.checked_mul(dims) != Some(data.len()) {
            return Err(InferenceError::Runtime(format!(
                "feature shape {frames}x{dims} does not match {} values",
                data.len()
            )));
        }
        Ok(Self { frames, dims, data })
    }

    pub fn zeros(frames: usize, dims: usize) -> Self {
        Self {
            frames,
            dims,
            data: vec![0.0; frames * dims],
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dims.max(1)).take(self.frames)
    }

    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.data.chunks_exact_mut(self.dims.max(1)).take(self.frames)
    }

    pub fn get(&self, frame: usize, dim: usize) -> Option<f32> {
        if dim >= self.dims {
            return None;
        }
        self.data.get(frame * self.dims + dim).copied()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}
