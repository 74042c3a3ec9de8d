//! Sample-rate conversion

use rubato::{FftFixedInOut, Resampler};

use crate::error::{InferenceError, InferenceResult};

/// Requested input block; rubato rounds it to a multiple of the rate ratio
const CHUNK_SIZE: usize = 1024;

/// Resample mono `samples` from `from_rate` to `to_rate`
///
/// The output holds `round(len * to_rate / from_rate)` samples.
///
/// # Errors
///
/// Returns [`InferenceError::Audio`] for a zero rate or a resampler failure.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> InferenceResult<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(InferenceError::Audio(format!(
            "Cannot resample from {from_rate} Hz to {to_rate} Hz"
        )));
    }

    let mut resampler = FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 1)
        .map_err(|e| InferenceError::Audio(format!("Failed to create resampler: {e}")))?;

    let frames_in = resampler.input_frames_next();
    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;
    let mut output = Vec::with_capacity(expected + resampler.output_frames_next());

    for block in samples.chunks(frames_in) {
        let mut input = block.to_vec();
        // Last block is zero-padded to a full frame
        input.resize(frames_in, 0.0);
        let processed = resampler
            .process(std::slice::from_ref(&input), None)
            .map_err(|e| InferenceError::Audio(format!("Resampling failed: {e}")))?;
        if let Some(channel) = processed.first() {
            output.extend_from_slice(channel);
        }
    }

    output.truncate(expected);
    Ok(output)
}
