//! Sample-rate conversion via rubato
//!
//! The whole engine runs at 44.1 kHz; any input at another rate passes
//! through here exactly once at the decode boundary.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::config::PROCESSING_SAMPLE_RATE;
use crate::error::{Result, SegueError};

const CHUNK_FRAMES: usize = 1024;

/// Resample a mono buffer from one rate to another
///
/// Returns the input untouched when the rates already match.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f64>::new(ratio, 2.0, params, CHUNK_FRAMES, 1)
        .map_err(|e| SegueError::Other(format!("resampler init failed: {}", e)))?;

    let input: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    let mut output: Vec<f32> = Vec::with_capacity((samples.len() as f64 * ratio) as usize + 1024);

    let mut pos = 0;
    while pos + CHUNK_FRAMES <= input.len() {
        let chunk = &input[pos..pos + CHUNK_FRAMES];
        let processed = resampler
            .process(&[chunk], None)
            .map_err(|e| SegueError::Other(format!("resample failed: {}", e)))?;
        output.extend(processed[0].iter().map(|&s| s as f32));
        pos += CHUNK_FRAMES;
    }

    // Remaining partial chunk, then drain the resampler's internal delay line
    if pos < input.len() {
        let tail = &input[pos..];
        let processed = resampler
            .process_partial(Some(&[tail]), None)
            .map_err(|e| SegueError::Other(format!("resample failed: {}", e)))?;
        output.extend(processed[0].iter().map(|&s| s as f32));
    }
    let flush_input: Option<&[&[f64]]> = None;
    if let Ok(processed) = resampler.process_partial(flush_input, None) {
        output.extend(processed[0].iter().map(|&s| s as f32));
    }

    log::debug!(
        "resampled {} -> {} Hz ({} -> {} samples)",
        from_rate,
        to_rate,
        samples.len(),
        output.len()
    );

    Ok(output)
}

/// Resample a mono buffer to the engine's 44.1 kHz processing rate
pub fn to_processing_rate(samples: &[f32], from_rate: u32) -> Result<Vec<f32>> {
    resample(samples, from_rate, PROCESSING_SAMPLE_RATE)
}
