//! Mono sample rate conversion using rubato
//!
//! Sinc interpolation with a BlackmanHarris2 window. The resampler's output
//! delay is trimmed so the result lines up with the input and has
//! `ceil(len * to / from)` samples.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;
use tracing::debug;

/// Input frames fed to the resampler per call
const CHUNK_FRAMES: usize = 1024;

/// Resampling errors
#[derive(Debug, Error)]
pub enum ResampleError {
    /// Invalid rate pair or parameters
    #[error("failed to create resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    /// Processing failed
    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),

    /// Zero sample rate on either side
    #[error("invalid sample rate conversion {from} Hz -> {to} Hz")]
    InvalidRate { from: u32, to: u32 },
}

/// Resample a mono signal from `from_rate` to `to_rate`.
///
/// Returns a copy without processing when the rates already match.
pub fn resample_mono(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, ResampleError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(ResampleError::InvalidRate {
            from: from_rate,
            to: to_rate,
        });
    }

    if from_rate == to_rate {
        debug!("Sample rate already at {}Hz, skipping resample", to_rate);
        return Ok(samples.to_vec());
    }

    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let expected = (samples.len() as f64 * ratio).ceil() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, 1)?;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay + CHUNK_FRAMES);

    let mut chunks = samples.chunks_exact(CHUNK_FRAMES);
    for chunk in &mut chunks {
        let wave_in = vec![chunk.to_vec()];
        let wave_out = resampler.process(&wave_in, None)?;
        output.extend_from_slice(&wave_out[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let wave_in = vec![remainder.to_vec()];
        let wave_out = resampler.process_partial(Some(wave_in.as_slice()), None)?;
        output.extend_from_slice(&wave_out[0]);
    }

    // Flush the filter tail until the delayed signal is complete
    while output.len() < expected + delay {
        let wave_out = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
        if wave_out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&wave_out[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    debug!(
        "Resampled {} frames ({} Hz) -> {} frames ({} Hz)",
        samples.len(),
        from_rate,
        output.len(),
        to_rate
    );

    Ok(output)
}
