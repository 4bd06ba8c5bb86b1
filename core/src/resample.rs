//! Helpers for getting recorded audio into the shape the receiver expects:
//! mono `f32` samples at the configured sample rate.

use crate::error::{LinkError, Result};

/// Mix interleaved multi-channel audio down to mono by averaging channels
///
/// # Arguments
/// * `samples` - Interleaved samples [c0, c1, ..., c0, c1, ...]
/// * `channels` - Number of interleaved channels
///
/// # Errors
/// `InvalidInputSize` if `channels` is zero or does not divide the sample count
pub fn downmix(samples: &[f32], channels: usize) -> Result<Vec<f32>> {
    if channels == 0 || samples.len() % channels != 0 {
        return Err(LinkError::InvalidInputSize);
    }
    if channels == 1 {
        return Ok(samples.to_vec());
    }

    Ok(samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

/// Resample audio to a target sample rate using linear interpolation
///
/// Good enough for tones well below the Nyquist frequency of both rates,
/// which is all the link ever carries.
///
/// # Example
/// ```
/// use pulselink_core::resample::resample;
/// let audio_48k = vec![0.0f32; 4800];
/// let audio_44k = resample(&audio_48k, 48000, 44100);
/// assert_eq!(audio_44k.len(), 4410);
/// ```
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_length = (samples.len() as f64 * ratio).round() as usize;
    let last = samples.len() - 1;

    (0..new_length)
        .map(|i| {
            let position = i as f64 / ratio;
            let index = (position.floor() as usize).min(last);
            let fraction = (position - index as f64) as f32;
            match samples.get(index + 1) {
                Some(&next) => samples[index] * (1.0 - fraction) + next * fraction,
                None => samples[index],
            }
        })
        .collect()
}

/// 16-bit PCM to normalized float
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

/// Normalized float to 16-bit PCM, clipping out-of-range input
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}
