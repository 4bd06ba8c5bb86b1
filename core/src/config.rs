use crate::assembler::AssemblyLimits;
use crate::error::{LinkError, Result};
use crate::plan::FrequencyPlan;
use crate::tone::ToneEnvelope;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything both ends of the link must agree on, plus receiver tuning
///
/// Missing fields fall back to the defaults when deserializing, so a config
/// file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub plan: FrequencyPlan,
    /// Sample rate of rendered and captured audio, in Hz
    pub sample_rate: u32,
    pub tone_duration_ms: u64,
    pub attack_ms: u64,
    pub peak_amplitude: f32,
    /// Samples per capture callback
    pub frame_size: usize,
    /// Analysis window length (power of two)
    pub fft_size: usize,
    /// Samples between successive analysis windows
    pub hop_size: usize,
    pub limits: AssemblyLimits,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            plan: FrequencyPlan::default(),
            sample_rate: crate::SAMPLE_RATE,
            tone_duration_ms: crate::TONE_DURATION_MS,
            attack_ms: crate::ATTACK_MS,
            peak_amplitude: crate::PEAK_AMPLITUDE,
            frame_size: crate::FRAME_SIZE,
            fft_size: crate::FFT_SIZE,
            hop_size: crate::HOP_SIZE,
            limits: AssemblyLimits::default(),
        }
    }
}

impl LinkConfig {
    pub fn tone_duration(&self) -> Duration {
        Duration::from_millis(self.tone_duration_ms)
    }

    pub fn envelope(&self) -> ToneEnvelope {
        ToneEnvelope {
            attack: Duration::from_millis(self.attack_ms),
            peak: self.peak_amplitude,
            floor: crate::DECAY_FLOOR,
        }
    }

    /// Samples covered by one tone
    pub fn tone_samples(&self) -> usize {
        (self.sample_rate as u64 * self.tone_duration_ms / 1000) as usize
    }

    /// Same configuration at another sample rate (e.g. a device's native rate)
    pub fn with_sample_rate(&self, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.plan.validate(self.sample_rate)?;

        if self.tone_duration_ms == 0 || self.attack_ms >= self.tone_duration_ms {
            return Err(LinkError::InvalidConfig(format!(
                "attack ({} ms) must be shorter than the tone ({} ms)",
                self.attack_ms, self.tone_duration_ms
            )));
        }
        if !(self.peak_amplitude > crate::DECAY_FLOOR && self.peak_amplitude <= 1.0) {
            return Err(LinkError::InvalidConfig(format!(
                "peak amplitude {} outside ({}, 1.0]",
                self.peak_amplitude,
                crate::DECAY_FLOOR
            )));
        }
        if self.frame_size == 0 {
            return Err(LinkError::InvalidConfig("frame size must be positive".to_string()));
        }
        if !self.fft_size.is_power_of_two() || self.fft_size < 256 {
            return Err(LinkError::InvalidConfig(format!(
                "FFT size {} must be a power of two >= 256",
                self.fft_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.fft_size {
            return Err(LinkError::InvalidConfig(format!(
                "hop size {} must be within 1..={}",
                self.hop_size, self.fft_size
            )));
        }
        if self.fft_size > self.tone_samples() {
            return Err(LinkError::InvalidConfig(format!(
                "analysis window ({} samples) is longer than a tone ({} samples)",
                self.fft_size,
                self.tone_samples()
            )));
        }

        // Peak bins land at most half a bin away from the carrier
        let bin_width = self.sample_rate as f32 / self.fft_size as f32;
        if bin_width / 2.0 >= self.plan.tolerance {
            return Err(LinkError::InvalidConfig(format!(
                "frequency resolution {:.1} Hz too coarse for {} Hz tolerance",
                bin_width, self.plan.tolerance
            )));
        }

        Ok(())
    }
}
