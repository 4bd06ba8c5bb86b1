use crate::alphabet::{self, ALPHABET_SIZE};
use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};

// Frequency plan
//
// Data band: one carrier per alphabet symbol, `base + index * step`.
// With the defaults this spans 1000-4800 Hz in 100 Hz steps, well inside
// what phone speakers and microphones reproduce.
//
// Sentinel: a single carrier above the data band (5500 Hz) that opens and
// closes every transmission.
//
// Tolerance: a detected frequency belongs to a carrier only when it is
// strictly closer than `tolerance` Hz. Keeping the tolerance below half the
// step leaves a dead zone between adjacent carriers.

/// Mapping between alphabet symbols and carrier frequencies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyPlan {
    /// Carrier of alphabet index 0, in Hz
    pub base_frequency: f32,
    /// Spacing between adjacent carriers, in Hz
    pub step: f32,
    /// Start/end marker carrier, in Hz
    pub sentinel_frequency: f32,
    /// Maximum distance (exclusive) between a detected frequency and a carrier, in Hz
    pub tolerance: f32,
}

impl Default for FrequencyPlan {
    fn default() -> Self {
        Self {
            base_frequency: crate::BASE_FREQUENCY,
            step: crate::FREQUENCY_STEP,
            sentinel_frequency: crate::SENTINEL_FREQUENCY,
            tolerance: crate::FREQUENCY_TOLERANCE,
        }
    }
}

impl FrequencyPlan {
    /// Carrier for alphabet `index`
    pub fn frequency(&self, index: usize) -> Option<f32> {
        if index < ALPHABET_SIZE {
            Some(self.base_frequency + index as f32 * self.step)
        } else {
            None
        }
    }

    /// Carrier for an (already lower-cased) character
    pub fn frequency_of(&self, c: char) -> Option<f32> {
        alphabet::index_of(c).and_then(|index| self.frequency(index))
    }

    /// Lowest and highest data carriers
    pub fn data_band(&self) -> (f32, f32) {
        let top = self.base_frequency + (ALPHABET_SIZE - 1) as f32 * self.step;
        (self.base_frequency, top)
    }

    /// Check the plan is decodable at `sample_rate`
    pub fn validate(&self, sample_rate: u32) -> Result<()> {
        if !(self.base_frequency > 0.0) {
            return Err(LinkError::InvalidConfig(format!(
                "base frequency must be positive, got {}",
                self.base_frequency
            )));
        }
        if !(self.step > 0.0) || !(self.tolerance > 0.0) {
            return Err(LinkError::InvalidConfig(
                "step and tolerance must be positive".to_string(),
            ));
        }
        if self.tolerance * 2.0 > self.step {
            return Err(LinkError::InvalidConfig(format!(
                "tolerance {} Hz overlaps carriers spaced {} Hz apart",
                self.tolerance, self.step
            )));
        }

        let (_, top) = self.data_band();
        if self.sentinel_frequency - top <= self.tolerance * 2.0 {
            return Err(LinkError::InvalidConfig(format!(
                "sentinel {} Hz must sit above the data band (top carrier {} Hz)",
                self.sentinel_frequency, top
            )));
        }

        let nyquist = sample_rate as f32 / 2.0;
        if self.sentinel_frequency + self.tolerance >= nyquist {
            return Err(LinkError::InvalidConfig(format!(
                "sentinel {} Hz exceeds Nyquist limit {} Hz",
                self.sentinel_frequency, nyquist
            )));
        }

        Ok(())
    }
}
