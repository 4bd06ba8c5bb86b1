use crate::alphabet::{self, ALPHABET_SIZE};
use crate::plan::FrequencyPlan;

/// What a single detected frequency means on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Sentinel tone: start of a message when idle, end of it while collecting
    FrameMark,
    /// Data tone carrying one alphabet character
    Symbol(char),
}

impl FrequencyPlan {
    /// Map a detected frequency back onto the alphabet.
    ///
    /// Returns `None` for frequencies between carriers, outside the band or
    /// further than the tolerance from any carrier. `None` is silence/noise and
    /// must not advance decode state.
    pub fn decode_frequency(&self, freq: f32) -> Option<Token> {
        if !freq.is_finite() {
            return None;
        }

        if (freq - self.sentinel_frequency).abs() < self.tolerance {
            return Some(Token::FrameMark);
        }

        // f32::round rounds half away from zero, which existing transmitters rely on
        let index = ((freq - self.base_frequency) / self.step).round();
        if index < 0.0 || index >= ALPHABET_SIZE as f32 {
            return None;
        }

        let index = index as usize;
        let expected = self.frequency(index)?;
        if (freq - expected).abs() < self.tolerance {
            alphabet::symbol_at(index).map(Token::Symbol)
        } else {
            None
        }
    }
}

/// Decode with the default frequency plan
pub fn decode_frequency(freq: f32) -> Option<Token> {
    FrequencyPlan::default().decode_frequency(freq)
}
