use crate::plan::FrequencyPlan;
use std::ops::Deref;

/// Over-the-air form of one message:
/// `[sentinel, f(c1), ..., f(cn), sentinel]`
///
/// Built once per transmission and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencySequence(Vec<f32>);

impl FrequencySequence {
    /// Number of tones, sentinels included
    pub fn tone_count(&self) -> usize {
        self.0.len()
    }

    /// Number of data tones between the sentinels
    pub fn symbol_count(&self) -> usize {
        self.0.len().saturating_sub(2)
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl Deref for FrequencySequence {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl FrequencyPlan {
    /// Map a payload onto carrier frequencies.
    ///
    /// The payload is lower-cased first. Characters outside the alphabet are
    /// skipped without error, so callers that need every character delivered
    /// should check [`crate::alphabet::is_transportable`] beforehand.
    pub fn encode(&self, payload: &str) -> FrequencySequence {
        let mut tones = Vec::with_capacity(payload.len() + 2);
        tones.push(self.sentinel_frequency);
        tones.extend(
            payload
                .chars()
                .flat_map(char::to_lowercase)
                .filter_map(|c| self.frequency_of(c)),
        );
        tones.push(self.sentinel_frequency);
        FrequencySequence(tones)
    }
}

/// Encode with the default frequency plan
pub fn encode(payload: &str) -> FrequencySequence {
    FrequencyPlan::default().encode(payload)
}
