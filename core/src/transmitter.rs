use crate::config::LinkConfig;
use crate::encoder::FrequencySequence;
use crate::error::Result;
use crate::output::AudioOutput;
use crate::plan::FrequencyPlan;
use crate::tone::{ScheduledTone, ToneEnvelope};
use std::time::Duration;

/// Schedules a payload as back-to-back shaped tones on an audio output
///
/// Transmission is open loop: there is no acknowledgement and no way to
/// cancel tones once scheduled.
#[derive(Debug, Clone)]
pub struct Transmitter {
    plan: FrequencyPlan,
    tone_duration: Duration,
    envelope: ToneEnvelope,
}

impl Transmitter {
    pub fn new(plan: FrequencyPlan, tone_duration: Duration, envelope: ToneEnvelope) -> Self {
        Self {
            plan,
            tone_duration,
            envelope,
        }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.plan, config.tone_duration(), config.envelope())
    }

    pub fn plan(&self) -> &FrequencyPlan {
        &self.plan
    }

    pub fn tone_duration(&self) -> Duration {
        self.tone_duration
    }

    /// Encode `payload` and schedule its tones starting at the output's current time.
    ///
    /// Returns immediately with the estimated playback duration
    /// (`tone_count * tone_duration`) so the caller can keep its send
    /// controls disabled until the burst is over.
    pub fn transmit<O: AudioOutput + ?Sized>(&self, output: &mut O, payload: &str) -> Result<Duration> {
        let sequence = self.plan.encode(payload);
        self.schedule(output, &sequence)
    }

    /// Schedule an already-encoded sequence
    pub fn schedule<O: AudioOutput + ?Sized>(
        &self,
        output: &mut O,
        sequence: &FrequencySequence,
    ) -> Result<Duration> {
        let start = output.current_time();
        let duration = self.tone_duration.as_secs_f64();

        for (i, &frequency) in sequence.iter().enumerate() {
            output.schedule_tone(&ScheduledTone {
                frequency,
                start: start + i as f64 * duration,
                duration,
                envelope: self.envelope,
            })?;
        }

        log::debug!(
            "Scheduled {} tones ({} symbols) at t={:.3}s",
            sequence.tone_count(),
            sequence.symbol_count(),
            start
        );

        Ok(self.estimated_duration(sequence.tone_count()))
    }

    /// Playback time of `tone_count` tones
    pub fn estimated_duration(&self, tone_count: usize) -> Duration {
        self.tone_duration * tone_count as u32
    }
}

impl Default for Transmitter {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}
