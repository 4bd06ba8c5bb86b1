use crate::error::{LinkError, Result};
use crate::tone::{mix_tone, samples_for, ScheduledTone};

/// Audio output able to play tones at precise times on its own clock
///
/// Implementations schedule and return; playback happens later on the
/// device's clock. Scheduled tones cannot be cancelled.
pub trait AudioOutput {
    /// Current time of the output clock, in seconds
    fn current_time(&self) -> f64;

    /// Queue a tone for playback
    fn schedule_tone(&mut self, tone: &ScheduledTone) -> Result<()>;
}

/// Offline output that renders scheduled tones into a PCM buffer
///
/// Its clock is a cursor into the buffer: it only moves through
/// [`ToneBuffer::pad_silence`] and [`ToneBuffer::advance_to_end`].
pub struct ToneBuffer {
    sample_rate: u32,
    samples: Vec<f32>,
    cursor: usize,
}

impl ToneBuffer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: Vec::new(),
            cursor: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Append silence at the cursor and move the clock past it
    pub fn pad_silence(&mut self, seconds: f64) {
        let end = self.cursor + samples_for(seconds, self.sample_rate);
        if self.samples.len() < end {
            self.samples.resize(end, 0.0);
        }
        self.cursor = end;
    }

    /// Move the clock to the end of everything scheduled so far
    pub fn advance_to_end(&mut self) {
        self.cursor = self.samples.len();
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

impl AudioOutput for ToneBuffer {
    fn current_time(&self) -> f64 {
        self.cursor as f64 / self.sample_rate as f64
    }

    fn schedule_tone(&mut self, tone: &ScheduledTone) -> Result<()> {
        if tone.start < 0.0 || !(tone.duration > 0.0) {
            return Err(LinkError::InvalidInputSize);
        }

        let offset = samples_for(tone.start, self.sample_rate);
        let end = offset + samples_for(tone.duration, self.sample_rate);
        if self.samples.len() < end {
            self.samples.resize(end, 0.0);
        }

        mix_tone(&mut self.samples, offset, tone, self.sample_rate);
        Ok(())
    }
}
