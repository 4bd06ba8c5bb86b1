use std::f32::consts::PI;
use std::time::Duration;

// Tone shaping
//
// Every tone is an independent sine burst with its own gain envelope:
// - linear attack from silence to `peak` over the first `attack`
// - exponential decay from `peak` down to `floor` at the end of the tone
//
// Starting and ending near zero removes the waveform discontinuity that a
// hard on/off produces (audible click, broadband splatter into neighbouring
// carriers). The exponential tail matches what WebAudio's
// `exponentialRampToValueAtTime` produces, so offline renders and browser
// playback sound the same.

/// Gain envelope applied to each tone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneEnvelope {
    pub attack: Duration,
    pub peak: f32,
    /// Gain reached at the very end of the tone (must be > 0 for an exponential ramp)
    pub floor: f32,
}

impl Default for ToneEnvelope {
    fn default() -> Self {
        Self {
            attack: Duration::from_millis(crate::ATTACK_MS),
            peak: crate::PEAK_AMPLITUDE,
            floor: crate::DECAY_FLOOR,
        }
    }
}

impl ToneEnvelope {
    /// Gain at `t` seconds into a tone lasting `duration` seconds
    pub fn gain_at(&self, t: f64, duration: f64) -> f32 {
        if t < 0.0 || t > duration {
            return 0.0;
        }

        let attack = self.attack.as_secs_f64().min(duration);
        if t < attack {
            return self.peak * (t / attack) as f32;
        }

        let decay = duration - attack;
        if decay <= 0.0 {
            return self.peak;
        }

        let progress = ((t - attack) / decay) as f32;
        self.peak * (self.floor / self.peak).powf(progress)
    }
}

/// A tone placed on an output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledTone {
    pub frequency: f32,
    /// Start time on the output clock, in seconds
    pub start: f64,
    /// Length in seconds
    pub duration: f64,
    pub envelope: ToneEnvelope,
}

impl ScheduledTone {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Number of samples covering `duration` seconds at `sample_rate`
pub fn samples_for(duration: f64, sample_rate: u32) -> usize {
    (duration * sample_rate as f64).round() as usize
}

/// Add a shaped tone into `buffer` starting at sample `offset`.
///
/// Samples past the end of `buffer` are cut off; callers size the buffer.
pub fn mix_tone(buffer: &mut [f32], offset: usize, tone: &ScheduledTone, sample_rate: u32) {
    let len = samples_for(tone.duration, sample_rate);
    let angular_freq = 2.0 * PI * tone.frequency / sample_rate as f32;

    for (i, sample) in buffer.iter_mut().skip(offset).take(len).enumerate() {
        let t = i as f64 / sample_rate as f64;
        let gain = tone.envelope.gain_at(t, tone.duration);
        *sample += gain * (angular_freq * i as f32).sin();
    }
}
