use crate::assembler::{AssemblyState, MessageAssembler};
use crate::config::LinkConfig;
use crate::decoder::Token;
use crate::error::Result;
use crate::plan::FrequencyPlan;
use crate::spectrum::SpectrumAnalyzer;
use std::collections::VecDeque;
use std::time::Duration;

// Streaming demodulation
//
// Capture frames arrive in whatever size the audio device delivers. Samples
// go into a sliding window of `fft_size`; every `hop_size` new samples the
// window is analysed and its dominant frequency decoded into a token.
//
// A tone lasts several hops, so the same token shows up in a run of
// consecutive analyses. Each run is converted back into tone slots by its
// length: round(run_samples / tone_samples). That keeps a doubled character
// ("ll") as two symbols while one tone is never counted twice. Runs shorter
// than half a tone round to zero and are dropped as glitches.

#[derive(Debug, Clone, Copy)]
struct Run {
    token: Option<Token>,
    samples: usize,
}

/// Turns raw audio into delivered messages
///
/// Owns the decode state of exactly one listen session.
pub struct Demodulator {
    plan: FrequencyPlan,
    analyzer: SpectrumAnalyzer,
    window: VecDeque<f32>,
    fft_size: usize,
    hop_size: usize,
    since_analysis: usize,
    tone_samples: usize,
    hop_duration: Duration,
    run: Option<Run>,
    assembler: MessageAssembler,
}

impl Demodulator {
    pub fn new(config: &LinkConfig) -> Result<Self> {
        config.validate()?;

        let hop_duration =
            Duration::from_secs_f64(config.hop_size as f64 / config.sample_rate as f64);

        Ok(Self {
            plan: config.plan,
            analyzer: SpectrumAnalyzer::new(config.fft_size, config.sample_rate),
            window: VecDeque::with_capacity(config.fft_size),
            fft_size: config.fft_size,
            hop_size: config.hop_size,
            since_analysis: 0,
            tone_samples: config.tone_samples(),
            hop_duration,
            run: None,
            assembler: MessageAssembler::new(config.limits),
        })
    }

    pub fn state(&self) -> AssemblyState {
        self.assembler.state()
    }

    /// Messages dropped for exceeding the assembly limits
    pub fn abandoned(&self) -> u64 {
        self.assembler.abandoned()
    }

    /// Feed captured samples; `on_message` is called for every completed message.
    pub fn process<F: FnMut(String)>(&mut self, samples: &[f32], mut on_message: F) {
        for &sample in samples {
            if self.window.len() == self.fft_size {
                self.window.pop_front();
            }
            self.window.push_back(sample);
            self.since_analysis += 1;

            if self.window.len() == self.fft_size && self.since_analysis >= self.hop_size {
                self.since_analysis = 0;
                self.analyze(&mut on_message);
            }
        }
    }

    /// Close the run in progress, e.g. when the input ends right after a tone.
    pub fn flush<F: FnMut(String)>(&mut self, mut on_message: F) {
        if let Some(run) = self.run.take() {
            self.emit(run, &mut on_message);
        }
    }

    /// Forget all buffered audio and any message in progress
    pub fn reset(&mut self) {
        self.window.clear();
        self.since_analysis = 0;
        self.run = None;
        self.assembler.reset();
    }

    fn analyze<F: FnMut(String)>(&mut self, on_message: &mut F) {
        let (head, tail) = self.window.as_slices();
        let token = self
            .analyzer
            .dominant_frequency(head, tail)
            .and_then(|freq| self.plan.decode_frequency(freq));

        match self.run {
            Some(ref mut run) if run.token == token => run.samples += self.hop_size,
            _ => {
                let next = Run {
                    token,
                    samples: self.hop_size,
                };
                if let Some(finished) = self.run.replace(next) {
                    self.emit(finished, on_message);
                }
            }
        }

        self.assembler.advance(self.hop_duration);
    }

    fn emit<F: FnMut(String)>(&mut self, run: Run, on_message: &mut F) {
        let Some(token) = run.token else {
            return;
        };

        let slots = (run.samples as f32 / self.tone_samples as f32).round() as usize;
        if slots == 0 {
            log::trace!("Dropping {:?} glitch of {} samples", token, run.samples);
            return;
        }

        for _ in 0..slots {
            if let Some(message) = self.assembler.push(Some(token)) {
                on_message(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{AudioOutput, ToneBuffer};
    use crate::tone::ScheduledTone;
    use crate::transmitter::Transmitter;

    fn render(config: &LinkConfig, payload: &str) -> Vec<f32> {
        let transmitter = Transmitter::from_config(config);
        let mut buffer = ToneBuffer::new(config.sample_rate);
        buffer.pad_silence(0.2);
        transmitter.transmit(&mut buffer, payload).unwrap();
        buffer.advance_to_end();
        buffer.pad_silence(0.2);
        buffer.into_samples()
    }

    fn demodulate(config: &LinkConfig, samples: &[f32], frame: usize) -> Vec<String> {
        let mut demodulator = Demodulator::new(config).unwrap();
        let mut messages = Vec::new();
        for chunk in samples.chunks(frame) {
            demodulator.process(chunk, |m| messages.push(m));
        }
        demodulator.flush(|m| messages.push(m));
        messages
    }

    #[test]
    fn test_demodulates_rendered_handle() {
        let config = LinkConfig::default();
        let samples = render(&config, "alex@stellar");
        let messages = demodulate(&config, &samples, config.frame_size);
        assert_eq!(messages, vec!["alex@stellar".to_string()]);
    }

    #[test]
    fn test_repeated_characters_survive() {
        let config = LinkConfig::default();
        for payload in ["ll", "aaa", "0000000", "bookkeeper"] {
            let samples = render(&config, payload);
            let messages = demodulate(&config, &samples, config.frame_size);
            assert_eq!(messages, vec![payload.to_string()], "Payload {:?}", payload);
        }
    }

    #[test]
    fn test_heartbeat_yields_empty_message() {
        let config = LinkConfig::default();
        let samples = render(&config, "");
        let messages = demodulate(&config, &samples, config.frame_size);
        assert_eq!(messages, vec![String::new()]);
    }

    #[test]
    fn test_frame_size_does_not_matter() {
        let config = LinkConfig::default();
        let samples = render(&config, "pay.me_9");
        for frame in [128, 1000, 4096, 10000] {
            let messages = demodulate(&config, &samples, frame);
            assert_eq!(messages, vec!["pay.me_9".to_string()], "Frame size {}", frame);
        }
    }

    #[test]
    fn test_flush_closes_trailing_sentinel() {
        let config = LinkConfig::default();
        let transmitter = Transmitter::from_config(&config);
        let mut buffer = ToneBuffer::new(config.sample_rate);
        buffer.pad_silence(0.2);
        transmitter.transmit(&mut buffer, "end").unwrap();
        // No trailing silence: the end sentinel run is still open when input stops
        let samples = buffer.into_samples();

        let mut demodulator = Demodulator::new(&config).unwrap();
        let mut messages = Vec::new();
        demodulator.process(&samples, |m| messages.push(m));
        assert!(messages.is_empty());
        assert_eq!(demodulator.state(), AssemblyState::Collecting);

        demodulator.flush(|m| messages.push(m));
        assert_eq!(messages, vec!["end".to_string()]);
    }

    #[test]
    fn test_silence_stays_idle() {
        let config = LinkConfig::default();
        let mut demodulator = Demodulator::new(&config).unwrap();
        let mut messages = Vec::new();
        demodulator.process(&vec![0.0; config.sample_rate as usize * 2], |m| messages.push(m));
        demodulator.flush(|m| messages.push(m));
        assert!(messages.is_empty());
        assert_eq!(demodulator.state(), AssemblyState::Idle);
    }

    #[test]
    fn test_consecutive_transmissions_in_one_session() {
        let config = LinkConfig::default();
        let mut samples = render(&config, "first");
        samples.extend(render(&config, "second"));
        let messages = demodulate(&config, &samples, config.frame_size);
        assert_eq!(messages, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_lost_end_sentinel_times_out() {
        let config = LinkConfig::default();
        let mut buffer = ToneBuffer::new(config.sample_rate);
        buffer.pad_silence(0.2);

        // Start sentinel and a few symbols, then nothing but silence
        let sequence = config.plan.encode("cut");
        let truncated = &sequence[..sequence.len() - 1];
        for (i, &frequency) in truncated.iter().enumerate() {
            buffer
                .schedule_tone(&ScheduledTone {
                    frequency,
                    start: 0.2 + i as f64 * 0.1,
                    duration: 0.1,
                    envelope: config.envelope(),
                })
                .unwrap();
        }
        buffer.advance_to_end();
        buffer.pad_silence(config.limits.max_collect_ms.unwrap() as f64 / 1000.0 + 1.0);
        let samples = buffer.into_samples();

        let mut demodulator = Demodulator::new(&config).unwrap();
        let mut messages = Vec::new();
        demodulator.process(&samples, |m| messages.push(m));
        assert!(messages.is_empty());
        assert_eq!(demodulator.state(), AssemblyState::Idle);
        assert_eq!(demodulator.abandoned(), 1);
    }

    #[test]
    fn test_overlong_transmission_then_normal_one() {
        let config = LinkConfig::default();
        let mut samples = render(&config, &"x1".repeat(35));
        samples.extend(vec![0.0; config.sample_rate as usize / 2]);
        samples.extend(render(&config, "alex@stellar"));

        let mut demodulator = Demodulator::new(&config).unwrap();
        let mut messages = Vec::new();
        demodulator.process(&samples, |m| messages.push(m));
        demodulator.flush(|m| messages.push(m));
        assert_eq!(messages, vec!["alex@stellar".to_string()]);
        assert_eq!(demodulator.state(), AssemblyState::Idle);
        assert_eq!(demodulator.abandoned(), 1);
    }

    #[test]
    fn test_reset_discards_partial_message() {
        let config = LinkConfig::default();
        let samples = render(&config, "reset");
        let half = samples.len() / 2;

        let mut demodulator = Demodulator::new(&config).unwrap();
        let mut messages = Vec::new();
        demodulator.process(&samples[..half], |m| messages.push(m));
        assert_eq!(demodulator.state(), AssemblyState::Collecting);

        demodulator.reset();
        assert_eq!(demodulator.state(), AssemblyState::Idle);
        demodulator.process(&samples[half..], |m| messages.push(m));
        demodulator.flush(|m| messages.push(m));
        assert!(messages.is_empty());
    }
}
