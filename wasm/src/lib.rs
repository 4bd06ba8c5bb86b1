use js_sys::{Object, Reflect};
use pulselink_core::{
    analyze_frame, AudioOutput, Demodulator, LinkConfig, LinkError, MessageAssembler, ScheduledTone,
    Transmitter,
};
use std::collections::VecDeque;
use wasm_bindgen::prelude::*;
use web_sys::{AudioContext, AudioScheduledSourceNode, OscillatorType};

fn js_error(e: LinkError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn audio_error(e: JsValue) -> LinkError {
    LinkError::AudioDevice(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

/// Plays scheduled tones through a browser `AudioContext`
///
/// Each tone gets its own oscillator and gain node; the gain automation
/// reproduces the same envelope the offline renderer uses.
pub struct WebAudioOutput {
    context: AudioContext,
}

impl WebAudioOutput {
    pub fn new() -> pulselink_core::Result<Self> {
        let context = AudioContext::new()
            .map_err(|_| LinkError::UnsupportedEnvironment("Web Audio is not available".to_string()))?;
        Ok(Self { context })
    }

    pub fn sample_rate(&self) -> f32 {
        self.context.sample_rate()
    }
}

impl AudioOutput for WebAudioOutput {
    fn current_time(&self) -> f64 {
        self.context.current_time()
    }

    fn schedule_tone(&mut self, tone: &ScheduledTone) -> pulselink_core::Result<()> {
        let start = tone.start;
        let end = tone.end();
        let envelope = &tone.envelope;

        let oscillator = self.context.create_oscillator().map_err(audio_error)?;
        oscillator.set_type(OscillatorType::Sine);
        oscillator.frequency().set_value(tone.frequency);

        let gain = self.context.create_gain().map_err(audio_error)?;
        let param = gain.gain();
        param.set_value_at_time(0.0, start).map_err(audio_error)?;
        param
            .linear_ramp_to_value_at_time(envelope.peak, start + envelope.attack.as_secs_f64())
            .map_err(audio_error)?;
        param
            .exponential_ramp_to_value_at_time(envelope.floor, end)
            .map_err(audio_error)?;

        oscillator.connect_with_audio_node(&gain).map_err(audio_error)?;
        gain.connect_with_audio_node(&self.context.destination())
            .map_err(audio_error)?;

        let source: &AudioScheduledSourceNode = &oscillator;
        source.start_with_when(start).map_err(audio_error)?;
        source.stop_with_when(end).map_err(audio_error)?;
        Ok(())
    }
}

#[wasm_bindgen]
pub struct WasmTransmitter {
    inner: Transmitter,
    output: WebAudioOutput,
}

#[wasm_bindgen]
impl WasmTransmitter {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<WasmTransmitter, JsValue> {
        let output = WebAudioOutput::new().map_err(js_error)?;
        Ok(WasmTransmitter {
            inner: Transmitter::default(),
            output,
        })
    }

    /// Schedule the tones for `payload` and return the expected duration in ms.
    /// Returns immediately; playback runs on the audio clock.
    #[wasm_bindgen]
    pub fn transmit(&mut self, payload: &str) -> Result<f64, JsValue> {
        self.inner
            .transmit(&mut self.output, payload)
            .map(|duration| duration.as_secs_f64() * 1000.0)
            .map_err(js_error)
    }
}

#[wasm_bindgen]
pub struct WasmReceiver {
    config: LinkConfig,
    assembler: MessageAssembler,
    demodulator: Demodulator,
    pending: VecDeque<String>,
}

#[wasm_bindgen]
impl WasmReceiver {
    /// Receiver for audio captured at `sample_rate` (the AudioContext's rate)
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: u32) -> Result<WasmReceiver, JsValue> {
        let config = LinkConfig::default().with_sample_rate(sample_rate);
        let demodulator = Demodulator::new(&config).map_err(js_error)?;
        Ok(WasmReceiver {
            assembler: MessageAssembler::new(config.limits),
            config,
            demodulator,
            pending: VecDeque::new(),
        })
    }

    /// Feed one AnalyserNode frame (`getFloatFrequencyData`, dB values).
    ///
    /// Call once per tone slot: every call is one symbol opportunity and
    /// counts as one tone duration toward the collection time limit.
    /// Returns the message when this frame carried the closing sentinel.
    #[wasm_bindgen(js_name = pushSpectrum)]
    pub fn push_spectrum(&mut self, magnitudes: &[f32], sample_rate: u32, fft_size: usize) -> Option<String> {
        let token = analyze_frame(magnitudes, sample_rate, fft_size)
            .and_then(|freq| self.config.plan.decode_frequency(freq));
        let message = self.assembler.push(token);
        self.assembler.advance(self.config.tone_duration());
        message
    }

    /// Feed raw microphone samples (any chunk size).
    ///
    /// Returns the oldest decoded message not yet handed out.
    #[wasm_bindgen(js_name = pushSamples)]
    pub fn push_samples(&mut self, samples: &[f32]) -> Option<String> {
        let pending = &mut self.pending;
        self.demodulator.process(samples, |message| pending.push_back(message));
        self.pending.pop_front()
    }

    /// Next decoded message still queued from earlier `pushSamples` calls
    #[wasm_bindgen(js_name = takeMessage)]
    pub fn take_message(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    /// Drop partial messages and buffered audio
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.assembler.reset();
        self.demodulator.reset();
        self.pending.clear();
    }
}

/// Frequencies (Hz) the transmitter plays for `payload`, sentinels included
#[wasm_bindgen(js_name = encodeFrequencies)]
pub fn encode_frequencies(payload: &str) -> Vec<f32> {
    pulselink_core::encode(payload).into_inner()
}

/// `getUserMedia` constraints for capture: mono with every browser-side
/// processing stage disabled, since echo cancellation and noise suppression
/// treat steady tones as noise.
#[wasm_bindgen(js_name = microphoneConstraints)]
pub fn microphone_constraints() -> Result<JsValue, JsValue> {
    let audio = Object::new();
    Reflect::set(&audio, &"echoCancellation".into(), &JsValue::FALSE)?;
    Reflect::set(&audio, &"autoGainControl".into(), &JsValue::FALSE)?;
    Reflect::set(&audio, &"noiseSuppression".into(), &JsValue::FALSE)?;
    Reflect::set(&audio, &"channelCount".into(), &JsValue::from_f64(1.0))?;

    let constraints = Object::new();
    Reflect::set(&constraints, &"audio".into(), &audio)?;
    Ok(constraints.into())
}
