//! Acoustic handshake link
//!
//! Moves short identifiers (payment handles and the like) between devices as
//! a burst of FSK tones: one tone per character, framed by a sentinel tone.

pub mod alphabet;
pub mod assembler;
pub mod config;
pub mod decoder;
pub mod demodulator;
pub mod encoder;
pub mod error;
pub mod output;
pub mod plan;
pub mod resample;
pub mod session;
pub mod source;
pub mod spectrum;
pub mod tone;
pub mod transmitter;

pub use assembler::{AssemblyLimits, AssemblyState, MessageAssembler};
pub use config::LinkConfig;
pub use decoder::{decode_frequency, Token};
pub use demodulator::Demodulator;
pub use encoder::{encode, FrequencySequence};
pub use error::{LinkError, Result};
pub use output::{AudioOutput, ToneBuffer};
pub use plan::FrequencyPlan;
pub use session::{ListenOptions, ListenSession, Receiver, SessionStats};
pub use source::{AudioSource, FrameSink, SampleSource};
pub use spectrum::{analyze_frame, SpectrumAnalyzer};
pub use tone::{ScheduledTone, ToneEnvelope};
pub use transmitter::Transmitter;

// Audio configuration
pub const SAMPLE_RATE: u32 = 44100;
pub const FRAME_SIZE: usize = 4096; // samples per capture callback
pub const FFT_SIZE: usize = 2048;
pub const HOP_SIZE: usize = 512;
pub const FRAME_QUEUE_DEPTH: usize = 16;

// Tone configuration
pub const TONE_DURATION_MS: u64 = 100;
pub const ATTACK_MS: u64 = 10;
pub const PEAK_AMPLITUDE: f32 = 0.5;
pub const DECAY_FLOOR: f32 = 0.001;

// Frequency plan
pub const BASE_FREQUENCY: f32 = 1000.0; // Hz
pub const FREQUENCY_STEP: f32 = 100.0; // Hz
pub const SENTINEL_FREQUENCY: f32 = 5500.0; // Hz
pub const FREQUENCY_TOLERANCE: f32 = 50.0; // Hz

// Assembly bounds
pub const MAX_MESSAGE_SYMBOLS: usize = 64;
pub const MAX_COLLECT_MS: u64 = 8000;
