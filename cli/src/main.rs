use clap::{Parser, Subcommand};
use pulselink_core::alphabet::{is_transportable, ALPHABET};
use pulselink_core::{LinkConfig, ListenOptions, Receiver, ToneBuffer, Transmitter};
use serde::Serialize;
use std::path::{Path, PathBuf};

mod error;
mod wav;

#[cfg(feature = "device")]
mod device;

use error::CliError;
use wav::{write_wav, WavSource};

/// Silence around a rendered transmission so receivers can settle
const WAV_PADDING_SECS: f64 = 0.25;

#[derive(Parser)]
#[command(name = "pulselink")]
#[command(about = "Acoustic handshake: send short identifiers as FSK tones")]
struct Cli {
    /// JSON link configuration (missing fields use the defaults)
    #[arg(short, long, global = true, value_name = "CONFIG.JSON")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a payload to a WAV file
    Encode {
        /// Identifier to send (lowercase letters, digits, '@', '.', '_')
        payload: String,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,
    },

    /// Decode every transmission found in a WAV file
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Stop after the first decoded message
        #[arg(long)]
        first: bool,
    },

    /// Print the frequency plan as JSON
    Plan,

    /// Play a payload on the default output device
    #[cfg(feature = "device")]
    Send {
        /// Identifier to send
        payload: String,
    },

    /// Listen on the default input device
    #[cfg(feature = "device")]
    Listen {
        /// Give up after this many seconds without a message
        #[arg(short, long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Keep listening after the first message
        #[arg(long)]
        continuous: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Encode { payload, output } => encode_command(&config, &payload, &output)?,
        Commands::Decode { input, first } => decode_command(&config, &input, first)?,
        Commands::Plan => plan_command(&config)?,
        #[cfg(feature = "device")]
        Commands::Send { payload } => send_command(&config, &payload)?,
        #[cfg(feature = "device")]
        Commands::Listen { timeout, continuous } => listen_command(&config, timeout, continuous)?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<LinkConfig, CliError> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let config: LinkConfig = serde_json::from_str(&text)?;
            log::info!("Loaded config from {}", path.display());
            config
        }
        None => LinkConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn encode_command(config: &LinkConfig, payload: &str, output: &Path) -> Result<(), CliError> {
    if !is_transportable(payload) {
        log::warn!("Payload contains characters that cannot be sent; they will be skipped");
    }

    let transmitter = Transmitter::from_config(config);
    let mut buffer = ToneBuffer::new(config.sample_rate);
    buffer.pad_silence(WAV_PADDING_SECS);
    let duration = transmitter.transmit(&mut buffer, payload)?;
    buffer.advance_to_end();
    buffer.pad_silence(WAV_PADDING_SECS);

    write_wav(output, buffer.samples(), config.sample_rate)?;
    println!(
        "Encoded {:?} as {} tones ({} ms) to {}",
        payload,
        transmitter.plan().encode(payload).tone_count(),
        duration.as_millis(),
        output.display()
    );
    Ok(())
}

fn decode_command(config: &LinkConfig, input: &Path, first: bool) -> Result<(), CliError> {
    let receiver = Receiver::new(config.clone())?;
    let source = WavSource::open(input, config.sample_rate, config.frame_size)?;
    let session = receiver.start_listening(
        source,
        ListenOptions {
            stop_after_first: first,
        },
    )?;

    while let Ok(message) = session.recv() {
        println!("Decoded: {}", message);
    }

    let stats = receiver.stop_listening(session)?;
    log::info!(
        "Processed {} frames, {} messages, {} abandoned",
        stats.frames_processed,
        stats.messages_delivered,
        stats.messages_abandoned
    );
    if stats.messages_delivered == 0 {
        return Err(CliError::NoMessage(input.display().to_string()));
    }
    Ok(())
}

#[derive(Serialize)]
struct PlanReport {
    sentinel_frequency: f32,
    tolerance: f32,
    data_band: (f32, f32),
    symbols: Vec<PlanEntry>,
}

#[derive(Serialize)]
struct PlanEntry {
    symbol: char,
    frequency: f32,
}

fn plan_command(config: &LinkConfig) -> Result<(), CliError> {
    let plan = config.plan;
    let symbols = ALPHABET
        .iter()
        .filter_map(|&symbol| {
            plan.frequency_of(symbol)
                .map(|frequency| PlanEntry { symbol, frequency })
        })
        .collect();

    let report = PlanReport {
        sentinel_frequency: plan.sentinel_frequency,
        tolerance: plan.tolerance,
        data_band: plan.data_band(),
        symbols,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(feature = "device")]
fn send_command(config: &LinkConfig, payload: &str) -> Result<(), CliError> {
    if !is_transportable(payload) {
        log::warn!("Payload contains characters that cannot be sent; they will be skipped");
    }
    let duration = device::play(config, payload)?;
    println!("Sent {:?} ({} ms)", payload, duration.as_millis());
    Ok(())
}

#[cfg(feature = "device")]
fn listen_command(config: &LinkConfig, timeout: Option<u64>, continuous: bool) -> Result<(), CliError> {
    use pulselink_core::LinkError;
    use std::time::Duration;

    let receiver = Receiver::new(config.clone())?;
    let session = receiver.start_listening(
        device::MicrophoneSource::new(config)?,
        ListenOptions {
            stop_after_first: !continuous,
        },
    )?;
    println!("Listening... (Ctrl+C to stop)");

    loop {
        let next = match timeout {
            Some(secs) => session.recv_timeout(Duration::from_secs(secs)),
            None => session.recv(),
        };
        match next {
            Ok(message) => println!("Decoded: {}", message),
            Err(LinkError::Timeout) => {
                println!("No message within {} s", timeout.unwrap_or_default());
                break;
            }
            Err(_) => break,
        }
    }

    let stats = receiver.stop_listening(session)?;
    if stats.frames_dropped > 0 {
        log::warn!("Dropped {} frames: decoding fell behind capture", stats.frames_dropped);
    }
    Ok(())
}
