//! Live speaker and microphone support
//!
//! cpal streams are not `Send` on every platform, so the microphone stream
//! lives on its own thread and is dropped there when the source stops.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedBufferSize, SupportedStreamConfig, SupportedStreamConfigRange,
};
use crossbeam_channel::{bounded, Sender};
use pulselink_core::{AudioSource, FrameSink, LinkConfig, LinkError, ToneBuffer, Transmitter};
use std::thread::JoinHandle;
use std::time::Duration;

fn device_error(e: impl std::fmt::Display) -> LinkError {
    LinkError::AudioDevice(e.to_string())
}

fn is_convertible(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16 | SampleFormat::I32
    )
}

/// Pick a capture configuration for `target_rate`
///
/// Prefers a range that covers the link's own rate, then the fewest channels.
/// Returns `None` when no range does; the caller falls back to the device
/// default and its native rate.
fn choose_input_config<I>(ranges: I, target_rate: u32) -> Option<SupportedStreamConfig>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    let mut best: Option<SupportedStreamConfigRange> = None;
    for range in ranges {
        if !is_convertible(range.sample_format())
            || range.min_sample_rate().0 > target_rate
            || range.max_sample_rate().0 < target_rate
        {
            continue;
        }
        let better = match &best {
            Some(current) => range.channels() < current.channels(),
            None => true,
        };
        if better {
            best = Some(range);
        }
    }
    best.map(|range| range.with_sample_rate(SampleRate(target_rate)))
}

/// Average interleaved device samples of any sample type down to mono `f32`
fn mono<T>(data: &[T], channels: usize) -> impl Iterator<Item = f32> + '_
where
    T: SizedSample,
    f32: FromSample<T>,
{
    data.chunks_exact(channels).map(move |frame| {
        frame
            .iter()
            .map(|&sample| <f32 as cpal::Sample>::from_sample(sample))
            .sum::<f32>()
            / channels as f32
    })
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    sink: FrameSink,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            sink.push_iter(mono(data, channels));
        },
        |err| log::error!("Input stream error: {}", err),
        None,
    )
}

/// Default input device, downmixed to mono
///
/// The capture format is negotiated when the source is created: the link's
/// sample rate if the device supports it, otherwise the device's default.
/// `sample_rate()` reports what the device actually delivers.
pub struct MicrophoneSource {
    stream_config: StreamConfig,
    sample_format: SampleFormat,
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl MicrophoneSource {
    pub fn new(config: &LinkConfig) -> pulselink_core::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| LinkError::UnsupportedEnvironment("no input device".to_string()))?;
        log::info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown Device".to_string())
        );

        let ranges = device.supported_input_configs().map_err(device_error)?;
        let supported = match choose_input_config(ranges, config.sample_rate) {
            Some(supported) => supported,
            None => {
                let fallback = device.default_input_config().map_err(device_error)?;
                log::warn!(
                    "Input device does not support {} Hz, capturing at {} Hz",
                    config.sample_rate,
                    fallback.sample_rate().0
                );
                fallback
            }
        };
        if !is_convertible(supported.sample_format()) {
            return Err(LinkError::AudioDevice(format!(
                "unsupported input format {:?}",
                supported.sample_format()
            )));
        }

        let buffer_size = match supported.buffer_size() {
            SupportedBufferSize::Range { min, max } => {
                BufferSize::Fixed((config.frame_size as u32).clamp(*min, *max))
            }
            SupportedBufferSize::Unknown => BufferSize::Default,
        };
        let sample_format = supported.sample_format();
        let mut stream_config: StreamConfig = supported.config();
        stream_config.buffer_size = buffer_size;
        log::debug!(
            "Capture config: {} channel(s) at {} Hz, {:?}",
            stream_config.channels,
            stream_config.sample_rate.0,
            sample_format
        );

        Ok(Self {
            stream_config,
            sample_format,
            stop: None,
            worker: None,
        })
    }
}

impl AudioSource for MicrophoneSource {
    fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate.0
    }

    fn start(&mut self, sink: FrameSink) -> pulselink_core::Result<()> {
        self.stop();

        let (ready_tx, ready_rx) = bounded::<pulselink_core::Result<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let stream_config = self.stream_config.clone();
        let sample_format = self.sample_format;

        let worker = std::thread::spawn(move || {
            let host = cpal::default_host();
            let Some(device) = host.default_input_device() else {
                let _ = ready_tx.send(Err(LinkError::UnsupportedEnvironment(
                    "no input device".to_string(),
                )));
                return;
            };

            let stream = match sample_format {
                SampleFormat::F32 => build_input::<f32>(&device, &stream_config, sink),
                SampleFormat::I16 => build_input::<i16>(&device, &stream_config, sink),
                SampleFormat::U16 => build_input::<u16>(&device, &stream_config, sink),
                SampleFormat::I32 => build_input::<i32>(&device, &stream_config, sink),
                other => {
                    let _ = ready_tx.send(Err(LinkError::AudioDevice(format!(
                        "unsupported input format {:?}",
                        other
                    ))));
                    return;
                }
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(device_error(e)));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(device_error(e)));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Hold the stream until stopped
            let _ = stop_rx.recv();
            drop(stream);
        });

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(LinkError::AudioDevice("capture thread exited".to_string())));
        if started.is_err() {
            let _ = worker.join();
            return started;
        }

        self.stop = Some(stop_tx);
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the capture thread
        self.stop = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    samples: Vec<f32>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = usize::from(config.channels.max(1));
    let mut position = 0;
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                let sample = samples.get(position).copied().unwrap_or(0.0);
                position += 1;
                frame.fill(T::from_sample(sample));
            }
        },
        |err| log::error!("Output stream error: {}", err),
        None,
    )
}

/// Render `payload` and play it on the default output device.
///
/// Blocks until playback has finished and returns the transmission length.
pub fn play(config: &LinkConfig, payload: &str) -> pulselink_core::Result<Duration> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| LinkError::UnsupportedEnvironment("no output device".to_string()))?;
    let supported = device.default_output_config().map_err(device_error)?;
    let sample_format = supported.sample_format();

    let stream_config: StreamConfig = supported.config();
    let device_config = config.with_sample_rate(stream_config.sample_rate.0);
    device_config.validate()?;

    let transmitter = Transmitter::from_config(&device_config);
    let mut buffer = ToneBuffer::new(device_config.sample_rate);
    let duration = transmitter.transmit(&mut buffer, payload)?;
    buffer.advance_to_end();
    let samples = buffer.into_samples();

    let stream = match sample_format {
        SampleFormat::F32 => build_output::<f32>(&device, &stream_config, samples),
        SampleFormat::I16 => build_output::<i16>(&device, &stream_config, samples),
        SampleFormat::U16 => build_output::<u16>(&device, &stream_config, samples),
        SampleFormat::I32 => build_output::<i32>(&device, &stream_config, samples),
        other => {
            return Err(LinkError::AudioDevice(format!(
                "unsupported output format {:?}",
                other
            )))
        }
    }
    .map_err(device_error)?;
    stream.play().map_err(device_error)?;

    // Let the device buffer drain before tearing the stream down
    std::thread::sleep(duration + Duration::from_millis(250));
    Ok(duration)
}
