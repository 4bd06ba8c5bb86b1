use crate::error::CliError;
use hound::{SampleFormat, WavSpec};
use pulselink_core::resample::{downmix, f32_to_i16, i16_to_f32, resample};
use pulselink_core::{AudioSource, FrameSink, SampleSource};
use std::fs::File;
use std::path::Path;

/// Write mono samples as 16-bit PCM
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), CliError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let file = File::create(path)?;
    let mut writer = hound::WavWriter::new(file, spec)?;
    for &sample in samples {
        writer.write_sample(f32_to_i16(sample))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a WAV file as mono samples at `sample_rate`
///
/// Multi-channel files are downmixed and other rates are resampled.
pub fn read_wav(path: &Path, sample_rate: u32) -> Result<Vec<f32>, CliError> {
    let file = File::open(path)?;
    let mut reader = hound::WavReader::new(file)?;
    let spec = reader.spec();
    log::info!(
        "Read WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(i16_to_f32))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ (24 | 32)) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (_, bits) => return Err(CliError::UnsupportedBitDepth(bits)),
    };

    let mono = downmix(&interleaved, spec.channels as usize)?;
    if spec.sample_rate != sample_rate {
        log::debug!("Resampling {} Hz -> {} Hz", spec.sample_rate, sample_rate);
    }
    Ok(resample(&mono, spec.sample_rate, sample_rate))
}

/// A WAV recording played into a listen session frame by frame
pub struct WavSource {
    inner: SampleSource,
}

impl WavSource {
    pub fn open(path: &Path, sample_rate: u32, frame_size: usize) -> Result<Self, CliError> {
        let samples = read_wav(path, sample_rate)?;
        log::debug!("Streaming {} samples from {}", samples.len(), path.display());
        Ok(Self {
            inner: SampleSource::new(samples, sample_rate, frame_size),
        })
    }
}

impl AudioSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn start(&mut self, sink: FrameSink) -> pulselink_core::Result<()> {
        self.inner.start(sink)
    }

    fn stop(&mut self) {
        self.inner.stop();
    }
}
