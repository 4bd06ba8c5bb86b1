//! Frame analysis: magnitude spectrum and dominant frequency
//!
//! The analyzer owns every buffer it needs, so analysing a window does not
//! allocate. This keeps it safe to drive from an audio callback cadence.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Dominant frequency of one frame's magnitude spectrum.
///
/// `magnitudes[i]` is the energy of bin `i` of an `fft_size`-point transform
/// (linear or dB, only the ordering matters). The strongest bin wins and is
/// converted with `i * sample_rate / fft_size`. Returns `None` only when the
/// spectrum is empty or `fft_size` is zero.
pub fn analyze_frame(magnitudes: &[f32], sample_rate: u32, fft_size: usize) -> Option<f32> {
    if fft_size == 0 {
        return None;
    }

    let mut peak_index = None;
    let mut peak = f32::NEG_INFINITY;
    for (i, &magnitude) in magnitudes.iter().enumerate() {
        // NaN never wins; ties keep the lowest bin
        if magnitude > peak {
            peak = magnitude;
            peak_index = Some(i);
        }
    }

    let index = match peak_index {
        Some(index) => index,
        None if magnitudes.is_empty() => return None,
        // A frame of -inf dB (digital silence) still reports bin 0
        None => 0,
    };
    Some(index as f32 * sample_rate as f32 / fft_size as f32)
}

/// Hann-windowed FFT producing a magnitude spectrum of `fft_size / 2` bins
pub struct SpectrumAnalyzer {
    fft_size: usize,
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize, sample_rate: u32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        // Hann window to keep leakage from neighbouring tones out of the peak bin
        let window = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Self {
            fft_size,
            sample_rate,
            fft,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Magnitude spectrum of a window given as two contiguous parts
    /// (the halves of a ring buffer). `head.len() + tail.len()` must equal
    /// `fft_size`; shorter input is zero padded, longer input truncated.
    pub fn spectrum_of(&mut self, head: &[f32], tail: &[f32]) -> &[f32] {
        let samples = head.iter().chain(tail.iter()).copied();
        let mut filled = 0;
        for ((slot, sample), &weight) in self.buffer.iter_mut().zip(samples).zip(self.window.iter()) {
            *slot = Complex::new(sample * weight, 0.0);
            filled += 1;
        }
        for slot in self.buffer.iter_mut().skip(filled) {
            *slot = Complex::new(0.0, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (magnitude, bin) in self.magnitudes.iter_mut().zip(self.buffer.iter()) {
            *magnitude = bin.norm();
        }
        &self.magnitudes
    }

    /// Dominant frequency of a window of samples
    pub fn dominant_frequency(&mut self, head: &[f32], tail: &[f32]) -> Option<f32> {
        let sample_rate = self.sample_rate;
        let fft_size = self.fft_size;
        let magnitudes = self.spectrum_of(head, tail);
        analyze_frame(magnitudes, sample_rate, fft_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_analyze_frame_picks_peak_bin() {
        let mut magnitudes = vec![0.1f32; 1024];
        magnitudes[100] = 5.0;
        let freq = analyze_frame(&magnitudes, 44100, 2048).unwrap();
        assert!((freq - 100.0 * 44100.0 / 2048.0).abs() < 1e-3);
    }

    #[test]
    fn test_analyze_frame_works_on_decibels() {
        let mut magnitudes = vec![-120.0f32; 1024];
        magnitudes[255] = -30.0;
        magnitudes[40] = -60.0;
        let freq = analyze_frame(&magnitudes, 44100, 2048).unwrap();
        assert!((freq - 255.0 * 44100.0 / 2048.0).abs() < 1e-3);
    }

    #[test]
    fn test_analyze_frame_ties_keep_first_bin() {
        let magnitudes = vec![0.0f32; 512];
        assert_eq!(analyze_frame(&magnitudes, 44100, 1024), Some(0.0));

        let silent = vec![f32::NEG_INFINITY; 512];
        assert_eq!(analyze_frame(&silent, 44100, 1024), Some(0.0));
    }

    #[test]
    fn test_analyze_frame_empty_input() {
        assert_eq!(analyze_frame(&[], 44100, 2048), None);
        assert_eq!(analyze_frame(&[1.0, 2.0], 44100, 0), None);
    }

    #[test]
    fn test_analyzer_finds_pure_tones() {
        let mut analyzer = SpectrumAnalyzer::new(2048, 44100);
        let bin_width = 44100.0 / 2048.0;

        for freq in [1000.0, 2000.0, 3700.0, 4800.0, 5500.0] {
            let samples = sine(freq, 2048, 44100);
            let detected = analyzer.dominant_frequency(&samples, &[]).unwrap();
            assert!(
                (detected - freq).abs() <= bin_width / 2.0 + 1e-3,
                "Expected ~{} Hz, got {} Hz",
                freq,
                detected
            );
        }
    }

    #[test]
    fn test_analyzer_split_window_matches_contiguous() {
        let mut analyzer = SpectrumAnalyzer::new(1024, 16000);
        let samples = sine(2500.0, 1024, 16000);

        let whole = analyzer.spectrum_of(&samples, &[]).to_vec();
        let split = analyzer.spectrum_of(&samples[..300], &samples[300..]).to_vec();
        assert_eq!(whole.len(), 512);
        for (a, b) in whole.iter().zip(split.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_analyzer_gain_invariance() {
        let mut analyzer = SpectrumAnalyzer::new(2048, 44100);
        let samples = sine(3000.0, 2048, 44100);
        let reference = analyzer.dominant_frequency(&samples, &[]).unwrap();

        for gain in [0.01, 0.1, 2.0] {
            let scaled: Vec<f32> = samples.iter().map(|s| s * gain).collect();
            let detected = analyzer.dominant_frequency(&scaled, &[]).unwrap();
            assert_eq!(detected, reference, "Gain {} moved the peak", gain);
        }
    }
}
