//! Audio input boundary
//!
//! A source pushes fixed-size capture frames into a [`FrameSink`]. The sink
//! sits in front of a bounded channel: pushing never blocks, a full queue
//! drops the frame, and frame buffers come back from the consumer for reuse
//! so steady-state capture does not allocate.

use crate::error::Result;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Something that captures audio frames (microphone, file, test fixture)
pub trait AudioSource: Send {
    /// Rate of the samples this source delivers
    fn sample_rate(&self) -> u32;

    /// Begin delivering frames into `sink`
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    /// Stop delivering and release the underlying device. Must be idempotent.
    fn stop(&mut self);
}

/// Producer side of the capture queue
#[derive(Clone)]
pub struct FrameSink {
    frames: Sender<Vec<f32>>,
    recycled: Receiver<Vec<f32>>,
    dropped: Arc<AtomicU64>,
}

impl FrameSink {
    pub(crate) fn new(
        frames: Sender<Vec<f32>>,
        recycled: Receiver<Vec<f32>>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            frames,
            recycled,
            dropped,
        }
    }

    /// Queue a copy of `samples` without blocking.
    ///
    /// Returns `false` when the frame was dropped (queue full or session gone).
    /// Safe to call from a real-time audio callback.
    pub fn push(&self, samples: &[f32]) -> bool {
        self.push_iter(samples.iter().copied())
    }

    /// Queue converted samples without blocking (e.g. i16 device buffers)
    pub fn push_iter<I: IntoIterator<Item = f32>>(&self, samples: I) -> bool {
        let mut frame = self.recycled.try_recv().unwrap_or_default();
        frame.clear();
        frame.extend(samples);

        match self.frames.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Queue a copy of `samples`, waiting for room.
    ///
    /// For offline sources only; never call this from an audio callback.
    pub fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut frame = self.recycled.try_recv().unwrap_or_default();
        frame.clear();
        frame.extend_from_slice(samples);
        self.frames.send(frame).is_ok()
    }
}

/// Plays back recorded samples as if they came from a microphone
///
/// Frames are delivered from a background thread, either as fast as the
/// session consumes them or paced at the real-time rate.
pub struct SampleSource {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    frame_size: usize,
    paced: bool,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SampleSource {
    pub fn new(samples: Vec<f32>, sample_rate: u32, frame_size: usize) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            frame_size: frame_size.max(1),
            paced: false,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Deliver one frame per frame duration, like a live device
    pub fn paced(mut self) -> Self {
        self.paced = true;
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl AudioSource for SampleSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self, sink: FrameSink) -> Result<()> {
        self.stop();
        self.stop.store(false, Ordering::SeqCst);

        let samples = Arc::clone(&self.samples);
        let stop = Arc::clone(&self.stop);
        let frame_size = self.frame_size;
        let frame_duration = Duration::from_secs_f64(frame_size as f64 / self.sample_rate as f64);
        let paced = self.paced;

        self.worker = Some(std::thread::spawn(move || {
            for frame in samples.chunks(frame_size) {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let delivered = if paced {
                    std::thread::sleep(frame_duration);
                    sink.push(frame)
                } else {
                    sink.push_blocking(frame)
                };
                if !delivered && !paced {
                    // Session closed
                    break;
                }
            }
            log::debug!("Sample source finished");
            // Dropping the sink here tells the session the input is exhausted
        }));

        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for SampleSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn sink_pair(depth: usize) -> (FrameSink, Receiver<Vec<f32>>, Sender<Vec<f32>>, Arc<AtomicU64>) {
        let (frame_tx, frame_rx) = bounded(depth);
        let (recycle_tx, recycle_rx) = bounded(depth);
        let dropped = Arc::new(AtomicU64::new(0));
        (
            FrameSink::new(frame_tx, recycle_rx, Arc::clone(&dropped)),
            frame_rx,
            recycle_tx,
            dropped,
        )
    }

    #[test]
    fn test_push_delivers_copy() {
        let (sink, frames, _recycle, _) = sink_pair(4);
        assert!(sink.push(&[0.1, 0.2, 0.3]));
        assert_eq!(frames.recv().unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_push_iter_converts_device_samples() {
        let (sink, frames, _recycle, _) = sink_pair(4);
        let device: [i16; 3] = [0, i16::MAX, -i16::MAX];
        assert!(sink.push_iter(device.iter().map(|&s| crate::resample::i16_to_f32(s))));
        assert_eq!(frames.recv().unwrap(), vec![0.0, 1.0, -1.0]);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (sink, frames, _recycle, dropped) = sink_pair(2);
        assert!(sink.push(&[1.0]));
        assert!(sink.push(&[2.0]));
        assert!(!sink.push(&[3.0]));
        assert_eq!(dropped.load(Ordering::Relaxed), 1);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_recycled_buffers_are_reused() {
        let (sink, frames, recycle, _) = sink_pair(2);
        sink.push(&[1.0; 64]);
        let frame = frames.recv().unwrap();
        let capacity = frame.capacity();
        let ptr = frame.as_ptr();
        recycle.send(frame).unwrap();

        sink.push(&[2.0; 32]);
        let reused = frames.recv().unwrap();
        assert_eq!(reused.as_ptr(), ptr);
        assert_eq!(reused.capacity(), capacity);
        assert_eq!(reused, vec![2.0; 32]);
    }

    #[test]
    fn test_push_after_disconnect_reports_failure() {
        let (sink, frames, _recycle, dropped) = sink_pair(2);
        drop(frames);
        assert!(!sink.push(&[1.0]));
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_sample_source_delivers_all_frames() {
        let (sink, frames, _recycle, _) = sink_pair(2);
        let mut source = SampleSource::new((0..10).map(|i| i as f32).collect(), 16000, 4);
        source.start(sink).unwrap();

        let received: Vec<Vec<f32>> = frames.iter().collect();
        assert_eq!(received.len(), 3);
        assert_eq!(received[2], vec![8.0, 9.0]);
        source.stop();
    }

    #[test]
    fn test_sample_source_stop_is_idempotent() {
        let (sink, frames, _recycle, _) = sink_pair(1);
        let mut source = SampleSource::new(vec![0.0; 1000], 16000, 10);
        source.start(sink).unwrap();
        // Closing the queue unblocks a source waiting for room
        drop(frames);
        source.stop();
        source.stop();
    }
}
