//! Listen sessions
//!
//! A [`Receiver`] runs at most one session at a time. Starting one hands back
//! a [`ListenSession`], the only way to read decoded messages and the owner of
//! the capture source. Stopping or dropping the session stops the source, so
//! the microphone is always released.
//!
//! Threads:
//! - the source's own capture thread/callback pushes frames into a bounded queue
//! - a worker thread owns the [`Demodulator`] and drains that queue
//! - the caller reads finished messages from the session

use crate::config::LinkConfig;
use crate::demodulator::Demodulator;
use crate::error::{LinkError, Result};
use crate::source::{AudioSource, FrameSink};
use crossbeam_channel::{bounded, select, unbounded, Receiver as ChannelReceiver, RecvTimeoutError};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// How a session behaves once messages arrive
#[derive(Debug, Clone, Copy, Default)]
pub struct ListenOptions {
    /// Release the source as soon as the first message is decoded
    pub stop_after_first: bool,
}

impl ListenOptions {
    pub fn single_message() -> Self {
        Self {
            stop_after_first: true,
        }
    }
}

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_processed: u64,
    /// Frames lost because the queue was full
    pub frames_dropped: u64,
    pub messages_delivered: u64,
    /// Messages given up on for exceeding the assembly limits
    pub messages_abandoned: u64,
}

#[derive(Default)]
struct Counters {
    frames_processed: AtomicU64,
    frames_dropped: Arc<AtomicU64>,
    messages_delivered: AtomicU64,
    messages_abandoned: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_abandoned: self.messages_abandoned.load(Ordering::Relaxed),
        }
    }
}

type SharedSource = Arc<Mutex<Option<Box<dyn AudioSource>>>>;

enum WorkerEvent {
    Stop,
    Frame(Vec<f32>),
    Exhausted,
}

fn release_source(source: &SharedSource) {
    let taken = match source.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some(mut source) = taken {
        source.stop();
        log::debug!("Audio source released");
    }
}

/// Acoustic receiver: decodes transmissions from an [`AudioSource`]
pub struct Receiver {
    config: LinkConfig,
    active: Arc<AtomicBool>,
}

impl Receiver {
    pub fn new(config: LinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            active: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn is_listening(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start decoding from `source`.
    ///
    /// Fails with [`LinkError::SessionActive`] while another session from this
    /// receiver is still alive.
    pub fn start_listening<S>(&self, source: S, options: ListenOptions) -> Result<ListenSession>
    where
        S: AudioSource + 'static,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LinkError::SessionActive);
        }

        match self.spawn_session(Box::new(source), options) {
            Ok(session) => Ok(session),
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Stop a session started by this receiver and return its counters
    pub fn stop_listening(&self, session: ListenSession) -> Result<SessionStats> {
        if !Arc::ptr_eq(&self.active, &session.slot) {
            return Err(LinkError::ForeignSession);
        }
        Ok(session.stop())
    }

    fn spawn_session(
        &self,
        mut source: Box<dyn AudioSource>,
        options: ListenOptions,
    ) -> Result<ListenSession> {
        // The demodulator runs at whatever rate the source actually delivers
        let config = self.config.with_sample_rate(source.sample_rate());
        let mut demodulator = Demodulator::new(&config)?;

        let counters = Arc::new(Counters::default());
        let (frame_tx, frame_rx) = bounded::<Vec<f32>>(crate::FRAME_QUEUE_DEPTH);
        let (recycle_tx, recycle_rx) = bounded::<Vec<f32>>(crate::FRAME_QUEUE_DEPTH);
        let (message_tx, message_rx) = unbounded::<String>();
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let sink = FrameSink::new(frame_tx, recycle_rx, Arc::clone(&counters.frames_dropped));
        source.start(sink)?;
        log::info!(
            "Listening at {} Hz (frames of {} samples)",
            config.sample_rate,
            config.frame_size
        );

        let source: SharedSource = Arc::new(Mutex::new(Some(source)));
        let worker_source = Arc::clone(&source);
        let worker_counters = Arc::clone(&counters);

        let worker = std::thread::spawn(move || {
            let done = Cell::new(false);
            let deliver = |message: String| {
                if done.get() {
                    return;
                }
                log::info!("Decoded message ({} symbols)", message.len());
                worker_counters.messages_delivered.fetch_add(1, Ordering::Relaxed);
                let _ = message_tx.send(message);
                done.set(options.stop_after_first);
            };

            loop {
                let event = select! {
                    recv(stop_rx) -> _ => WorkerEvent::Stop,
                    recv(frame_rx) -> frame => match frame {
                        Ok(frame) => WorkerEvent::Frame(frame),
                        Err(_) => WorkerEvent::Exhausted,
                    },
                };

                match event {
                    WorkerEvent::Stop => break,
                    WorkerEvent::Exhausted => {
                        // Close whatever tone is still open
                        demodulator.flush(&deliver);
                        break;
                    }
                    WorkerEvent::Frame(frame) => {
                        demodulator.process(&frame, &deliver);
                        worker_counters.frames_processed.fetch_add(1, Ordering::Relaxed);
                        let _ = recycle_tx.try_send(frame);
                    }
                }

                if done.get() {
                    break;
                }
            }

            worker_counters
                .messages_abandoned
                .store(demodulator.abandoned(), Ordering::Relaxed);

            // Close the queue first so a source blocked on it can wind down
            drop(frame_rx);
            if done.get() {
                release_source(&worker_source);
            }
        });

        Ok(ListenSession {
            slot: Arc::clone(&self.active),
            source,
            messages: message_rx,
            stop: Some(stop_tx),
            worker: Some(worker),
            counters,
        })
    }
}

/// Owning handle of an active listen session
pub struct ListenSession {
    slot: Arc<AtomicBool>,
    source: SharedSource,
    messages: ChannelReceiver<String>,
    stop: Option<crossbeam_channel::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl ListenSession {
    /// Wait for the next decoded message.
    ///
    /// Returns [`LinkError::SessionClosed`] once the session can produce no
    /// more messages (source exhausted, or stopped after the first message).
    pub fn recv(&self) -> Result<String> {
        self.messages.recv().map_err(|_| LinkError::SessionClosed)
    }

    /// Wait up to `timeout` for the next decoded message
    pub fn recv_timeout(&self, timeout: Duration) -> Result<String> {
        self.messages.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => LinkError::Timeout,
            RecvTimeoutError::Disconnected => LinkError::SessionClosed,
        })
    }

    /// Next decoded message if one is ready
    pub fn try_recv(&self) -> Option<String> {
        self.messages.try_recv().ok()
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    /// Stop capture, release the source and end the session
    pub fn stop(mut self) -> SessionStats {
        self.shutdown();
        self.counters.snapshot()
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.try_send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Listen worker panicked");
            }
        }
        release_source(&self.source);
        self.slot.store(false, Ordering::SeqCst);
    }
}

impl Drop for ListenSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
