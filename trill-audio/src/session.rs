//! Pitch session - runs capture and tracking on a worker thread
//!
//! Same shape as a command/event engine: the frame loop owns a
//! [`TrillSession`] handle and talks to the worker over bounded channels.

use crate::capture::{MicCapture, SampleSource};
use crate::tracker::{PitchReading, PitchTracker};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trill_analysis::{PitchStabilizer, SpectralPeakEstimator, StabilizerConfig};

/// Commands sent to the session worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Forget pitch history (e.g. on level restart)
    ResetPitch,
    Shutdown,
}

/// Events sent from the session worker
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Input opened
    Started { device: String, sample_rate: u32 },
    /// New pitch estimate
    Pitch(PitchReading),
    /// Error occurred; the worker has stopped
    Error(String),
}

/// Parameters for a microphone session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Input device name, `None` for the system default
    pub device: Option<String>,
    /// Samples per pitch estimate
    pub frame_size: usize,
    /// New samples between estimates
    pub hop_size: usize,
    pub stabilizer: StabilizerConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            device: None,
            frame_size: 2048,
            hop_size: 1024,
            stabilizer: StabilizerConfig::default(),
        }
    }
}

/// Handle held by the frame loop
pub struct TrillSession {
    /// Send commands to the worker
    pub command_tx: Sender<SessionCommand>,
    /// Receive events from the worker
    pub event_rx: Receiver<SessionEvent>,
    /// Shutdown flag shared with the worker
    shutdown: Arc<AtomicBool>,
}

impl TrillSession {
    /// Create channels for session communication
    pub fn create_channels() -> (
        Sender<SessionCommand>,
        Receiver<SessionCommand>,
        Sender<SessionEvent>,
        Receiver<SessionEvent>,
    ) {
        let (cmd_tx, cmd_rx) = bounded(64);
        let (evt_tx, evt_rx) = bounded(256);
        (cmd_tx, cmd_rx, evt_tx, evt_rx)
    }

    /// Create a new session handle
    pub fn new(command_tx: Sender<SessionCommand>, event_rx: Receiver<SessionEvent>) -> Self {
        Self {
            command_tx,
            event_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag to hand to the worker loop
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Send a command to the worker
    pub fn send(&self, cmd: SessionCommand) {
        let _ = self.command_tx.try_send(cmd);
    }

    /// All events that arrived since the last poll
    pub fn poll(&self) -> Vec<SessionEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Newest pitch reading among pending events
    ///
    /// Non-pitch events are returned through `others`.
    pub fn latest_pitch(&self, others: &mut Vec<SessionEvent>) -> Option<PitchReading> {
        let mut latest = None;
        for event in self.event_rx.try_iter() {
            match event {
                SessionEvent::Pitch(reading) => latest = Some(reading),
                other => others.push(other),
            }
        }
        latest
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.command_tx.try_send(SessionCommand::Shutdown);
    }
}

/// Open the microphone and track pitch until shut down
///
/// Runs on its own thread: the cpal stream is created here because it
/// cannot move between threads on every platform.
pub fn run_session_loop(
    settings: SessionSettings,
    cmd_rx: Receiver<SessionCommand>,
    evt_tx: Sender<SessionEvent>,
    shutdown: Arc<AtomicBool>,
) {
    let stabilizer = match PitchStabilizer::new(settings.stabilizer) {
        Ok(s) => s,
        Err(e) => {
            let _ = evt_tx.send(SessionEvent::Error(e.to_string()));
            return;
        }
    };

    // A second of audio is plenty of slack for a 30 fps reader
    let capture = match MicCapture::open(settings.device.as_deref(), 48000) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to open input: {}", e);
            let _ = evt_tx.send(SessionEvent::Error(e.to_string()));
            return;
        }
    };

    let sample_rate = capture.sample_rate();
    let _ = evt_tx.send(SessionEvent::Started {
        device: capture.device_name().to_string(),
        sample_rate,
    });

    let estimator = SpectralPeakEstimator::new(sample_rate, settings.frame_size);
    let tracker = PitchTracker::new(Box::new(estimator), stabilizer, settings.hop_size);

    let handle = capture.handle();
    pump_samples(&handle, tracker, &cmd_rx, &evt_tx, &shutdown);

    if let Some(err) = handle.error() {
        let _ = evt_tx.send(SessionEvent::Error(err));
    }
}

/// Drain a sample source into a tracker until shut down
pub fn pump_samples<S: SampleSource>(
    source: &S,
    mut tracker: PitchTracker,
    cmd_rx: &Receiver<SessionCommand>,
    evt_tx: &Sender<SessionEvent>,
    shutdown: &AtomicBool,
) {
    let mut scratch = vec![0.0f32; 4096];

    while !shutdown.load(Ordering::Relaxed) {
        match cmd_rx.recv_timeout(Duration::from_millis(5)) {
            Ok(SessionCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(SessionCommand::ResetPitch) => {
                tracing::debug!("pitch history reset");
                tracker.reset();
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        loop {
            let read = source.read_samples(&mut scratch);
            if read == 0 {
                break;
            }
            if let Some(reading) = tracker.push_samples(&scratch[..read]) {
                // Stale readings are worthless; drop rather than block
                let _ = evt_tx.try_send(SessionEvent::Pitch(reading));
            }
        }
    }
}
