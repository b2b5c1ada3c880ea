//! Audio plumbing for Trill Flight
//!
//! - Capture: microphone input through a lock-free ring buffer
//! - Tracker: sliding frame window, pitch estimation and smoothing
//! - Receiver: UDP datagrams from external detectors over bounded channels
//! - Session: worker thread driving capture and tracking

mod capture;
mod error;
mod receiver;
mod session;
mod tracker;

pub use capture::{CaptureHandle, MicCapture, SampleSource};
pub use error::AudioError;
pub use receiver::{Datagram, DatagramReceiver, RemotePitch, TrillState, PITCH_PORT, TRILL_PORT};
pub use session::{
    pump_samples, run_session_loop, SessionCommand, SessionEvent, SessionSettings, TrillSession,
};
pub use tracker::{FrameWindow, PitchReading, PitchTracker};
