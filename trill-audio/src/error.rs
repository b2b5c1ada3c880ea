//! Errors for audio capture and datagram input

use std::io;
use thiserror::Error;

/// Errors that can occur while opening audio or network inputs
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio input device found")]
    NoInputDevice,
    #[error("Input device '{0}' not found")]
    DeviceNotFound(String),
    #[error("Failed to query input config: {0}")]
    Config(String),
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("Input stream error: {0}")]
    Stream(String),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
