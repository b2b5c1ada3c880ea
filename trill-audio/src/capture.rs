//! Microphone capture using cpal
//!
//! The input callback downmixes to mono and pushes into a lock-free ring
//! buffer; the consuming thread drains it at its own pace. If the consumer
//! falls behind, the newest samples are dropped rather than blocking the
//! audio thread.

use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample};
use parking_lot::{Mutex, RwLock};
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Anything that yields mono samples at a known rate
pub trait SampleSource: Send {
    /// Pop up to `output.len()` samples, returning how many were written
    fn read_samples(&self, output: &mut [f32]) -> usize;

    fn sample_rate(&self) -> u32;
}

/// Shared state between the input stream and readers
struct CaptureShared {
    /// Ring buffer consumer, Mutex because the consumer is not Sync
    consumer: Mutex<ringbuf::HeapCons<f32>>,
    is_active: AtomicBool,
    error: RwLock<Option<String>>,
    sample_rate: u32,
}

/// Handle to read from a running capture
#[derive(Clone)]
pub struct CaptureHandle {
    shared: Arc<CaptureShared>,
}

impl CaptureHandle {
    /// Number of samples waiting in the buffer
    pub fn available_samples(&self) -> usize {
        self.shared.consumer.lock().occupied_len()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active.load(Ordering::SeqCst)
    }

    /// Last stream error, if any
    pub fn error(&self) -> Option<String> {
        self.shared.error.read().clone()
    }

    /// Drop everything buffered so far
    pub fn clear(&self) {
        let mut consumer = self.shared.consumer.lock();
        while consumer.try_pop().is_some() {}
    }
}

impl SampleSource for CaptureHandle {
    fn read_samples(&self, output: &mut [f32]) -> usize {
        self.shared.consumer.lock().pop_slice(output)
    }

    fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }
}

/// A running microphone stream
///
/// Owns the cpal stream, which is not `Send` on every platform: create it on
/// the thread that reads from it.
pub struct MicCapture {
    _stream: cpal::Stream,
    handle: CaptureHandle,
    device_name: String,
}

impl MicCapture {
    /// Open an input device (`None` for the system default)
    ///
    /// `buffer_samples` sizes the ring buffer in mono samples. The device's
    /// native sample rate is used as-is.
    pub fn open(device_name: Option<&str>, buffer_samples: usize) -> Result<Self, AudioError> {
        let device = find_input_device(device_name)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| AudioError::Config(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;

        tracing::info!(
            device = %device_name,
            sample_rate,
            channels = config.channels,
            format = ?sample_format,
            "opening input device"
        );

        let rb = HeapRb::<f32>::new(buffer_samples.max(1));
        let (producer, consumer) = rb.split();

        let shared = Arc::new(CaptureShared {
            consumer: Mutex::new(consumer),
            is_active: AtomicBool::new(true),
            error: RwLock::new(None),
            sample_rate,
        });

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, producer, &shared),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, producer, &shared),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, producer, &shared),
            other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            handle: CaptureHandle { shared },
            device_name,
        })
    }

    pub fn handle(&self) -> CaptureHandle {
        self.handle.clone()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.handle.shared.sample_rate
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        tracing::info!(device = %self.device_name, "input capture stopped");
        self.handle.shared.is_active.store(false, Ordering::SeqCst);
    }
}

fn find_input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    match name {
        Some(wanted) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::Config(e.to_string()))?;
            for device in devices {
                if device.name().map(|n| n == wanted).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::DeviceNotFound(wanted.to_string()))
        }
        None => host.default_input_device().ok_or(AudioError::NoInputDevice),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: ringbuf::HeapProd<f32>,
    shared: &Arc<CaptureShared>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let error_shared = Arc::clone(shared);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels) {
                    let sum: f32 = frame
                        .iter()
                        .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                        .sum();
                    // Drop samples if the reader has fallen behind
                    let _ = producer.try_push(sum / frame.len() as f32);
                }
            },
            move |err| {
                tracing::error!("input stream error: {}", err);
                *error_shared.error.write() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))
}
