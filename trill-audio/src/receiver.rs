//! UDP datagram input from external detectors
//!
//! External processes (a trill detector, a remote pitch tracker) report their
//! state as tiny text datagrams. A background thread receives and parses them
//! and forwards the messages over a bounded channel; the frame loop drains the
//! channel on its own thread, so nothing here touches consumer state.

use crate::error::AudioError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TrySendError};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default port for trill state datagrams
pub const TRILL_PORT: u16 = 5007;

/// Default port for remote pitch datagrams
pub const PITCH_PORT: u16 = 5005;

/// Messages queued before new ones are dropped
const CHANNEL_CAPACITY: usize = 64;

/// How often the receive thread checks for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A message that can be parsed from a text datagram
pub trait Datagram: Sized + Send + 'static {
    fn parse(text: &str) -> Option<Self>;
}

/// Lip trill on/off, sent as "1" or anything else
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrillState(pub bool);

impl Datagram for TrillState {
    fn parse(text: &str) -> Option<Self> {
        Some(TrillState(text.trim() == "1"))
    }
}

/// Pitch in A4-relative semitones, sent as a decimal number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemotePitch(pub f32);

impl Datagram for RemotePitch {
    fn parse(text: &str) -> Option<Self> {
        text.trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .map(RemotePitch)
    }
}

/// Background UDP listener feeding a bounded channel
pub struct DatagramReceiver<M: Datagram> {
    rx: Receiver<M>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl<M: Datagram> DatagramReceiver<M> {
    /// Bind to `addr` and start receiving
    pub fn bind<A: ToSocketAddrs + std::fmt::Debug>(addr: A) -> Result<Self, AudioError> {
        let describe = format!("{:?}", addr);
        let socket = UdpSocket::bind(addr).map_err(|source| AudioError::Bind {
            addr: describe,
            source,
        })?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;

        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name(format!("udp-{}", local_addr.port()))
            .spawn(move || {
                let mut buf = [0u8; 512];
                while !shutdown_thread.load(Ordering::Relaxed) {
                    let len = match socket.recv_from(&mut buf) {
                        Ok((len, _)) => len,
                        Err(e) if !should_back_off(&e) => continue,
                        Err(e) => {
                            tracing::error!(port = local_addr.port(), "UDP receive error: {}", e);
                            thread::sleep(POLL_INTERVAL);
                            continue;
                        }
                    };

                    let Some(message) = std::str::from_utf8(&buf[..len]).ok().and_then(M::parse)
                    else {
                        tracing::debug!(port = local_addr.port(), "unparseable datagram dropped");
                        continue;
                    };

                    match tx.try_send(message) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::trace!(port = local_addr.port(), "datagram channel full");
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                }
            })?;

        tracing::info!(%local_addr, "datagram receiver listening");

        Ok(Self {
            rx,
            shutdown,
            handle: Some(handle),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Next queued message, without blocking
    pub fn try_recv(&self) -> Option<M> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message
    pub fn recv_timeout(&self, timeout: Duration) -> Option<M> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain the queue, keeping only the newest message
    pub fn latest(&self) -> Option<M> {
        self.rx.try_iter().last()
    }

    /// Stop the receive thread and wait for it
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Read timeouts are the normal idle path; anything else pauses the loop
fn should_back_off(err: &io::Error) -> bool {
    !matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

impl<M: Datagram> Drop for DatagramReceiver<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(to: SocketAddr, text: &str) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.send_to(text.as_bytes(), to).unwrap();
    }

    #[test]
    fn test_parse_trill_state() {
        assert_eq!(TrillState::parse("1"), Some(TrillState(true)));
        assert_eq!(TrillState::parse(" 1\n"), Some(TrillState(true)));
        assert_eq!(TrillState::parse("0"), Some(TrillState(false)));
        assert_eq!(TrillState::parse("yes"), Some(TrillState(false)));
    }

    #[test]
    fn test_parse_remote_pitch() {
        assert_eq!(RemotePitch::parse("-3.50"), Some(RemotePitch(-3.5)));
        assert_eq!(RemotePitch::parse("abc"), None);
        assert_eq!(RemotePitch::parse("-inf"), None);
    }

    #[test]
    fn test_receives_trill_datagrams() {
        let mut receiver = DatagramReceiver::<TrillState>::bind("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr();

        send(addr, "1");
        assert_eq!(
            receiver.recv_timeout(Duration::from_secs(2)),
            Some(TrillState(true))
        );

        send(addr, "0");
        assert_eq!(
            receiver.recv_timeout(Duration::from_secs(2)),
            Some(TrillState(false))
        );

        receiver.stop();
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_latest_keeps_newest() {
        let receiver = DatagramReceiver::<RemotePitch>::bind("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr();

        send(addr, "1.0");
        send(addr, "not a number");
        send(addr, "2.0");

        // Wait for the last one to land
        let mut seen = Vec::new();
        while let Some(RemotePitch(v)) = receiver.recv_timeout(Duration::from_millis(500)) {
            seen.push(v);
            if v == 2.0 {
                break;
            }
        }
        assert_eq!(seen, vec![1.0, 2.0]);

        send(addr, "3.0");
        send(addr, "4.0");
        thread::sleep(Duration::from_millis(200));
        assert_eq!(receiver.latest(), Some(RemotePitch(4.0)));
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_hard_errors_back_off() {
        assert!(!should_back_off(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!should_back_off(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(should_back_off(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(should_back_off(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_bind_error() {
        let first = DatagramReceiver::<TrillState>::bind("127.0.0.1:0").unwrap();
        let taken = first.local_addr();
        assert!(matches!(
            DatagramReceiver::<TrillState>::bind(taken),
            Err(AudioError::Bind { .. })
        ));
    }
}
