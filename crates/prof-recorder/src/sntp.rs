//! External time references.
//!
//! The recorder asks a reference once per process. SNTP (RFC 4330) over UDP is
//! the only network reference; anything that can report the current Unix time
//! can stand in for it.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Default server, overridable through configuration.
pub const DEFAULT_NTP_HOST: &str = "0.pool.ntp.org";

/// Upper bound for a reference query.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

const NTP_PORT: u16 = 123;
const PACKET_LEN: usize = 48;
/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01.
const NTP_UNIX_DELTA: f64 = 2_208_988_800.0;
/// LI = 0, VN = 3, Mode = 3 (client).
const CLIENT_HEADER: u8 = 0x1b;

/// Errors from querying a time reference.
#[derive(Debug, Error)]
pub enum TimeReferenceError {
    #[error("network error: {0}")]
    Io(#[from] io::Error),

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("no answer within {0:?}")]
    TimedOut(Duration),

    #[error("short response: {0} bytes")]
    ShortResponse(usize),

    #[error("server sent an unsynchronized response")]
    Unsynchronized,
}

/// A source of absolute time.
pub trait TimeReference: Send + Sync {
    /// Returns the current Unix time in seconds, giving up after `timeout`.
    fn query(&self, timeout: Duration) -> Result<f64, TimeReferenceError>;
}

impl<T: TimeReference + ?Sized> TimeReference for Arc<T> {
    fn query(&self, timeout: Duration) -> Result<f64, TimeReferenceError> {
        (**self).query(timeout)
    }
}

/// Minimal SNTP client.
#[derive(Debug, Clone)]
pub struct SntpClient {
    host: String,
    port: u16,
}

impl SntpClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: NTP_PORT,
        }
    }

    /// Targets a server on a non-standard port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Looks up the server on a helper thread, since the system resolver
    /// takes no timeout.
    fn resolve(&self, timeout: Duration) -> Result<SocketAddr, TimeReferenceError> {
        let (tx, rx) = mpsc::channel();
        let target = (self.host.clone(), self.port);
        thread::Builder::new()
            .name("prof-sntp-resolve".into())
            .spawn(move || {
                let addr = target.to_socket_addrs().map(|mut addrs| addrs.next());
                // The receiver is gone if the query already timed out.
                let _ = tx.send(addr);
            })?;

        match rx.recv_timeout(timeout) {
            Ok(Ok(Some(addr))) => Ok(addr),
            Ok(Ok(None)) => Err(TimeReferenceError::Resolve(self.host.clone())),
            Ok(Err(e)) => Err(TimeReferenceError::Io(e)),
            Err(_) => Err(TimeReferenceError::TimedOut(timeout)),
        }
    }
}

impl Default for SntpClient {
    fn default() -> Self {
        Self::new(DEFAULT_NTP_HOST)
    }
}

impl TimeReference for SntpClient {
    /// The whole exchange, name resolution included, shares one deadline.
    fn query(&self, timeout: Duration) -> Result<f64, TimeReferenceError> {
        let deadline = Instant::now() + timeout;
        let addr = self.resolve(timeout)?;

        let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind)?;
        socket.set_write_timeout(Some(remaining(deadline, timeout)?))?;
        socket.connect(addr)?;

        let mut request = [0u8; PACKET_LEN];
        request[0] = CLIENT_HEADER;
        socket.send(&request)?;

        socket.set_read_timeout(Some(remaining(deadline, timeout)?))?;
        let mut response = [0u8; PACKET_LEN];
        let len = socket.recv(&mut response).map_err(|e| match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                TimeReferenceError::TimedOut(timeout)
            }
            _ => TimeReferenceError::Io(e),
        })?;
        parse_transmit_time(&response[..len])
    }
}

/// Time left before `deadline`, or a timeout error once it has passed.
fn remaining(deadline: Instant, timeout: Duration) -> Result<Duration, TimeReferenceError> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(TimeReferenceError::TimedOut(timeout));
    }
    Ok(left)
}

/// Extracts the transmit timestamp of an SNTP response as Unix seconds.
fn parse_transmit_time(packet: &[u8]) -> Result<f64, TimeReferenceError> {
    if packet.len() < PACKET_LEN {
        return Err(TimeReferenceError::ShortResponse(packet.len()));
    }
    // Leap indicator 3 means the server clock is not synchronized.
    if packet[0] >> 6 == 3 {
        return Err(TimeReferenceError::Unsynchronized);
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]);
    if seconds == 0 {
        return Err(TimeReferenceError::Unsynchronized);
    }

    Ok(f64::from(seconds) - NTP_UNIX_DELTA + f64::from(fraction) / 4_294_967_296.0)
}
