//! Process-wide recording state.
//!
//! A process resolves its clock basis and host identity once and shares them
//! with every recorder it opens. Both are computed lazily, so a process whose
//! recorders are all disabled never touches the network.

use std::fmt;
use std::net::UdpSocket;
use std::sync::{Arc, OnceLock, mpsc};
use std::thread;
use std::time::Duration;

use prof_core::{Calibration, SyncMode};

use crate::sntp::{DEFAULT_TIMEOUT, TimeReference, TimeReferenceError};
use crate::timestamp;

/// Clock readings taken when the process started recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockBasis {
    pub t_sys: f64,
    pub t_ref: f64,
    pub mode: SyncMode,
}

impl ClockBasis {
    /// Queries `reference`, falling back to the system clock on any failure.
    ///
    /// Returns within `timeout` even when the reference itself does not.
    pub fn resolve(reference: Option<Arc<dyn TimeReference>>, timeout: Duration) -> Self {
        if let Some(reference) = reference {
            let t_one = timestamp();
            match query_within(reference, timeout) {
                Ok(t_ref) => {
                    let t_two = timestamp();
                    return Self {
                        t_sys: (t_one + t_two) / 2.0,
                        t_ref,
                        mode: SyncMode::Ntp,
                    };
                }
                Err(e) => {
                    tracing::debug!(error = %e, "time reference unavailable, using system clock");
                }
            }
        }

        let t = timestamp();
        Self {
            t_sys: t,
            t_ref: t,
            mode: SyncMode::Sys,
        }
    }
}

/// Runs the query on a helper thread and stops waiting at `timeout`.
///
/// An overrunning query is abandoned; its thread exits once the reference
/// returns.
fn query_within(
    reference: Arc<dyn TimeReference>,
    timeout: Duration,
) -> Result<f64, TimeReferenceError> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("prof-time-reference".into())
        .spawn(move || {
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(reference.query(timeout));
        })?;
    rx.recv_timeout(timeout)
        .unwrap_or(Err(TimeReferenceError::TimedOut(timeout)))
}

/// Name and address of the recording host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub hostname: String,
    pub ip: String,
}

impl HostIdentity {
    /// Looks up the hostname and the address of the default route.
    pub fn detect() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            hostname,
            ip: local_ip().unwrap_or_else(|| "127.0.0.1".to_string()),
        }
    }
}

/// Finds the local address used for outbound traffic.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:9").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

/// Shared state handed to each [`Recorder`](crate::Recorder).
pub struct RecorderContext {
    reference: Option<Arc<dyn TimeReference>>,
    timeout: Duration,
    basis: OnceLock<ClockBasis>,
    host: OnceLock<HostIdentity>,
}

impl fmt::Debug for RecorderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderContext")
            .field("has_reference", &self.reference.is_some())
            .field("timeout", &self.timeout)
            .field("basis", &self.basis.get())
            .field("host", &self.host.get())
            .finish()
    }
}

impl RecorderContext {
    /// Uses `reference` to calibrate the clock.
    pub fn new(reference: impl TimeReference + 'static) -> Self {
        Self {
            reference: Some(Arc::new(reference)),
            ..Self::system_only()
        }
    }

    /// Never queries a reference; every profile is recorded in `sys` mode.
    pub fn system_only() -> Self {
        Self {
            reference: None,
            timeout: DEFAULT_TIMEOUT,
            basis: OnceLock::new(),
            host: OnceLock::new(),
        }
    }

    /// Bounds the reference query.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fixes the host identity instead of detecting it.
    #[must_use]
    pub fn with_host(self, host: HostIdentity) -> Self {
        // A freshly built context has an empty cell.
        let _ = self.host.set(host);
        self
    }

    /// Clock basis, resolved on first use.
    pub fn basis(&self) -> &ClockBasis {
        self.basis
            .get_or_init(|| ClockBasis::resolve(self.reference.clone(), self.timeout))
    }

    /// Host identity, detected on first use.
    pub fn host(&self) -> &HostIdentity {
        self.host.get_or_init(HostIdentity::detect)
    }

    /// The calibration payload every profile of this process starts with.
    pub fn calibration(&self) -> Calibration {
        let basis = self.basis();
        let host = self.host();
        Calibration {
            hostname: host.hostname.clone(),
            ip: host.ip.clone(),
            t_sys: basis.t_sys,
            t_ref: basis.t_ref,
            mode: basis.mode,
        }
    }
}

impl Default for RecorderContext {
    fn default() -> Self {
        Self::system_only()
    }
}
