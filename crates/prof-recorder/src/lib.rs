//! Lightweight per-process event recording.
//!
//! A [`Recorder`] writes one `.prof` file per named component: a header, a
//! clock calibration record, then one CSV line per event. Process-wide clock
//! and host information lives in a [`RecorderContext`] shared by all recorders.

mod context;
mod recorder;
pub mod sntp;

pub use context::{ClockBasis, HostIdentity, RecorderContext};
pub use recorder::{PROFILE_EXTENSION, Recorder, RecorderError, Uids, env_name, profile_path};
pub use sntp::{SntpClient, TimeReference, TimeReferenceError};

/// Current Unix time in seconds.
#[expect(
    clippy::cast_precision_loss,
    reason = "microsecond Unix timestamps fit comfortably in an f64 mantissa"
)]
pub fn timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
