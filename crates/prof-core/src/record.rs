//! The typed form of a single profile line.

use serde::{Deserialize, Serialize};

/// Field names in on-disk column order.
pub const FIELDS: [&str; 6] = ["time", "name", "uid", "state", "event", "msg"];

/// Event label of the clock calibration record opening every profile.
pub const EVENT_SYNC_ABS: &str = "sync abs";

/// Event label written when a recorder is closed.
pub const EVENT_END: &str = "END";

/// Event label written when a recorder is flushed.
pub const EVENT_FLUSH: &str = "flush";

/// Event label marking a state transition.
pub const EVENT_ADVANCE: &str = "advance";

/// One recorded event.
///
/// Absent fields are stored as empty strings, matching the on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Seconds since the Unix epoch as seen by the recording host, or seconds
    /// since the session origin once merged.
    pub time: f64,
    /// Entity name and execution unit, joined by `:`.
    pub name: String,
    /// Subject entity of the event.
    #[serde(default)]
    pub uid: String,
    /// Target state, set only for state transitions.
    #[serde(default)]
    pub state: String,
    /// Event kind.
    #[serde(default)]
    pub event: String,
    /// Free-form payload.
    #[serde(default)]
    pub msg: String,
}

impl ProfileRecord {
    /// Creates a record with only time, name and event set.
    pub fn new(time: f64, name: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            time,
            name: name.into(),
            uid: String::new(),
            state: String::new(),
            event: event.into(),
            msg: String::new(),
        }
    }

    /// Sets the subject uid.
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }

    /// Sets the target state.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    /// Returns `true` for the record written by `close()`.
    pub fn is_end(&self) -> bool {
        self.event == EVENT_END
    }

    /// Returns `true` for a clock calibration record.
    pub fn is_sync(&self) -> bool {
        self.event == EVENT_SYNC_ABS
    }

    /// Returns `true` for a state transition.
    pub fn is_advance(&self) -> bool {
        self.event == EVENT_ADVANCE
    }

    /// Renders the time column the way recorders write it.
    pub fn format_time(&self) -> String {
        format_time(self.time)
    }

    /// Returns the fields in on-disk column order.
    pub fn to_row(&self) -> [String; 6] {
        [
            self.format_time(),
            self.name.clone(),
            self.uid.clone(),
            self.state.clone(),
            self.event.clone(),
            self.msg.clone(),
        ]
    }
}

/// Formats a timestamp with the four decimals used in profile files.
pub fn format_time(time: f64) -> String {
    format!("{time:.4}")
}
