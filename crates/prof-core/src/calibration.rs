//! Clock calibration records.
//!
//! Every profile opens with a `sync abs` record whose `msg` carries
//! `hostname:ip:t_sys:t_ref:mode`. This module parses and renders that payload.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a calibration payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    /// The payload did not have five `:`-separated fields.
    #[error("calibration payload has too few fields: {0:?}")]
    TooFewFields(String),

    /// A timestamp field was not a number.
    #[error("invalid {field} in calibration payload: {value:?}")]
    InvalidTime { field: &'static str, value: String },

    /// The mode was neither `ntp` nor `sys`.
    #[error("unknown sync mode: {0}")]
    UnknownMode(String),
}

/// How a recorder obtained its reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// An external time server answered.
    Ntp,
    /// No reference was reachable; the system clock was used as-is.
    Sys,
}

impl SyncMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ntp => "ntp",
            Self::Sys => "sys",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ntp" => Ok(Self::Ntp),
            "sys" => Ok(Self::Sys),
            _ => Err(CalibrationError::UnknownMode(s.to_string())),
        }
    }
}

/// Parsed calibration payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub hostname: String,
    pub ip: String,
    /// System clock reading taken alongside the reference query.
    pub t_sys: f64,
    /// Reference time: the server's answer in `ntp` mode, else the system clock.
    pub t_ref: f64,
    pub mode: SyncMode,
}

impl Calibration {
    /// Identifies the recording host as `hostname:ip`.
    pub fn host_id(&self) -> String {
        format!("{}:{}", self.hostname, self.ip)
    }

    /// Correction derived from this record: `t_sys - t_ref`.
    ///
    /// Only meaningful in `sys` mode, where it compares the process's own
    /// fallback readings and therefore stays close to zero.
    pub fn offset(&self) -> Option<f64> {
        match self.mode {
            SyncMode::Sys => Some(self.t_sys - self.t_ref),
            SyncMode::Ntp => None,
        }
    }

    /// Renders the payload written into the `msg` column.
    pub fn to_msg(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.hostname, self.ip, self.t_sys, self.t_ref, self.mode
        )
    }
}

impl FromStr for Calibration {
    type Err = CalibrationError;

    /// Parses `hostname:ip:t_sys:t_ref:mode`.
    ///
    /// The numeric fields and the mode are split off the right so that an
    /// IPv6 address in the `ip` slot survives.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let too_few = || CalibrationError::TooFewFields(s.to_string());

        let mut tail = s.rsplitn(4, ':');
        let mode = tail.next().ok_or_else(too_few)?;
        let t_ref = tail.next().ok_or_else(too_few)?;
        let t_sys = tail.next().ok_or_else(too_few)?;
        let host = tail.next().ok_or_else(too_few)?;
        let (hostname, ip) = host.split_once(':').ok_or_else(too_few)?;

        Ok(Self {
            hostname: hostname.to_string(),
            ip: ip.to_string(),
            t_sys: parse_time("t_sys", t_sys)?,
            t_ref: parse_time("t_ref", t_ref)?,
            mode: mode.parse()?,
        })
    }
}

fn parse_time(field: &'static str, value: &str) -> Result<f64, CalibrationError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| CalibrationError::InvalidTime {
            field,
            value: value.to_string(),
        })
}
