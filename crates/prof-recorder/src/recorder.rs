//! The append-only event recorder.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use prof_core::{EVENT_END, EVENT_FLUSH, EVENT_SYNC_ABS, FIELDS, format_time};
use thiserror::Error;

use crate::context::RecorderContext;
use crate::timestamp;

/// File extension of profile logs.
pub const PROFILE_EXTENSION: &str = "prof";

/// Errors from an enabled recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("failed to create profile directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open profile {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write profile {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Subject uids of a recorded event.
///
/// A single call with [`Uids::Many`] writes one line per uid, all sharing the
/// same event, state, message and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Uids<'a> {
    /// The event has no subject.
    #[default]
    None,
    One(&'a str),
    Many(Vec<&'a str>),
}

impl<'a> Uids<'a> {
    /// The uid column of each line this call produces.
    fn columns(&self) -> Vec<&'a str> {
        match self {
            Self::None => vec![""],
            Self::One(uid) => vec![*uid],
            Self::Many(uids) => uids.clone(),
        }
    }
}

impl<'a> From<&'a str> for Uids<'a> {
    fn from(uid: &'a str) -> Self {
        Self::One(uid)
    }
}

impl<'a> From<&'a String> for Uids<'a> {
    fn from(uid: &'a String) -> Self {
        Self::One(uid)
    }
}

impl<'a> From<Option<&'a str>> for Uids<'a> {
    fn from(uid: Option<&'a str>) -> Self {
        uid.map_or(Self::None, Self::One)
    }
}

impl<'a> From<&'a [&'a str]> for Uids<'a> {
    fn from(uids: &'a [&'a str]) -> Self {
        Self::Many(uids.to_vec())
    }
}

impl<'a, const N: usize> From<&'a [&'a str; N]> for Uids<'a> {
    fn from(uids: &'a [&'a str; N]) -> Self {
        Self::Many(uids.to_vec())
    }
}

impl<'a> From<&'a [String]> for Uids<'a> {
    fn from(uids: &'a [String]) -> Self {
        Self::Many(uids.iter().map(String::as_str).collect())
    }
}

/// Handle state of an enabled recorder. `None` once closed.
struct Active {
    name: String,
    path: PathBuf,
    writer: Mutex<Option<csv::Writer<File>>>,
}

impl Active {
    fn lock(&self) -> MutexGuard<'_, Option<csv::Writer<File>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_err(&self, source: impl Into<io::Error>) -> RecorderError {
        RecorderError::Write {
            path: self.path.clone(),
            source: source.into(),
        }
    }

    /// Writes one line; a no-op once the recorder is closed.
    fn write_line(
        &self,
        time: f64,
        uid: &str,
        state: &str,
        event: &str,
        msg: &str,
    ) -> Result<(), RecorderError> {
        let mut guard = self.lock();
        let Some(writer) = guard.as_mut() else {
            return Ok(());
        };
        self.write_to(writer, time, uid, state, event, msg)
    }

    /// Writes one line into a writer the caller already holds.
    fn write_to(
        &self,
        writer: &mut csv::Writer<File>,
        time: f64,
        uid: &str,
        state: &str,
        event: &str,
        msg: &str,
    ) -> Result<(), RecorderError> {
        let origin = format!("{}:{}", self.name, execution_unit());
        writer
            .write_record([format_time(time).as_str(), origin.as_str(), uid, state, event, msg])
            .map_err(|e| self.write_err(e))
    }
}

/// Appends timestamped events to `<dir>/<name>.prof`.
///
/// A disabled recorder accepts every call and does nothing, so
/// instrumentation can stay in place unconditionally. All methods take
/// `&self`; share a recorder between threads with an `Arc`.
pub struct Recorder {
    active: Option<Active>,
}

impl Recorder {
    /// A recorder that ignores every call.
    pub const fn disabled() -> Self {
        Self { active: None }
    }

    /// Opens a recorder, or returns a disabled one when `enabled` is false.
    ///
    /// A new file starts with the header line and the calibration record of
    /// `context`. When the file already holds data, new events are appended
    /// after it and the preamble is not repeated.
    pub fn open(
        name: &str,
        enabled: bool,
        dir: &Path,
        context: &RecorderContext,
    ) -> Result<Self, RecorderError> {
        if !enabled {
            return Ok(Self::disabled());
        }

        fs::create_dir_all(dir).map_err(|source| RecorderError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = profile_path(dir, name);
        let open_err = |source| RecorderError::Open {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;
        let is_new = file.metadata().map_err(open_err)?.len() == 0;

        if is_new {
            writeln!(file, "#{}", FIELDS.join(",")).map_err(|source| RecorderError::Write {
                path: path.clone(),
                source,
            })?;
        }

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let active = Active {
            name: name.to_string(),
            path,
            writer: Mutex::new(Some(writer)),
        };

        if is_new {
            let calibration = context.calibration();
            active.write_line(timestamp(), "", "", EVENT_SYNC_ABS, &calibration.to_msg())?;
        }

        tracing::debug!(name, path = %active.path.display(), is_new, "opened profile");
        Ok(Self {
            active: Some(active),
        })
    }

    /// Opens a recorder enabled by the presence of [`env_name`]`(name)`.
    pub fn from_env(name: &str, dir: &Path, context: &RecorderContext) -> Result<Self, RecorderError> {
        let enabled = std::env::var_os(env_name(name)).is_some();
        Self::open(name, enabled, dir, context)
    }

    pub const fn enabled(&self) -> bool {
        self.active.is_some()
    }

    /// Path of the profile file, if enabled.
    pub fn path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    /// Appends one line per uid.
    ///
    /// `timestamp` defaults to the current time and is shared by all lines
    /// of a fan-out.
    pub fn record<'a>(
        &self,
        event: &str,
        uids: impl Into<Uids<'a>>,
        state: Option<&str>,
        msg: Option<&str>,
        timestamp: Option<f64>,
    ) -> Result<(), RecorderError> {
        let Some(active) = &self.active else {
            return Ok(());
        };

        let time = timestamp.unwrap_or_else(crate::timestamp);
        let state = state.unwrap_or_default();
        let msg = msg.unwrap_or_default();
        for uid in uids.into().columns() {
            active.write_line(time, uid, state, event, msg)?;
        }
        Ok(())
    }

    /// Shorthand for an event with no subject, state or message.
    pub fn event(&self, event: &str) -> Result<(), RecorderError> {
        self.record(event, Uids::None, None, None, None)
    }

    /// Records a `flush` marker, then pushes buffered lines to disk.
    pub fn flush(&self) -> Result<(), RecorderError> {
        let Some(active) = &self.active else {
            return Ok(());
        };

        self.event(EVENT_FLUSH)?;
        let mut guard = active.lock();
        if let Some(writer) = guard.as_mut() {
            writer.flush().map_err(|e| active.write_err(e))?;
            writer.get_ref().sync_all().map_err(|e| active.write_err(e))?;
        }
        Ok(())
    }

    /// Pushes buffered lines to the OS and releases the file without an `END`
    /// marker, leaving the profile open for a later invocation to continue.
    pub fn detach(self) -> Result<(), RecorderError> {
        let Some(active) = &self.active else {
            return Ok(());
        };

        let writer = active.lock().take();
        if let Some(mut writer) = writer {
            writer.flush().map_err(|e| active.write_err(e))?;
        }
        Ok(())
    }

    /// Records the `END` marker and releases the file.
    ///
    /// Later calls, including a second `close`, do nothing.
    pub fn close(&self) -> Result<(), RecorderError> {
        let Some(active) = &self.active else {
            return Ok(());
        };

        // END and the release happen under one guard so no line can follow END.
        let mut guard = active.lock();
        let Some(mut writer) = guard.take() else {
            return Ok(());
        };
        active.write_to(&mut writer, timestamp(), "", "", EVENT_END, "")?;
        writer.flush().map_err(|e| active.write_err(e))?;
        tracing::debug!(path = %active.path.display(), "closed profile");
        Ok(())
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("enabled", &self.enabled())
            .field("path", &self.path())
            .finish()
    }
}

/// Location of the profile for `name` inside `dir`.
pub fn profile_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{PROFILE_EXTENSION}"))
}

/// Environment variable that enables profiling for `name`.
///
/// Upper-cases the name, maps every non-alphanumeric character to `_` and
/// appends `_PROFILE`: `agent.0` becomes `AGENT_0_PROFILE`.
pub fn env_name(name: &str) -> String {
    let base: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{base}_PROFILE")
}

/// Identifies the calling thread in the `name` column.
fn execution_unit() -> String {
    let thread = std::thread::current();
    thread
        .name()
        .map_or_else(|| format!("{:?}", thread.id()), str::to_string)
}
