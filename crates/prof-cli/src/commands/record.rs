//! Implementation of the `prof record` command.
//!
//! Appends one event to `<dir>/<name>.prof`, creating the file with its
//! header and calibration record on first use. Concurrent invocations on the
//! same directory are serialized with a lock file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use fs2::FileExt;
use prof_recorder::{Recorder, Uids};

use crate::Config;

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Component name; the profile is `<dir>/<name>.prof`.
    pub name: String,

    /// Event label.
    pub event: String,

    /// Subject of the event (repeatable, one line per uid).
    #[arg(long = "uid")]
    pub uids: Vec<String>,

    /// State reached, for `advance` events.
    #[arg(long)]
    pub state: Option<String>,

    /// Free-form message.
    #[arg(long)]
    pub msg: Option<String>,

    /// Unix time in seconds. Defaults to now.
    #[arg(long)]
    pub timestamp: Option<f64>,

    /// Profile directory. Defaults to the configured one.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Close the profile after this event.
    #[arg(long)]
    pub close: bool,
}

/// Returns the path to the lock file within the given profile directory.
fn lock_path(dir: &Path) -> PathBuf {
    dir.join(".lock")
}

/// Appends the event and returns the profile path.
pub fn run(args: &RecordArgs, config: &Config) -> Result<PathBuf> {
    let dir = args.dir.as_deref().unwrap_or(&config.profile_dir);
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create profile directory {}", dir.display()))?;

    let lock_file = File::create(lock_path(dir)).context("failed to create lock file")?;
    lock_file
        .lock_exclusive()
        .context("failed to acquire lock")?;

    let context = config.recorder_context();
    let recorder = Recorder::open(&args.name, true, dir, &context)?;
    let path = recorder
        .path()
        .map(Path::to_path_buf)
        .context("recorder was not enabled")?;

    let uids = if args.uids.is_empty() {
        Uids::None
    } else {
        Uids::from(args.uids.as_slice())
    };
    recorder.record(
        &args.event,
        uids,
        args.state.as_deref(),
        args.msg.as_deref(),
        args.timestamp,
    )?;

    if args.close {
        recorder.close()?;
    } else {
        recorder.detach()?;
    }
    tracing::debug!(path = %path.display(), event = %args.event, closed = args.close, "recorded event");

    // Lock is released when lock_file is dropped
    Ok(path)
}

#[cfg(test)]
mod tests {
    use prof_core::read_profile;

    use super::*;

    fn offline_config() -> Config {
        Config {
            ntp_enabled: false,
            ..Config::default()
        }
    }

    fn args(dir: &Path, event: &str) -> RecordArgs {
        RecordArgs {
            name: "agent".into(),
            event: event.into(),
            uids: Vec::new(),
            state: None,
            msg: None,
            timestamp: None,
            dir: Some(dir.to_path_buf()),
            close: false,
        }
    }

    #[test]
    fn first_record_writes_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let path = run(&args(dir.path(), "bootstrap"), &offline_config()).unwrap();

        let profile = read_profile(&path).unwrap();
        assert_eq!(profile.records.len(), 2);
        assert!(profile.records[0].is_sync());
        assert_eq!(profile.records[1].event, "bootstrap");
        assert_eq!(profile.end_count(), 0);
    }

    #[test]
    fn invocations_append_to_one_profile() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config();
        run(&args(dir.path(), "bootstrap"), &config).unwrap();

        let mut advance = args(dir.path(), "advance");
        advance.uids = vec!["task.0".into(), "task.1".into()];
        advance.state = Some("NEW".into());
        advance.timestamp = Some(1_700_000_000.5);
        run(&advance, &config).unwrap();

        let mut last = args(dir.path(), "shutdown");
        last.close = true;
        let path = run(&last, &config).unwrap();

        let profile = read_profile(&path).unwrap();
        let syncs = profile.records.iter().filter(|r| r.is_sync()).count();
        assert_eq!(syncs, 1);
        assert_eq!(profile.end_count(), 1);

        let advances: Vec<_> = profile.records.iter().filter(|r| r.is_advance()).collect();
        assert_eq!(advances.len(), 2);
        assert_eq!(advances[0].uid, "task.0");
        assert_eq!(advances[1].uid, "task.1");
        assert!(advances.iter().all(|r| r.state == "NEW" && r.time == 1_700_000_000.5));
    }

    #[test]
    fn lock_file_lives_in_profile_dir() {
        let dir = tempfile::tempdir().unwrap();
        run(&args(dir.path(), "bootstrap"), &offline_config()).unwrap();
        assert!(lock_path(dir.path()).exists());
    }
}
