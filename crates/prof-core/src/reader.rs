//! Reading `.prof` files into typed records.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;

use crate::calibration::Calibration;
use crate::clock::calibration_of;
use crate::record::{FIELDS, ProfileRecord};

/// Errors from reading a single profile. Each variant carries the file path.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The file could not be opened or read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV layer rejected a row.
    #[error("malformed row in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A `time` column did not hold a number.
    #[error("invalid time {value:?} on line {line} of {}", path.display())]
    InvalidTime {
        path: PathBuf,
        line: u64,
        value: String,
    },
}

impl ReadError {
    /// The file this error belongs to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::Csv { path, .. } | Self::InvalidTime { path, .. } => {
                path
            }
        }
    }
}

/// All records parsed from one file, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub path: PathBuf,
    pub records: Vec<ProfileRecord>,
}

impl Profile {
    /// The first data record, expected to be the clock calibration entry.
    pub fn first(&self) -> Option<&ProfileRecord> {
        self.records.first()
    }

    /// Parses the calibration payload of the first record.
    ///
    /// Returns `None` when the profile is empty or the first record is not a
    /// well-formed `sync abs` entry.
    pub fn calibration(&self) -> Option<Calibration> {
        calibration_of(self.first()?).ok()
    }

    /// Number of `END` markers in the profile.
    pub fn end_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_end()).count()
    }
}

/// Result of reading a batch of files.
///
/// Failures are kept per file so callers can continue with what parsed.
#[derive(Debug, Default)]
pub struct ProfileSet {
    pub profiles: Vec<Profile>,
    pub failures: Vec<ReadError>,
}

/// Reads one profile from disk.
pub fn read_profile(path: &Path) -> Result<Profile, ReadError> {
    let file = File::open(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_profile(path, BufReader::new(file))
}

/// Parses profile content from any reader. `path` is used for error reporting.
pub fn parse_profile<R: Read>(path: &Path, reader: R) -> Result<Profile, ReadError> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for row in csv.records() {
        let row = row.map_err(|source| ReadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        if row.iter().all(str::is_empty) {
            continue;
        }

        let field = |idx: usize| row.get(idx).unwrap_or_default().to_string();
        let raw_time = field(0);
        let time = raw_time
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|t| t.is_finite())
            .ok_or_else(|| ReadError::InvalidTime {
                path: path.to_path_buf(),
                line: row.position().map_or(0, csv::Position::line),
                value: raw_time.clone(),
            })?;

        if row.len() > FIELDS.len() {
            tracing::debug!(
                path = %path.display(),
                columns = row.len(),
                "row has extra columns, ignoring them"
            );
        }

        records.push(ProfileRecord {
            time,
            name: field(1),
            uid: field(2),
            state: field(3),
            event: field(4),
            msg: field(5),
        });
    }

    Ok(Profile {
        path: path.to_path_buf(),
        records,
    })
}

/// Reads many profiles in parallel, preserving input order.
///
/// A file that fails to parse is reported in [`ProfileSet::failures`] and
/// does not affect the others.
pub fn read_profiles<P: AsRef<Path> + Sync>(paths: &[P]) -> ProfileSet {
    let results: Vec<Result<Profile, ReadError>> = paths
        .par_iter()
        .map(|path| read_profile(path.as_ref()))
        .collect();

    let mut set = ProfileSet::default();
    for result in results {
        match result {
            Ok(profile) => set.profiles.push(profile),
            Err(e) => {
                tracing::warn!(path = %e.path().display(), error = %e, "skipping unreadable profile");
                set.failures.push(e);
            }
        }
    }
    set
}

/// Lists `*.prof` files in a directory, sorted by path.
pub fn find_profiles(dir: &Path) -> Result<Vec<PathBuf>, glob::PatternError> {
    let pattern = dir.join("*.prof");
    let mut paths: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .collect();
    paths.sort();
    Ok(paths)
}
