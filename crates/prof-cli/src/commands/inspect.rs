//! Implementation of the `prof inspect` command.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use prof_core::{Profile, find_profiles, read_profiles, reconcile};
use serde::Serialize;

use crate::Config;

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Profile files. Defaults to every `*.prof` file in the profile directory.
    pub paths: Vec<PathBuf>,

    /// Directory to scan when no paths are given.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Emit one JSON object per profile instead of a table.
    #[arg(long)]
    pub json: bool,
}

/// Calibration and closure summary of one profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub path: PathBuf,
    pub host_id: Option<String>,
    pub mode: Option<String>,
    pub started: Option<DateTime<Utc>>,
    /// Offset subtracted from this profile's timestamps when merging.
    pub offset: Option<f64>,
    pub records: usize,
    pub ends: usize,
}

pub fn run(args: &InspectArgs, config: &Config) -> Result<()> {
    let paths = if args.paths.is_empty() {
        let dir = args.dir.as_deref().unwrap_or(&config.profile_dir);
        find_profiles(dir).with_context(|| format!("invalid profile directory {}", dir.display()))?
    } else {
        args.paths.clone()
    };

    let set = read_profiles(&paths);
    for failure in &set.failures {
        eprintln!("error: {failure}");
    }

    let summaries = summarize(&set.profiles);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        for summary in &summaries {
            serde_json::to_writer(&mut out, summary)?;
            writeln!(out)?;
        }
    } else {
        write_table(&mut out, &summaries)?;
    }
    Ok(())
}

/// Builds one summary per profile, in input order.
pub fn summarize(profiles: &[Profile]) -> Vec<ProfileSummary> {
    let alignment = reconcile(profiles);

    profiles
        .iter()
        .map(|profile| {
            let calibration = profile.calibration();
            ProfileSummary {
                path: profile.path.clone(),
                host_id: calibration.as_ref().map(prof_core::Calibration::host_id),
                mode: calibration.as_ref().map(|c| c.mode.to_string()),
                started: calibration.as_ref().and_then(|c| wall_time(c.t_sys)),
                offset: calibration
                    .as_ref()
                    .map(|c| alignment.offset_for(c).unwrap_or(0.0)),
                records: profile.records.len(),
                ends: profile.end_count(),
            }
        })
        .collect()
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "Unix seconds scaled to microseconds stay well inside i64"
)]
fn wall_time(seconds: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
}

fn write_table<W: Write>(out: &mut W, summaries: &[ProfileSummary]) -> io::Result<()> {
    writeln!(
        out,
        "{:<32} {:<28} {:<4} {:<20} {:>10} {:>8} {:>4}",
        "PROFILE", "HOST", "MODE", "STARTED", "OFFSET", "RECORDS", "ENDS"
    )?;
    for summary in summaries {
        let name = summary
            .path
            .file_name()
            .map_or_else(|| summary.path.display().to_string(), |n| n.to_string_lossy().into_owned());
        let started = summary
            .started
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        let offset = summary
            .offset
            .map_or_else(|| "-".to_string(), |o| format!("{o:.4}"));
        writeln!(
            out,
            "{:<32} {:<28} {:<4} {:<20} {:>10} {:>8} {:>4}",
            name,
            summary.host_id.as_deref().unwrap_or("unsynced"),
            summary.mode.as_deref().unwrap_or("-"),
            started,
            offset,
            summary.records,
            summary.ends,
        )?;
    }
    Ok(())
}
