//! Implementation of the `prof combine` command.
//!
//! Reads profiles, aligns their clocks, merges them onto one timeline and
//! writes the normalized stream to stdout or a file.

use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use prof_core::{
    Diagnostic, NormalizeOptions, OutputFormat, ReadError, clean_profile, combine_profiles,
    find_profiles, read_profiles, write_normalized,
};
use uuid::Uuid;

use crate::Config;

#[derive(Debug, Args)]
pub struct CombineArgs {
    /// Profile files. Defaults to every `*.prof` file in the profile directory.
    pub paths: Vec<PathBuf>,

    /// Directory to scan when no paths are given.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Session id assigned to events without a uid.
    #[arg(long)]
    pub sid: Option<String>,

    /// A final state (repeatable). Overrides the configured list.
    #[arg(long = "final-state")]
    pub final_states: Vec<String>,

    /// The state a genuine final state supersedes.
    #[arg(long)]
    pub canceled_state: Option<String>,

    /// Output encoding: csv or jsonl.
    #[arg(long, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,

    /// Write to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Outcome of a combine run.
#[derive(Debug)]
pub struct CombineReport {
    pub profiles: usize,
    pub records: usize,
    pub failures: Vec<ReadError>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn run(args: &CombineArgs, config: &Config) -> Result<CombineReport> {
    let paths = resolve_paths(&args.paths, args.dir.as_deref().unwrap_or(&config.profile_dir))?;
    let options = normalize_options(args, config);
    tracing::debug!(profiles = paths.len(), session_id = %options.session_id, "combining profiles");

    let set = read_profiles(&paths);
    let merged = combine_profiles(&set.profiles);
    let clean = clean_profile(&merged.records, &options);

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_normalized(BufWriter::new(file), &clean.records, args.format)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => {
            let stdout = stdout();
            let mut writer = BufWriter::new(stdout.lock());
            write_normalized(&mut writer, &clean.records, args.format)
                .context("failed to write output")?;
            writer.flush().context("failed to write output")?;
        }
    }

    let mut diagnostics = merged.diagnostics;
    diagnostics.extend(clean.diagnostics);

    Ok(CombineReport {
        profiles: set.profiles.len(),
        records: clean.records.len(),
        failures: set.failures,
        diagnostics,
    })
}

/// Uses explicit paths when given, else scans `dir`.
fn resolve_paths(paths: &[PathBuf], dir: &Path) -> Result<Vec<PathBuf>> {
    if !paths.is_empty() {
        return Ok(paths.to_vec());
    }

    let found = find_profiles(dir)
        .with_context(|| format!("invalid profile directory {}", dir.display()))?;
    if found.is_empty() {
        anyhow::bail!("no profiles found in {}", dir.display());
    }
    Ok(found)
}

/// Command-line values win over configuration.
fn normalize_options(args: &CombineArgs, config: &Config) -> NormalizeOptions {
    let session_id = args
        .sid
        .clone()
        .or_else(|| config.session_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let final_states = if args.final_states.is_empty() {
        config.final_states.clone()
    } else {
        args.final_states.clone()
    };
    let canceled_state = args
        .canceled_state
        .clone()
        .unwrap_or_else(|| config.canceled_state.clone());

    NormalizeOptions {
        session_id,
        final_states,
        canceled_state,
    }
}
