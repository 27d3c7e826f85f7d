//! Merging many profiles into one global timeline.

use std::collections::HashSet;

use crate::clock::{ClockAlignment, calibration_of, reconcile};
use crate::diagnostic::Diagnostic;
use crate::reader::Profile;
use crate::record::ProfileRecord;

/// The combined, time-sorted stream of all synced profiles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedProfile {
    /// Records with times relative to the session origin.
    pub records: Vec<ProfileRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Aligns clocks and merges the given profiles in one step.
pub fn combine_profiles(profiles: &[Profile]) -> MergedProfile {
    let alignment = reconcile(profiles);
    let mut merged = merge_profiles(profiles, &alignment);

    let mut diagnostics = alignment.diagnostics;
    diagnostics.append(&mut merged.diagnostics);
    merged.diagnostics = diagnostics;
    merged
}

/// Rebases every record onto the session origin and sorts the union by time.
///
/// For each profile, `t_min` and then the host offset are subtracted from all
/// timestamps. Profiles without a calibration record have no time basis and
/// are left out; [`reconcile`] has already reported them. A host with no
/// offset entry is reported once and treated as 0.0; `ntp` profiles are
/// never shifted either way. The sort is stable,
/// so records with equal times keep their per-profile order and profiles
/// appear in input order.
pub fn merge_profiles(profiles: &[Profile], alignment: &ClockAlignment) -> MergedProfile {
    let mut merged = MergedProfile::default();
    let Some(t_min) = alignment.t_min else {
        return merged;
    };

    let mut warned_hosts = HashSet::new();

    for profile in profiles {
        let Some(calibration) = profile.first().and_then(|first| calibration_of(first).ok())
        else {
            continue;
        };

        let host_id = calibration.host_id();
        if !alignment.offsets.contains_key(&host_id) && warned_hosts.insert(host_id.clone()) {
            tracing::warn!(host_id = %host_id, "no time offset, assuming 0.0");
            merged.diagnostics.push(Diagnostic::MissingOffset { host_id });
        }
        let offset = alignment.offset_for(&calibration).unwrap_or(0.0);

        let mut end_count = 0;
        for record in &profile.records {
            if record.is_end() {
                end_count += 1;
            }
            let mut record = record.clone();
            record.time = record.time - t_min - offset;
            merged.records.push(record);
        }

        match end_count {
            0 => {
                tracing::warn!(path = %profile.path.display(), "profile not correctly closed");
                merged.diagnostics.push(Diagnostic::NotClosed {
                    path: profile.path.clone(),
                });
            }
            1 => {}
            count => {
                tracing::warn!(path = %profile.path.display(), count, "profile closed multiple times");
                merged.diagnostics.push(Diagnostic::ClosedMultipleTimes {
                    path: profile.path.clone(),
                    count,
                });
            }
        }
    }

    merged.records.sort_by(|a, b| a.time.total_cmp(&b.time));
    merged
}
