//! Clock alignment across hosts.
//!
//! Each profile's calibration record names its host and how its clock was
//! referenced. From those records we derive the session origin (`t_min`) and
//! one offset per host, before any timestamps are touched.

use std::collections::BTreeMap;

use crate::calibration::{Calibration, SyncMode};
use crate::diagnostic::Diagnostic;
use crate::reader::Profile;
use crate::record::ProfileRecord;

/// Offsets closer than this are considered equal.
const OFFSET_TOLERANCE: f64 = 1e-6;

/// Session origin and per-host clock corrections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockAlignment {
    /// Earliest calibration timestamp over all synced profiles.
    pub t_min: Option<f64>,
    /// Offset per `hostname:ip`, from `sys`-mode records only.
    pub offsets: BTreeMap<String, f64>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ClockAlignment {
    /// Offset to subtract from timestamps of a profile with this calibration.
    ///
    /// `ntp`-mode profiles are already synchronized and never shifted. For
    /// `sys`-mode profiles a missing host entry yields `None`, which callers
    /// treat as 0.0.
    pub fn offset_for(&self, calibration: &Calibration) -> Option<f64> {
        match calibration.mode {
            SyncMode::Ntp => Some(0.0),
            SyncMode::Sys => self.offsets.get(&calibration.host_id()).copied(),
        }
    }
}

/// Derives the session origin and host offsets from the first record of
/// every profile.
///
/// Profiles that are empty or lack a calibration record are reported and
/// skipped. When two `sys`-mode records for the same host disagree, the first
/// one wins.
pub fn reconcile(profiles: &[Profile]) -> ClockAlignment {
    let mut alignment = ClockAlignment::default();

    for profile in profiles {
        let Some(first) = profile.first() else {
            tracing::warn!(path = %profile.path.display(), "empty profile");
            alignment.diagnostics.push(Diagnostic::EmptyProfile {
                path: profile.path.clone(),
            });
            continue;
        };

        let calibration = match calibration_of(first) {
            Ok(calibration) => calibration,
            Err(reason) => {
                tracing::warn!(path = %profile.path.display(), %reason, "unsynced profile");
                alignment.diagnostics.push(Diagnostic::Unsynced {
                    path: profile.path.clone(),
                    reason,
                });
                continue;
            }
        };

        alignment.t_min = Some(alignment.t_min.map_or(first.time, |t| t.min(first.time)));

        let Some(offset) = calibration.offset() else {
            continue;
        };

        let host_id = calibration.host_id();
        match alignment.offsets.get(&host_id) {
            Some(&kept) if (kept - offset).abs() > OFFSET_TOLERANCE => {
                tracing::warn!(
                    path = %profile.path.display(),
                    host_id = %host_id,
                    kept,
                    ignored = offset,
                    "conflicting time sync"
                );
                alignment.diagnostics.push(Diagnostic::ConflictingOffset {
                    path: profile.path.clone(),
                    host_id,
                    kept,
                    ignored: offset,
                });
            }
            Some(_) => {}
            None => {
                tracing::debug!(host_id = %host_id, offset, "derived host offset");
                alignment.offsets.insert(host_id, offset);
            }
        }
    }

    alignment
}

/// Extracts the calibration payload, describing why it is unusable if not.
pub(crate) fn calibration_of(first: &ProfileRecord) -> Result<Calibration, String> {
    if !first.is_sync() {
        return Err(format!("first event is {:?}, not a sync record", first.event));
    }
    first.msg.parse().map_err(|e| format!("{e}"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::record::EVENT_SYNC_ABS;

    fn profile(path: &str, time: f64, msg: &str) -> Profile {
        Profile {
            path: PathBuf::from(path),
            records: vec![ProfileRecord::new(time, "agent:main", EVENT_SYNC_ABS).with_msg(msg)],
        }
    }

    #[test]
    fn t_min_covers_all_modes() {
        let profiles = [
            profile("a.prof", 105.0, "h1:1.1.1.1:105.0:105.0:sys"),
            profile("b.prof", 100.0, "h2:2.2.2.2:100.0:99.0:ntp"),
        ];
        let alignment = reconcile(&profiles);
        assert_eq!(alignment.t_min, Some(100.0));
        assert!(alignment.diagnostics.is_empty());
    }

    #[test]
    fn ntp_profiles_contribute_no_offset() {
        let profiles = [profile("b.prof", 100.0, "h2:2.2.2.2:100.0:99.0:ntp")];
        let alignment = reconcile(&profiles);
        assert!(alignment.offsets.is_empty());
    }

    #[test]
    fn sys_offset_is_sys_minus_ref() {
        let profiles = [profile("a.prof", 100.0, "h1:1.1.1.1:105.0:100.0:sys")];
        let alignment = reconcile(&profiles);
        let offset = alignment.offsets["h1:1.1.1.1"];
        assert!((offset - 5.0).abs() < 1e-9);
    }

    #[test]
    fn conflicting_offset_keeps_first() {
        let profiles = [
            profile("a.prof", 100.0, "h1:1.1.1.1:105.0:100.0:sys"),
            profile("b.prof", 101.0, "h1:1.1.1.1:103.0:100.0:sys"),
            profile("c.prof", 102.0, "h1:1.1.1.1:106.0:101.0:sys"),
        ];
        let alignment = reconcile(&profiles);

        assert!((alignment.offsets["h1:1.1.1.1"] - 5.0).abs() < 1e-9);
        assert_eq!(alignment.diagnostics.len(), 1);
        assert!(matches!(
            &alignment.diagnostics[0],
            Diagnostic::ConflictingOffset { path, .. } if path == &PathBuf::from("b.prof")
        ));
    }

    #[test]
    fn offsets_within_tolerance_do_not_conflict() {
        let sys_msg = |offset: f64| {
            Calibration {
                hostname: "h1".into(),
                ip: "1.1.1.1".into(),
                t_sys: offset,
                t_ref: 0.0,
                mode: SyncMode::Sys,
            }
            .to_msg()
        };
        let profiles = [
            profile("first.prof", 100.0, &sys_msg(5.0)),
            profile("near.prof", 101.0, &sys_msg(5.0 + OFFSET_TOLERANCE / 2.0)),
            profile("far.prof", 102.0, &sys_msg(5.0 + OFFSET_TOLERANCE * 2.0)),
        ];

        let alignment = reconcile(&profiles);
        assert!((alignment.offsets["h1:1.1.1.1"] - 5.0).abs() < f64::EPSILON);
        assert_eq!(alignment.diagnostics.len(), 1);
        assert!(matches!(
            &alignment.diagnostics[0],
            Diagnostic::ConflictingOffset { path, .. } if path == &PathBuf::from("far.prof")
        ));
    }

    #[test]
    fn unsynced_and_empty_profiles_are_reported() {
        let empty = Profile {
            path: PathBuf::from("empty.prof"),
            records: Vec::new(),
        };
        let unsynced = Profile {
            path: PathBuf::from("raw.prof"),
            records: vec![ProfileRecord::new(50.0, "x:y", "work")],
        };
        let garbled = profile("garbled.prof", 40.0, "not-a-payload");

        let alignment = reconcile(&[empty, unsynced, garbled]);
        assert_eq!(alignment.t_min, None);
        assert_eq!(alignment.diagnostics.len(), 3);
        assert!(matches!(alignment.diagnostics[0], Diagnostic::EmptyProfile { .. }));
        assert!(matches!(alignment.diagnostics[1], Diagnostic::Unsynced { .. }));
        assert!(matches!(alignment.diagnostics[2], Diagnostic::Unsynced { .. }));
    }

    #[test]
    fn offset_for_respects_mode() {
        let profiles = [profile("a.prof", 100.0, "h1:1.1.1.1:105.0:100.0:sys")];
        let alignment = reconcile(&profiles);

        let ntp: Calibration = "h1:1.1.1.1:1.0:1.0:ntp".parse().unwrap();
        let sys: Calibration = "h1:1.1.1.1:1.0:1.0:sys".parse().unwrap();
        let unknown: Calibration = "h9:9.9.9.9:1.0:1.0:sys".parse().unwrap();

        assert_eq!(alignment.offset_for(&ntp), Some(0.0));
        assert!((alignment.offset_for(&sys).unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(alignment.offset_for(&unknown), None);
    }
}
