//! Core logic for combining per-process profiles.
//!
//! This crate contains the fundamental types and logic for:
//! - Records: the typed form of one profile line
//! - Reading: parsing `.prof` files into ordered record sequences
//! - Clock alignment: deriving per-host offsets from calibration records
//! - Merging: rebasing all profiles onto one global timeline
//! - Normalization: canonical per-entity event and state records

pub mod calibration;
pub mod clock;
pub mod diagnostic;
pub mod merge;
pub mod normalize;
pub mod output;
pub mod reader;
pub mod record;

pub use calibration::{Calibration, CalibrationError, SyncMode};
pub use clock::{ClockAlignment, reconcile};
pub use diagnostic::Diagnostic;
pub use merge::{MergedProfile, combine_profiles, merge_profiles};
pub use normalize::{CleanProfile, EventName, NormalizeOptions, NormalizedRecord, clean_profile};
pub use output::{OutputFormat, write_normalized};
pub use reader::{
    Profile, ProfileSet, ReadError, find_profiles, parse_profile, read_profile, read_profiles,
};
pub use record::{
    EVENT_ADVANCE, EVENT_END, EVENT_FLUSH, EVENT_SYNC_ABS, FIELDS, ProfileRecord, format_time,
};
