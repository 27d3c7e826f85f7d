//! Normalization of a merged stream into canonical per-entity records.
//!
//! Every record is attributed to an entity (its `uid`, or the session when it
//! has none) and tagged as either a state transition or a plain event. Each
//! entity keeps at most one transition per state, and a final state other
//! than the canceled one retracts an earlier cancellation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::record::ProfileRecord;

/// Entity type assigned to records without a uid.
pub const SESSION_ENTITY: &str = "session";

/// Separator between an entity type and the rest of a uid.
const UID_TYPE_SEPARATOR: char = '.';

/// Whether a normalized record is a state transition or a plain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventName {
    State,
    Event,
}

impl EventName {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied context for a normalization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Uid given to records that have none.
    pub session_id: String,
    /// States that end an entity's lifecycle.
    pub final_states: Vec<String>,
    /// The final state that a genuine outcome supersedes.
    pub canceled_state: String,
}

impl NormalizeOptions {
    fn supersedes_cancel(&self, state: &str) -> bool {
        state != self.canceled_state && self.final_states.iter().any(|s| s == state)
    }
}

/// A record in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub time: f64,
    pub name: String,
    pub uid: String,
    pub state: String,
    pub event: String,
    pub msg: String,
    /// Prefix of the uid before the first `.`, or `session`.
    pub entity_type: String,
    pub event_name: EventName,
}

impl NormalizedRecord {
    /// Column names for tabular output.
    pub const COLUMNS: [&'static str; 8] = [
        "time",
        "name",
        "uid",
        "state",
        "event",
        "msg",
        "entity_type",
        "event_name",
    ];
}

/// Per-entity bookkeeping, alive only during one pass.
#[derive(Debug, Default)]
struct Entity {
    events: Vec<NormalizedRecord>,
    /// Live transition per state label, in insertion order.
    states: Vec<NormalizedRecord>,
}

impl Entity {
    fn has_state(&self, state: &str) -> bool {
        self.states.iter().any(|r| r.state == state)
    }

    fn drop_state(&mut self, state: &str) {
        self.states.retain(|r| r.state != state);
    }
}

/// Result of a normalization pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanProfile {
    pub records: Vec<NormalizedRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Rewrites a merged stream into canonical per-entity records.
///
/// The input is expected to be sorted by time. The output holds every plain
/// event plus the surviving transition for each (entity, state) pair, stably
/// re-sorted by time.
pub fn clean_profile(records: &[ProfileRecord], options: &NormalizeOptions) -> CleanProfile {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut entities: Vec<Entity> = Vec::new();
    let mut diagnostics = Vec::new();

    for record in records {
        let (uid, entity_type) = if record.uid.is_empty() {
            (options.session_id.clone(), SESSION_ENTITY.to_string())
        } else {
            let entity_type = record
                .uid
                .split_once(UID_TYPE_SEPARATOR)
                .map_or(record.uid.as_str(), |(prefix, _)| prefix);
            (record.uid.clone(), entity_type.to_string())
        };

        if record.is_advance() && record.state.is_empty() {
            tracing::warn!(uid = %uid, time = record.time, "dropping state transition without state");
            diagnostics.push(Diagnostic::MissingState {
                uid,
                time: record.time,
            });
            continue;
        }

        let slot = *index.entry(uid.clone()).or_insert_with(|| {
            entities.push(Entity::default());
            entities.len() - 1
        });
        let entity = &mut entities[slot];

        let event_name = if record.is_advance() {
            EventName::State
        } else {
            EventName::Event
        };
        let normalized = NormalizedRecord {
            time: record.time,
            name: record.name.clone(),
            uid,
            state: record.state.clone(),
            event: record.event.clone(),
            msg: record.msg.clone(),
            entity_type,
            event_name,
        };

        match event_name {
            EventName::Event => entity.events.push(normalized),
            EventName::State => {
                if options.supersedes_cancel(&normalized.state) {
                    entity.drop_state(&options.canceled_state);
                }
                if entity.has_state(&normalized.state) {
                    tracing::debug!(
                        uid = %normalized.uid,
                        state = %normalized.state,
                        "ignoring duplicate state transition"
                    );
                    continue;
                }
                entity.states.push(normalized);
            }
        }
    }

    let mut out: Vec<NormalizedRecord> = entities
        .into_iter()
        .flat_map(|entity| entity.events.into_iter().chain(entity.states))
        .collect();
    out.sort_by(|a, b| a.time.total_cmp(&b.time));

    CleanProfile {
        records: out,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EVENT_ADVANCE;

    fn options() -> NormalizeOptions {
        NormalizeOptions {
            session_id: "session.0000".into(),
            final_states: vec!["DONE".into(), "FAILED".into(), "CANCELED".into()],
            canceled_state: "CANCELED".into(),
        }
    }

    fn advance(time: f64, uid: &str, state: &str) -> ProfileRecord {
        ProfileRecord::new(time, "agent:main", EVENT_ADVANCE)
            .with_uid(uid)
            .with_state(state)
    }

    fn states_of<'a>(records: &'a [NormalizedRecord], uid: &str) -> Vec<&'a str> {
        records
            .iter()
            .filter(|r| r.uid == uid && r.event_name == EventName::State)
            .map(|r| r.state.as_str())
            .collect()
    }

    #[test]
    fn final_state_supersedes_cancel() {
        let stream = [
            advance(1.0, "task.0", "NEW"),
            advance(2.0, "task.0", "CANCELED"),
            advance(3.0, "task.0", "DONE"),
        ];
        let clean = clean_profile(&stream, &options());
        assert_eq!(states_of(&clean.records, "task.0"), ["NEW", "DONE"]);
    }

    #[test]
    fn cancel_after_final_state_is_kept() {
        let stream = [
            advance(1.0, "task.0", "DONE"),
            advance(2.0, "task.0", "CANCELED"),
        ];
        let clean = clean_profile(&stream, &options());
        assert_eq!(states_of(&clean.records, "task.0"), ["DONE", "CANCELED"]);
    }

    #[test]
    fn duplicate_transition_keeps_first() {
        let stream = [
            advance(1.0, "task.0", "RUNNING").with_msg("first"),
            advance(1.0, "task.0", "RUNNING").with_msg("second"),
        ];
        let clean = clean_profile(&stream, &options());
        assert_eq!(clean.records.len(), 1);
        assert_eq!(clean.records[0].msg, "first");
    }

    #[test]
    fn records_without_uid_belong_to_session() {
        let stream = [ProfileRecord::new(0.5, "agent:main", "bootstrap")];
        let clean = clean_profile(&stream, &options());
        let record = &clean.records[0];
        assert_eq!(record.uid, "session.0000");
        assert_eq!(record.entity_type, "session");
        assert_eq!(record.event_name, EventName::Event);
    }

    #[test]
    fn entity_type_is_uid_prefix() {
        let stream = [
            ProfileRecord::new(1.0, "a:b", "schedule").with_uid("task.000001"),
            ProfileRecord::new(2.0, "a:b", "schedule").with_uid("pilot"),
        ];
        let clean = clean_profile(&stream, &options());
        assert_eq!(clean.records[0].entity_type, "task");
        assert_eq!(clean.records[1].entity_type, "pilot");
    }

    #[test]
    fn output_is_sorted_across_entities() {
        let stream = [
            advance(1.0, "task.0", "NEW"),
            ProfileRecord::new(1.5, "a:b", "exec").with_uid("task.1"),
            ProfileRecord::new(2.0, "a:b", "exec").with_uid("task.0"),
            advance(3.0, "task.1", "DONE"),
        ];
        let clean = clean_profile(&stream, &options());
        let times: Vec<f64> = clean.records.iter().map(|r| r.time).collect();
        assert_eq!(times, [1.0, 1.5, 2.0, 3.0]);
    }

    #[test]
    fn advance_without_state_is_reported_and_dropped() {
        let stream = [advance(1.0, "task.0", "")];
        let clean = clean_profile(&stream, &options());
        assert!(clean.records.is_empty());
        assert_eq!(
            clean.diagnostics,
            [Diagnostic::MissingState {
                uid: "task.0".into(),
                time: 1.0
            }]
        );
    }
}
