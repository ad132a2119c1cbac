//! Transition types and the transition-list builder.
//!
//! A transition is a dated partial state update: a mapping from state key to
//! either a concrete value or a deferred update that runs during the fold.
//! Transitions are assembled per date in an order-preserving map (the fold
//! applies a date's updates in rule insertion order), then flattened to a
//! date-sorted list. The list stays mutable through the fold because
//! deferred updates insert later entries.

use indexmap::IndexMap;
use tracing::debug;

use core_cmds::Cmd;
use core_time::Date;

use crate::registry::registry;
use crate::{StatesError, Value};
use core_cmds::CommandTable;
use std::collections::BTreeMap;

/// Deferred update kinds dispatched by the fold.
#[derive(Debug, Clone)]
pub enum DeferredKind {
    /// `AOMANUVR`: expand into per-leg attitude transitions.
    Maneuver { cmd: Cmd },
    /// `AONSMSAF`: drop to NSUN and maneuver to the sun-pointed attitude.
    NormalSun { cmd: Cmd },
    /// Periodic pitch/off-nominal-roll sample (active only in NPNT).
    SunVectorSample,
}

/// One partial state update.
#[derive(Debug, Clone)]
pub enum Update {
    Set(Value),
    Deferred(DeferredKind),
}

/// A dated set of partial updates. Keys are state keys plus the pseudo-keys
/// (`maneuver`, `update_pitch`) that only carry deferred updates.
#[derive(Debug, Clone)]
pub struct Transition {
    pub date: String,
    pub updates: IndexMap<&'static str, Update>,
}

impl Transition {
    pub fn new(date: &str) -> Self {
        Self {
            date: date.to_string(),
            updates: IndexMap::new(),
        }
    }

    pub fn with(mut self, key: &'static str, update: Update) -> Self {
        self.updates.insert(key, update);
        self
    }

    pub fn set(mut self, key: &'static str, value: Value) -> Self {
        self.updates.insert(key, Update::Set(value));
        self
    }
}

/// Date-keyed accumulator rules write into. Dates are lexicographically
/// sortable, so the BTreeMap iterates in chronological order; per-date maps
/// preserve insertion order.
#[derive(Debug, Default)]
pub struct TransitionMap {
    by_date: BTreeMap<String, IndexMap<&'static str, Update>>,
}

impl TransitionMap {
    /// Write one update at `date`, auto-creating the per-date entry. A later
    /// write to the same `(date, key)` overwrites the earlier one.
    pub fn set(&mut self, date: &str, key: &'static str, update: Update) {
        self.by_date
            .entry(date.to_string())
            .or_default()
            .insert(key, update);
    }

    pub fn set_value(&mut self, date: &str, key: &'static str, value: Value) {
        self.set(date, key, Update::Set(value));
    }

    /// Flatten to a date-sorted transition list.
    pub fn into_list(self) -> Vec<Transition> {
        self.by_date
            .into_iter()
            .map(|(date, updates)| Transition { date, updates })
            .collect()
    }
}

/// Collect transitions from every rule relevant to `state_keys` (all rules
/// when None), sorted ascending by date.
pub fn get_transitions_list(
    cmds: &CommandTable,
    state_keys: Option<&[&str]>,
) -> Result<Vec<Transition>, StatesError> {
    let mut map = TransitionMap::default();
    for rule in registry().rules_for(state_keys) {
        rule.set_transitions(&mut map, cmds)?;
    }
    Ok(map.into_list())
}

/// Sample grid spacing for sun-vector transitions, seconds.
pub const SUN_VECTOR_SAMPLE_TIME: f64 = 10_000.0;

/// Append pitch/off-nominal-roll sample transitions between `start` and
/// `stop` and re-sort. The grid anchors at an even multiple of the sample
/// time so overlapping windows sample at identical dates.
pub fn add_sun_vector_transitions(
    start: &str,
    stop: &str,
    transitions: &mut Vec<Transition>,
) -> Result<(), StatesError> {
    let tstart =
        (Date::parse(start)?.secs() / SUN_VECTOR_SAMPLE_TIME).floor() * SUN_VECTOR_SAMPLE_TIME;
    let tstop = Date::parse(stop)?.secs();

    let mut n = 0usize;
    let mut t = tstart;
    while t < tstop {
        let date = core_time::secs_to_date(t);
        transitions
            .push(Transition::new(&date).with("update_pitch", Update::Deferred(DeferredKind::SunVectorSample)));
        n += 1;
        t += SUN_VECTOR_SAMPLE_TIME;
    }
    debug!(target: "states", samples = n, "sun_vector_transitions_added");

    // Stable sort keeps same-date samples after the original entries.
    transitions.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(())
}

/// Insert `new` into the list at the first appropriate place after the
/// `idx` entry. Deferred updates use this to generate downstream
/// transitions; inserting at or before the current fold position is a
/// programming error because the fold is one-pass.
pub fn add_transition(
    transitions: &mut Vec<Transition>,
    idx: usize,
    new: Transition,
) -> Result<(), StatesError> {
    if new.date < transitions[idx].date {
        return Err(StatesError::InsertionOrdering);
    }

    // Linear scan; in practice insertions land close to the origin.
    for ii in idx + 1..transitions.len() {
        if new.date < transitions[ii].date {
            transitions.insert(ii, new);
            return Ok(());
        }
    }
    transitions.push(new);
    Ok(())
}
