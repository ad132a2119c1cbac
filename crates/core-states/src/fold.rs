//! The state folder: a single pass over the transition list producing the
//! interval table, plus the reducer.
//!
//! The fold owns the transition list because deferred updates (maneuvers,
//! normal-sun safing, sun-vector samples) run mid-pass and may insert
//! strictly-later transitions; the loop bound is re-read every iteration for
//! that reason. `add_transition` enforces that nothing lands at or before
//! the current position.

use indexmap::IndexMap;
use tracing::{debug, warn};

use core_attitude::{Quat, manvr_attitudes, nsm_attitude, off_nominal_roll, pitch};
use core_cmds::{Cmd, CommandTable};
use core_time::{Date, secs_to_date};

use crate::registry::registry;
use crate::rules::QUAT_COMPS;
use crate::transitions::{
    DeferredKind, Transition, Update, add_sun_vector_transitions, add_transition,
    get_transitions_list,
};
use crate::{DATE_FAR_FUTURE, StatesError, Value};

/// One complete state during the fold: every processed key, set or absent.
pub type State = IndexMap<&'static str, Option<Value>>;

/// Interval table: `datestart`/`datestop` plus one column per state key,
/// with `datestop[i] == datestart[i + 1]` and the last `datestop` far in
/// the future.
#[derive(Debug, Clone)]
pub struct StateTable {
    pub datestart: Vec<String>,
    pub datestop: Vec<String>,
    cols: IndexMap<String, Vec<Option<Value>>>,
}

impl StateTable {
    pub fn len(&self) -> usize {
        self.datestart.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datestart.is_empty()
    }

    /// Column names in state-key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cols.keys().map(|k| k.as_str())
    }

    /// One column by state key.
    pub fn col(&self, key: &str) -> Result<&[Option<Value>], StatesError> {
        self.cols
            .get(key)
            .map(|v| v.as_slice())
            .ok_or_else(|| StatesError::IllegalIndex {
                name: key.to_string(),
            })
    }

    /// Value at (`row`, `key`).
    pub fn value(&self, row: usize, key: &str) -> Result<Option<&Value>, StatesError> {
        Ok(self.col(key)?.get(row).and_then(|v| v.as_ref()))
    }

    /// Last-row value for `key`.
    pub fn last_value(&self, key: &str) -> Result<Option<&Value>, StatesError> {
        Ok(self.col(key)?.last().and_then(|v| v.as_ref()))
    }
}

/// Build the interval table for `cmds` over `state_keys` (all keys when
/// None). Requested keys expand to every key their rules touch, so the
/// output may carry more columns than requested; `reduce_states` trims.
/// `state0` seeds the first row; unknown `state0` keys warn and are
/// ignored.
pub fn get_states_for_cmds(
    cmds: &CommandTable,
    state_keys: Option<&[&str]>,
    state0: Option<&IndexMap<String, Value>>,
) -> Result<StateTable, StatesError> {
    let reg = registry();
    let state_keys: Vec<&'static str> = match state_keys {
        None => reg.state_keys().to_vec(),
        Some(requested) => reg.expand_state_keys(requested),
    };

    let mut transitions = get_transitions_list(cmds, Some(state_keys.as_slice()))?;

    // Periodic pitch/off-nominal-roll samples are only relevant (and only
    // affordable) when those keys are in play.
    if !cmds.is_empty()
        && state_keys
            .iter()
            .any(|k| *k == "pitch" || *k == "off_nom_roll")
    {
        let first = cmds.first().unwrap().date().to_string();
        let last = cmds.last().unwrap().date().to_string();
        add_sun_vector_transitions(&first, &last, &mut transitions)?;
    }

    if transitions.is_empty() {
        return Err(StatesError::NoTransitions {
            keys: state_keys.iter().map(|k| k.to_string()).collect(),
        });
    }

    let mut states: Vec<State> = vec![state_keys.iter().map(|k| (*k, None)).collect()];
    let mut datestarts: Vec<String> = vec![transitions[0].date.clone()];

    if let Some(state0) = state0 {
        for (key, val) in state0 {
            match states[0].get_mut(key.as_str()) {
                Some(slot) => *slot = Some(val.clone()),
                None => warn!(
                    target: "states",
                    key = %key,
                    "state0 key not in state_keys, ignoring it"
                ),
            }
        }
    }

    // The loop bound is re-read each pass: deferred updates extend the list.
    let mut idx = 0;
    while idx < transitions.len() {
        let date = transitions[idx].date.clone();

        // New date: snapshot the current state and open a new interval.
        // Multiple transitions can share one date.
        if date != *datestarts.last().unwrap() {
            let snapshot = states.last().unwrap().clone();
            states.push(snapshot);
            datestarts.push(date.clone());
        }

        let updates: Vec<(&'static str, Update)> = transitions[idx]
            .updates
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();

        for (key, update) in updates {
            let state = states.last_mut().unwrap();
            match update {
                Update::Set(value) => {
                    if let Some(slot) = state.get_mut(key) {
                        *slot = Some(value);
                    }
                }
                Update::Deferred(kind) => {
                    apply_deferred(&kind, &date, &mut transitions, state, idx)?
                }
            }
        }

        idx += 1;
    }

    debug!(
        target: "states",
        rows = states.len(),
        keys = state_keys.len(),
        transitions = transitions.len(),
        "states_folded"
    );

    let mut datestop: Vec<String> = datestarts[1..].to_vec();
    datestop.push(DATE_FAR_FUTURE.to_string());

    let mut cols: IndexMap<String, Vec<Option<Value>>> = state_keys
        .iter()
        .map(|k| (k.to_string(), Vec::with_capacity(states.len())))
        .collect();
    for state in &states {
        for key in &state_keys {
            cols.get_mut(*key).unwrap().push(state[key].clone());
        }
    }

    Ok(StateTable {
        datestart: datestarts,
        datestop,
        cols,
    })
}

fn apply_deferred(
    kind: &DeferredKind,
    date: &str,
    transitions: &mut Vec<Transition>,
    state: &mut State,
    idx: usize,
) -> Result<(), StatesError> {
    match kind {
        DeferredKind::Maneuver { cmd } => {
            let end_date = add_manvr_transitions(transitions, state, idx, cmd)?;
            // Auto-transition back to NPNT at end of maneuver (the normal
            // case).
            if let Some(end_date) = end_date
                && state_str(state, "auto_npnt") == Some("ENAB")
            {
                let npnt =
                    Transition::new(&end_date).set("pcad_mode", Value::Str("NPNT".to_string()));
                add_transition(transitions, idx, npnt)?;
            }
        }

        DeferredKind::NormalSun { cmd } => {
            set_state(state, "pcad_mode", Value::Str("NSUN".to_string()));

            let Some(curr) = state_quat(state, "") else {
                warn!(target: "states", date, "normal_sun_with_unknown_attitude");
                return Ok(());
            };
            let targ = nsm_attitude(&curr, Date::parse(&cmd.date)?.secs());
            set_state(state, "targ_q1", Value::Float(targ.q1));
            set_state(state, "targ_q2", Value::Float(targ.q2));
            set_state(state, "targ_q3", Value::Float(targ.q3));
            set_state(state, "targ_q4", Value::Float(targ.q4));

            add_manvr_transitions(transitions, state, idx, cmd)?;
        }

        DeferredKind::SunVectorSample => {
            if state_str(state, "pcad_mode") == Some("NPNT")
                && let Some(q) = state_quat(state, "")
            {
                let secs = Date::parse(date)?.secs();
                set_state(state, "pitch", Value::Float(pitch(q.ra(), q.dec(), secs)));
                set_state(
                    state,
                    "off_nom_roll",
                    Value::Float(off_nominal_roll(&q, secs)),
                );
            }
        }
    }
    Ok(())
}

/// Expand a maneuver command into per-leg transitions: attitude at the
/// start of each leg, pitch and off-nominal roll at the midpoint (the last
/// sample uses its own values). Returns the end-of-maneuver date, or None
/// when no target attitude is known.
fn add_manvr_transitions(
    transitions: &mut Vec<Transition>,
    state: &mut State,
    idx: usize,
    cmd: &Cmd,
) -> Result<Option<String>, StatesError> {
    let Some(targ) = state_quat(state, "targ_") else {
        warn!(target: "states", date = %cmd.date, "maneuver_without_target_attitude");
        return Ok(None);
    };

    // Startup transient: attitude unknown, so the first maneuver is a null
    // move to the target.
    if state_f64(state, "q1").is_none() {
        for qc in QUAT_COMPS {
            let targ_val = state[format!("targ_{qc}").as_str()].clone();
            if let Some(slot) = state.get_mut(qc) {
                *slot = targ_val;
            }
        }
    }
    let Some(curr) = state_quat(state, "") else {
        warn!(target: "states", date = %cmd.date, "maneuver_without_current_attitude");
        return Ok(None);
    };

    let atts = manvr_attitudes(&curr, &targ, Date::parse(&cmd.date)?.secs());

    let n = atts.len();
    let mut last_date = None;
    for (i, att) in atts.iter().enumerate() {
        let (leg_pitch, leg_onr) = if i + 1 < n {
            (
                (att.pitch + atts[i + 1].pitch) / 2.0,
                (att.off_nom_roll + atts[i + 1].off_nom_roll) / 2.0,
            )
        } else {
            (att.pitch, att.off_nom_roll)
        };

        let date = secs_to_date(att.time);
        let q = att.att;
        let transition = Transition::new(&date)
            .set("q1", Value::Float(q.q1))
            .set("q2", Value::Float(q.q2))
            .set("q3", Value::Float(q.q3))
            .set("q4", Value::Float(q.q4))
            .set("pitch", Value::Float(leg_pitch))
            .set("off_nom_roll", Value::Float(leg_onr))
            .set("ra", Value::Float(q.ra()))
            .set("dec", Value::Float(q.dec()))
            .set("roll", Value::Float(q.roll()));
        add_transition(transitions, idx, transition)?;
        last_date = Some(date);
    }

    Ok(last_date)
}

fn set_state(state: &mut State, key: &'static str, value: Value) {
    if let Some(slot) = state.get_mut(key) {
        *slot = Some(value);
    }
}

fn state_str<'a>(state: &'a State, key: &str) -> Option<&'a str> {
    state.get(key)?.as_ref()?.as_str()
}

fn state_f64(state: &State, key: &str) -> Option<f64> {
    state.get(key)?.as_ref()?.as_float()
}

/// Quaternion from the four `{prefix}q1..4` slots, if all are set.
fn state_quat(state: &State, prefix: &str) -> Option<Quat> {
    let mut comps = [0.0; 4];
    for (i, qc) in QUAT_COMPS.iter().enumerate() {
        comps[i] = state_f64(state, &format!("{prefix}{qc}"))?;
    }
    Some(Quat::new(comps[0], comps[1], comps[2], comps[3]))
}

/// Reduce a states table to transitions only in `state_keys`: keep the
/// first row and any row where one of the keys changed, then re-stitch the
/// interval bounds.
pub fn reduce_states(states: &StateTable, state_keys: &[&str]) -> Result<StateTable, StatesError> {
    let n = states.len();
    let mut keep = vec![false; n];
    if n > 0 {
        keep[0] = true;
    }
    for key in state_keys {
        let col = states.col(*key)?;
        for i in 1..n {
            keep[i] |= col[i] != col[i - 1];
        }
    }

    let datestart: Vec<String> = states
        .datestart
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(d, _)| d.clone())
        .collect();
    let mut datestop: Vec<String> = states
        .datestop
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(d, _)| d.clone())
        .collect();
    // Close the compressed intervals: each stop is the next start.
    let m = datestart.len();
    for i in 0..m.saturating_sub(1) {
        datestop[i] = datestart[i + 1].clone();
    }

    let mut cols = IndexMap::new();
    for key in state_keys {
        let col = states.col(*key)?;
        let vals: Vec<Option<Value>> = col
            .iter()
            .zip(&keep)
            .filter(|(_, k)| **k)
            .map(|(v, _)| v.clone())
            .collect();
        cols.insert(key.to_string(), vals);
    }

    Ok(StateTable {
        datestart,
        datestop,
        cols,
    })
}
