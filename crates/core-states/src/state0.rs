//! Initial-state resolver.
//!
//! Some state keys change many times a day (pitch), others may not change
//! for weeks (gratings), so a fixed window either wastes work or misses
//! slow keys. The resolver runs the pipeline per key over expanding
//! lookback windows, keeping the last value of every column each run
//! produces, until every requested key is filled.

use indexmap::IndexMap;
use tracing::debug;

use core_cmds::Archive;
use core_time::Date;

use crate::fold::get_states_for_cmds;
use crate::registry::registry;
use crate::{StatesError, Value};

/// Lookback windows in days, tried in ascending order.
pub const DEFAULT_LOOKBACKS: [f64; 4] = [7.0, 30.0, 180.0, 1000.0];

/// Resolve the state at `date` (now when None) for `state_keys` (all keys
/// when None) against an explicit archive.
pub fn get_state0_with(
    archive: &Archive,
    date: Option<&str>,
    state_keys: Option<&[&str]>,
    lookbacks: Option<&[f64]>,
) -> Result<IndexMap<String, Value>, StatesError> {
    let stop = match date {
        Some(d) => Date::parse(d)?,
        None => Date::now(),
    };
    let mut lookbacks: Vec<f64> = lookbacks.unwrap_or(&DEFAULT_LOOKBACKS).to_vec();
    lookbacks.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let state_keys: Vec<&str> = match state_keys {
        Some(keys) => keys.to_vec(),
        None => registry().state_keys().to_vec(),
    };

    let mut state0: IndexMap<String, Value> = IndexMap::new();
    let mut filled = false;

    for lookback in &lookbacks {
        let start = stop.sub_days(*lookback);
        let cmds = archive.filter(Some(start.as_str()), Some(stop.as_str()), &[])?;
        debug!(
            target: "states",
            lookback,
            n_cmds = cmds.len(),
            "state0_lookback"
        );

        for state_key in &state_keys {
            if state0.contains_key(*state_key) {
                continue;
            }

            // The per-key pipeline may resolve many more keys than asked
            // (PCAD coupling); keep every non-absent last-row value.
            let states = match get_states_for_cmds(&cmds, Some(&[*state_key]), None) {
                Ok(states) => states,
                Err(StatesError::NoTransitions { .. }) => continue,
                Err(e) => return Err(e),
            };
            let colnames: Vec<String> = states.keys().map(str::to_string).collect();
            for colname in colnames {
                if let Some(val) = states.last_value(&colname)? {
                    state0.insert(colname, val.clone());
                }
            }
        }

        if state_keys.iter().all(|k| state0.contains_key(*k)) {
            filled = true;
            break;
        }
    }

    if !filled {
        // Fall back to rule-declared defaults for whatever is still
        // missing.
        let missing: Vec<&str> = state_keys
            .iter()
            .filter(|k| !state0.contains_key(**k))
            .copied()
            .collect();
        for key in missing {
            for rule in registry().rules_for_key(key) {
                if let Some(val) = rule.default_value() {
                    state0.insert(key.to_string(), val);
                }
            }
        }

        let missing: Vec<String> = state_keys
            .iter()
            .filter(|k| !state0.contains_key(**k))
            .map(|k| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(StatesError::MissingState {
                keys: missing,
                max_lookback: lookbacks.last().copied().unwrap_or(0.0),
                date: stop.as_str().to_string(),
            });
        }
    }

    Ok(state0)
}

/// Resolve the state at `date` against the process-wide command archive.
pub fn get_state0(
    date: Option<&str>,
    state_keys: Option<&[&str]>,
    lookbacks: Option<&[f64]>,
) -> Result<IndexMap<String, Value>, StatesError> {
    let archive = core_cmds::global_archive()?;
    get_state0_with(&archive, date, state_keys, lookbacks)
}
