//! Transition-rule trait and the process-wide rule registry.
//!
//! Every rule declares the state keys it affects and how to select its
//! commands; registration happens once, at first use of the registry, in a
//! fixed order. The registered order defines both the global `STATE_KEYS`
//! ordering (first-seen) and the order rules contribute updates for a given
//! date, so it is part of observable behavior.

use std::collections::HashMap;
use std::sync::LazyLock;

use core_cmds::{CommandTable, ParamValue};

use crate::transitions::TransitionMap;
use crate::{StatesError, Value};

/// A transition rule: maps matching commands to partial state updates.
pub trait TransitionRule: Send + Sync {
    /// Stable identifier used for logging and diagnostics.
    fn name(&self) -> &'static str;

    /// State keys this rule can write. Requesting any of them activates the
    /// rule (and, via [`Registry::expand_state_keys`], pulls in the rest).
    fn state_keys(&self) -> &'static [&'static str];

    /// Flat-attribute equality filter selecting this rule's commands.
    fn command_attributes(&self) -> &'static [(&'static str, &'static str)];

    /// Additional equality filters on parameter fields.
    fn command_params(&self) -> &'static [(&'static str, i64)] {
        &[]
    }

    /// Fallback value for the initial-state resolver when no transition was
    /// found within any lookback.
    fn default_value(&self) -> Option<Value> {
        None
    }

    /// Write this rule's updates for all matching commands into `map`.
    fn set_transitions(
        &self,
        map: &mut TransitionMap,
        cmds: &CommandTable,
    ) -> Result<(), StatesError>;

    /// Commands matching `command_attributes` and `command_params`.
    fn state_changing_commands(&self, cmds: &CommandTable) -> CommandTable {
        cmds.filtered(|row| {
            self.command_attributes().iter().all(|&(key, val)| {
                row.get(key).is_some_and(|have| match have {
                    ParamValue::Str(s) => s.eq_ignore_ascii_case(val),
                    _ => false,
                })
            }) && self
                .command_params()
                .iter()
                .all(|&(key, val)| row.get(key).and_then(|v| v.as_int()) == Some(val))
        })
    }
}

/// The rule catalog: registration-ordered rules plus the derived key maps.
#[derive(Default)]
pub struct Registry {
    rules: Vec<Box<dyn TransitionRule>>,
    state_keys: Vec<&'static str>,
    by_key: HashMap<&'static str, Vec<usize>>,
}

impl Registry {
    pub(crate) fn register(&mut self, rule: Box<dyn TransitionRule>) {
        let pos = self.rules.len();
        for key in rule.state_keys().iter().copied() {
            if !self.state_keys.iter().any(|k| *k == key) {
                self.state_keys.push(key);
            }
            self.by_key.entry(key).or_default().push(pos);
        }
        self.rules.push(rule);
    }

    /// All registered state keys, first-seen order.
    pub fn state_keys(&self) -> &[&'static str] {
        &self.state_keys
    }

    /// Rules affecting any of `keys` (all rules when None), in registration
    /// order.
    pub fn rules_for(&self, keys: Option<&[&str]>) -> Vec<&dyn TransitionRule> {
        match keys {
            None => self.rules.iter().map(|r| r.as_ref()).collect(),
            Some(keys) => {
                let mut idxs: Vec<usize> = keys
                    .iter()
                    .filter_map(|key| self.by_key.get(*key))
                    .flatten()
                    .copied()
                    .collect();
                idxs.sort_unstable();
                idxs.dedup();
                idxs.into_iter().map(|i| self.rules[i].as_ref()).collect()
            }
        }
    }

    /// Rules affecting one key, registration order.
    pub fn rules_for_key(&self, key: &str) -> Vec<&dyn TransitionRule> {
        self.rules_for(Some(&[key]))
    }

    /// Expand requested keys to the full set the activated rules touch
    /// (e.g. any PCAD key pulls in the whole PCAD cluster), preserving
    /// first-seen order.
    pub fn expand_state_keys(&self, keys: &[&str]) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = Vec::new();
        for key in keys {
            for rule in &self.rules {
                if rule.state_keys().iter().any(|k| k == key) {
                    for k in rule.state_keys().iter().copied() {
                        if !out.iter().any(|have| *have == k) {
                            out.push(k);
                        }
                    }
                }
            }
        }
        out
    }
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| {
    let mut reg = Registry::default();
    crate::rules::register_all(&mut reg);
    reg
});

/// The process-wide registry, built on first access and immutable after.
pub fn registry() -> &'static Registry {
    &REGISTRY
}
