//! Command table and row views returned by `filter()`.

use std::fmt;
use std::sync::Arc;

use crate::pars::{ParamValue, ParsDict};
use crate::{Cmd, CmdsError, flat_value, is_flat_column};

/// A filtered set of commands sharing one parameter dictionary. Rows expose
/// flat columns directly and materialize their parameter tuples on demand.
#[derive(Debug, Clone)]
pub struct CommandTable {
    cmds: Vec<Cmd>,
    pars: Arc<ParsDict>,
}

impl CommandTable {
    pub fn new(cmds: Vec<Cmd>, pars: Arc<ParsDict>) -> Self {
        Self { cmds, pars }
    }

    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Row view at `i`. Panics when out of bounds (use [`CommandTable::get`]
    /// for checked access).
    pub fn row(&self, i: usize) -> CmdRow<'_> {
        CmdRow {
            cmd: &self.cmds[i],
            pars: &self.pars,
        }
    }

    pub fn get(&self, i: usize) -> Option<CmdRow<'_>> {
        self.cmds.get(i).map(|cmd| CmdRow {
            cmd,
            pars: &self.pars,
        })
    }

    pub fn first(&self) -> Option<CmdRow<'_>> {
        self.get(0)
    }

    pub fn last(&self) -> Option<CmdRow<'_>> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = CmdRow<'_>> {
        self.cmds.iter().map(|cmd| CmdRow {
            cmd,
            pars: &self.pars,
        })
    }

    /// Subset of rows satisfying `pred`, sharing the parameter dictionary.
    pub fn filtered(&self, pred: impl Fn(&CmdRow<'_>) -> bool) -> CommandTable {
        let cmds = self
            .iter()
            .filter(|row| pred(row))
            .map(|row| row.cmd.clone())
            .collect();
        CommandTable::new(cmds, self.pars.clone())
    }

    /// Column of values by name: a flat column, else a parameter column when
    /// any row's tuple carries the name, else `IllegalIndex`.
    pub fn col(&self, name: &str) -> Result<Vec<Option<ParamValue>>, CmdsError> {
        let name_lc = name.to_lowercase();
        if is_flat_column(&name_lc) {
            return Ok(self.cmds.iter().map(|cmd| flat_value(cmd, &name_lc)).collect());
        }
        let vals: Vec<Option<ParamValue>> = self
            .iter()
            .map(|row| row.param(&name_lc))
            .collect();
        if vals.iter().any(|v| v.is_some()) {
            Ok(vals)
        } else {
            Err(CmdsError::IllegalIndex {
                name: name.to_string(),
            })
        }
    }
}

/// View of one command row with access to its parameter tuple.
#[derive(Clone, Copy)]
pub struct CmdRow<'a> {
    cmd: &'a Cmd,
    pars: &'a ParsDict,
}

impl<'a> CmdRow<'a> {
    pub fn cmd(&self) -> &'a Cmd {
        self.cmd
    }

    pub fn date(&self) -> &'a str {
        &self.cmd.date
    }

    pub fn tlmsid(&self) -> Option<&'a str> {
        self.cmd.tlmsid.as_deref()
    }

    /// Materialize the full parameter tuple for this row (empty when the
    /// row's `idx` is not in the dictionary).
    pub fn params(&self) -> Vec<(String, ParamValue)> {
        self.pars
            .params_for(self.cmd.idx)
            .cloned()
            .unwrap_or_default()
    }

    /// One named parameter from the dictionary tuple.
    pub fn param(&self, name: &str) -> Option<ParamValue> {
        self.pars.param(self.cmd.idx, name).cloned()
    }

    /// Unified accessor: flat column when the key names one, else the
    /// parameter tuple. Returns None for keys unset on this row.
    pub fn get(&self, key: &str) -> Option<ParamValue> {
        let key = key.to_lowercase();
        if is_flat_column(&key) {
            if let Some(v) = flat_value(self.cmd, &key) {
                return Some(v);
            }
        }
        self.param(&key)
    }
}

impl fmt::Debug for CmdRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Cmd {} {}{}>",
            self.cmd.date,
            self.cmd.cmd_type.as_str(),
            self.cmd
                .tlmsid
                .as_deref()
                .map(|t| format!(" tlmsid={t}"))
                .unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CmdType;

    fn table() -> CommandTable {
        let pars = Arc::new(ParsDict::from_entries(vec![
            (vec![("id".into(), ParamValue::Int(23456))], 42),
            (
                vec![
                    ("pos".into(), ParamValue::Int(-99616)),
                    ("msid".into(), ParamValue::Str("3TSCMOVE".into())),
                ],
                7,
            ),
        ]));
        CommandTable::new(
            vec![
                Cmd::new("2020:001:00:00:00.000", CmdType::MpObsid).with_idx(42),
                Cmd::new("2020:002:00:00:00.000", CmdType::SimTrans).with_idx(7),
            ],
            pars,
        )
    }

    #[test]
    fn row_param_materialization() {
        let t = table();
        assert_eq!(t.row(0).param("id"), Some(ParamValue::Int(23456)));
        assert_eq!(t.row(0).param("pos"), None);
        let params = t.row(1).params();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].0, "pos");
    }

    #[test]
    fn get_prefers_flat_then_params() {
        let t = table();
        // `type` is flat.
        assert_eq!(
            t.row(1).get("type"),
            Some(ParamValue::Str("SIMTRANS".into()))
        );
        // `pos` is unset flat for this row, found in the tuple.
        assert_eq!(t.row(1).get("pos"), Some(ParamValue::Int(-99616)));
        assert_eq!(t.row(0).get("missing"), None);
    }

    #[test]
    fn filtered_preserves_dictionary() {
        let t = table();
        let sub = t.filtered(|row| row.cmd().cmd_type == CmdType::SimTrans);
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.row(0).get("msid"), Some(ParamValue::Str("3TSCMOVE".into())));
    }

    #[test]
    fn col_flat_param_and_illegal() {
        let t = table();
        let dates = t.col("date").unwrap();
        assert_eq!(dates.len(), 2);
        let ids = t.col("id").unwrap();
        assert_eq!(ids[0], Some(ParamValue::Int(23456)));
        assert_eq!(ids[1], None);
        assert!(matches!(
            t.col("no_such_column"),
            Err(CmdsError::IllegalIndex { .. })
        ));
    }
}
