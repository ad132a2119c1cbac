//! Shared fixture helpers for the state-pipeline integration tests.

use std::sync::Arc;

use core_cmds::{Cmd, CmdType, CommandTable, ParamValue, ParsDict};

pub type ParsEntries = Vec<(Vec<(String, ParamValue)>, u32)>;

pub fn table(cmds: Vec<Cmd>, pars: ParsEntries) -> CommandTable {
    CommandTable::new(cmds, Arc::new(ParsDict::from_entries(pars)))
}

/// A COMMAND_SW with a tlmsid, the most common fixture shape.
pub fn sw(date: &str, tlmsid: &str) -> Cmd {
    Cmd::new(date, CmdType::CommandSw).with_tlmsid(tlmsid)
}

/// One parameter-dictionary entry holding a single int parameter.
pub fn pars_int(idx: u32, key: &str, val: i64) -> (Vec<(String, ParamValue)>, u32) {
    (vec![(key.to_string(), ParamValue::Int(val))], idx)
}
