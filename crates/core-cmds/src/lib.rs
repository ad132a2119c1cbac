//! Command archive access.
//!
//! The archive is two artifacts: a date-sorted table of commands and a
//! parameter dictionary of frozen tuples referenced by command `idx` (see
//! [`pars`]). Both load whole into memory on first use through a process-wide
//! lazy global; `filter()` answers time- and attribute-windowed queries over
//! it. Attribute filters on keys that are not flat columns fall back to a
//! parameter-dictionary scan, so `filter(.., [("aopcadse", 30)])` works even
//! though `aopcadse` only lives in parameter tuples for some archives.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::info;

use core_time::Date;

pub mod pars;
pub mod table;

pub use pars::{ParamTuple, ParamValue, ParsDict};
pub use table::{CmdRow, CommandTable};

/// Errors from archive loading and table access.
#[derive(Debug, thiserror::Error)]
pub enum CmdsError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("illegal table index {name:?}")]
    IllegalIndex { name: String },
    #[error(transparent)]
    Time(#[from] core_time::TimeError),
}

/// Command type discriminator. The archive tolerates types outside this set;
/// they deserialize as `Other` and never match a transition rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmdType {
    #[serde(rename = "COMMAND_SW")]
    CommandSw,
    #[serde(rename = "COMMAND_HW")]
    CommandHw,
    #[serde(rename = "ACISPKT")]
    AcisPkt,
    #[serde(rename = "SIMTRANS")]
    SimTrans,
    #[serde(rename = "SIMFOCUS")]
    SimFocus,
    #[serde(rename = "MP_OBSID")]
    MpObsid,
    #[serde(rename = "MP_TARGQUAT")]
    MpTargquat,
    #[serde(rename = "MP_DITHER")]
    MpDither,
    #[serde(rename = "MP_STARCAT")]
    MpStarcat,
    #[serde(rename = "ORBPOINT")]
    OrbPoint,
    #[serde(other, rename = "COMMAND_OTHER")]
    Other,
}

impl CmdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmdType::CommandSw => "COMMAND_SW",
            CmdType::CommandHw => "COMMAND_HW",
            CmdType::AcisPkt => "ACISPKT",
            CmdType::SimTrans => "SIMTRANS",
            CmdType::SimFocus => "SIMFOCUS",
            CmdType::MpObsid => "MP_OBSID",
            CmdType::MpTargquat => "MP_TARGQUAT",
            CmdType::MpDither => "MP_DITHER",
            CmdType::MpStarcat => "MP_STARCAT",
            CmdType::OrbPoint => "ORBPOINT",
            CmdType::Other => "COMMAND_OTHER",
        }
    }
}

/// One archived command. `date` is the canonical 25-char mission date so the
/// column is lexicographically sortable; `idx` keys into the parameter
/// dictionary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cmd {
    pub date: String,
    #[serde(rename = "type")]
    pub cmd_type: CmdType,
    #[serde(default)]
    pub tlmsid: Option<String>,
    #[serde(default)]
    pub scs: u8,
    #[serde(default)]
    pub step: u16,
    #[serde(default)]
    pub idx: u32,
    #[serde(default)]
    pub q1: Option<f64>,
    #[serde(default)]
    pub q2: Option<f64>,
    #[serde(default)]
    pub q3: Option<f64>,
    #[serde(default)]
    pub q4: Option<f64>,
    #[serde(default)]
    pub angp: Option<f64>,
    #[serde(default)]
    pub angy: Option<f64>,
    #[serde(default)]
    pub coefp: Option<f64>,
    #[serde(default)]
    pub coefy: Option<f64>,
    #[serde(default)]
    pub ratep: Option<f64>,
    #[serde(default)]
    pub ratey: Option<f64>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub aopcadse: Option<i64>,
    #[serde(default)]
    pub aopcadsd: Option<i64>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub pos: Option<i64>,
}

impl Cmd {
    pub fn new(date: &str, cmd_type: CmdType) -> Self {
        Self {
            date: date.to_string(),
            cmd_type,
            tlmsid: None,
            scs: 0,
            step: 0,
            idx: 0,
            q1: None,
            q2: None,
            q3: None,
            q4: None,
            angp: None,
            angy: None,
            coefp: None,
            coefy: None,
            ratep: None,
            ratey: None,
            event_type: None,
            aopcadse: None,
            aopcadsd: None,
            id: None,
            pos: None,
        }
    }

    pub fn with_tlmsid(mut self, tlmsid: &str) -> Self {
        self.tlmsid = Some(tlmsid.to_string());
        self
    }

    pub fn with_idx(mut self, idx: u32) -> Self {
        self.idx = idx;
        self
    }

    pub fn with_quat(mut self, q: [f64; 4]) -> Self {
        self.q1 = Some(q[0]);
        self.q2 = Some(q[1]);
        self.q3 = Some(q[2]);
        self.q4 = Some(q[3]);
        self
    }

    pub fn with_event_type(mut self, event_type: &str) -> Self {
        self.event_type = Some(event_type.to_string());
        self
    }
}

/// Flat-column names recognized by attribute filters and row access.
const FLAT_COLUMNS: &[&str] = &[
    "date",
    "type",
    "tlmsid",
    "scs",
    "step",
    "idx",
    "q1",
    "q2",
    "q3",
    "q4",
    "angp",
    "angy",
    "coefp",
    "coefy",
    "ratep",
    "ratey",
    "event_type",
    "aopcadse",
    "aopcadsd",
    "id",
    "pos",
];

pub(crate) fn is_flat_column(key: &str) -> bool {
    FLAT_COLUMNS.contains(&key)
}

/// Value of a flat column for one command, or None when the column is unset
/// for this command type. Key must already be lowercased.
pub(crate) fn flat_value(cmd: &Cmd, key: &str) -> Option<ParamValue> {
    match key {
        "date" => Some(ParamValue::Str(cmd.date.clone())),
        "type" => Some(ParamValue::Str(cmd.cmd_type.as_str().to_string())),
        "tlmsid" => cmd.tlmsid.clone().map(ParamValue::Str),
        "scs" => Some(ParamValue::Int(cmd.scs as i64)),
        "step" => Some(ParamValue::Int(cmd.step as i64)),
        "idx" => Some(ParamValue::Int(cmd.idx as i64)),
        "q1" => cmd.q1.map(ParamValue::Float),
        "q2" => cmd.q2.map(ParamValue::Float),
        "q3" => cmd.q3.map(ParamValue::Float),
        "q4" => cmd.q4.map(ParamValue::Float),
        "angp" => cmd.angp.map(ParamValue::Float),
        "angy" => cmd.angy.map(ParamValue::Float),
        "coefp" => cmd.coefp.map(ParamValue::Float),
        "coefy" => cmd.coefy.map(ParamValue::Float),
        "ratep" => cmd.ratep.map(ParamValue::Float),
        "ratey" => cmd.ratey.map(ParamValue::Float),
        "event_type" => cmd.event_type.clone().map(ParamValue::Str),
        "aopcadse" => cmd.aopcadse.map(ParamValue::Int),
        "aopcadsd" => cmd.aopcadsd.map(ParamValue::Int),
        "id" => cmd.id.map(ParamValue::Int),
        "pos" => cmd.pos.map(ParamValue::Int),
        _ => None,
    }
}

/// Case-insensitive comparison of a command value against a filter value
/// (string comparison uppercases both sides).
fn values_match(have: &ParamValue, want: &ParamValue) -> bool {
    match (have, want) {
        (ParamValue::Str(a), ParamValue::Str(b)) => a.eq_ignore_ascii_case(b),
        (a, b) => a == b,
    }
}

/// The loaded archive: all commands plus the shared parameter dictionary.
#[derive(Debug)]
pub struct Archive {
    cmds: Vec<Cmd>,
    pars: Arc<ParsDict>,
}

impl Archive {
    pub fn load(commands: &Path, params: &Path) -> Result<Self, CmdsError> {
        let text = std::fs::read_to_string(commands).map_err(|e| CmdsError::Io {
            path: commands.to_path_buf(),
            source: e,
        })?;
        let cmds: Vec<Cmd> = serde_json::from_str(&text).map_err(|e| CmdsError::Json {
            path: commands.to_path_buf(),
            source: e,
        })?;
        let pars = Arc::new(ParsDict::load(params)?);
        info!(
            target: "cmds",
            n_cmds = cmds.len(),
            n_pars = pars.len(),
            "archive_loaded"
        );
        Ok(Self::new(cmds, pars))
    }

    pub fn new(cmds: Vec<Cmd>, pars: Arc<ParsDict>) -> Self {
        Self { cmds, pars }
    }

    pub fn pars(&self) -> &Arc<ParsDict> {
        &self.pars
    }

    /// Commands with `start <= date < stop` matching every attribute
    /// predicate. Keys are matched case-insensitively; string values are
    /// uppercased. Keys outside the flat column set select by
    /// parameter-dictionary scan.
    pub fn filter(
        &self,
        start: Option<&str>,
        stop: Option<&str>,
        attrs: &[(&str, ParamValue)],
    ) -> Result<CommandTable, CmdsError> {
        let start = start.map(Date::parse).transpose()?;
        let stop = stop.map(Date::parse).transpose()?;

        let mut ok: Vec<bool> = self
            .cmds
            .iter()
            .map(|cmd| {
                start
                    .as_ref()
                    .is_none_or(|d| cmd.date.as_str() >= d.as_str())
                    && stop.as_ref().is_none_or(|d| cmd.date.as_str() < d.as_str())
            })
            .collect();

        for (key, val) in attrs {
            let key = key.to_lowercase();
            let val = val.clone().uppercased();
            if is_flat_column(&key) {
                for (i, cmd) in self.cmds.iter().enumerate() {
                    if ok[i] {
                        // Per-type Option columns may be unset on the row but
                        // present in the parameter tuple.
                        let have = flat_value(cmd, &key)
                            .or_else(|| self.pars.param(cmd.idx, &key).cloned());
                        ok[i] = have.is_some_and(|have| values_match(&have, &val));
                    }
                }
            } else {
                // Fallback: select idx values whose parameter tuple matches,
                // then keep commands with those idxs.
                let idxs: HashSet<u32> = self.pars.scan(&key, &val).into_iter().collect();
                for (i, cmd) in self.cmds.iter().enumerate() {
                    if ok[i] {
                        ok[i] = idxs.contains(&cmd.idx);
                    }
                }
            }
        }

        let cmds = self
            .cmds
            .iter()
            .zip(&ok)
            .filter(|(_, keep)| **keep)
            .map(|(cmd, _)| cmd.clone())
            .collect();
        Ok(CommandTable::new(cmds, self.pars.clone()))
    }
}

static ARCHIVE: OnceLock<Arc<Archive>> = OnceLock::new();

/// Install the process-wide archive. First caller wins; the installed
/// archive is returned either way.
pub fn init_archive(archive: Archive) -> Arc<Archive> {
    ARCHIVE.get_or_init(|| Arc::new(archive)).clone()
}

/// The process-wide archive, loading it on first access from the paths in
/// the discovered configuration.
pub fn global_archive() -> Result<Arc<Archive>, CmdsError> {
    if let Some(archive) = ARCHIVE.get() {
        return Ok(archive.clone());
    }
    let cfg = core_config::load_from(None).unwrap_or_default();
    let archive = Archive::load(&cfg.file.archive.commands, &cfg.file.archive.params)?;
    Ok(init_archive(archive))
}

/// Filter the process-wide archive; see [`Archive::filter`].
pub fn filter(
    start: Option<&str>,
    stop: Option<&str>,
    attrs: &[(&str, ParamValue)],
) -> Result<CommandTable, CmdsError> {
    global_archive()?.filter(start, stop, attrs)
}
