//! The transition-rule roster.
//!
//! Three shapes cover almost every rule: single-fixed (command match writes
//! one fixed key/value), param-driven (copy one command parameter into a
//! key), and custom rules that write several keys or emit deferred updates.
//! `register_all` lists them in the order that defines the global state-key
//! ordering.

use tracing::warn;

use core_cmds::{CmdType, CommandTable};
use core_time::Date;

use crate::power::decode_power;
use crate::registry::{Registry, TransitionRule};
use crate::transitions::{DeferredKind, TransitionMap, Update};
use crate::{StatesError, Value};

pub const QUAT_COMPS: [&str; 4] = ["q1", "q2", "q3", "q4"];

/// PCAD-coupled keys: requesting any of these requires processing all of
/// them to get a correct answer.
pub const PCAD_STATE_KEYS: &[&str] = &[
    "q1",
    "q2",
    "q3",
    "q4",
    "targ_q1",
    "targ_q2",
    "targ_q3",
    "targ_q4",
    "ra",
    "dec",
    "roll",
    "auto_npnt",
    "pcad_mode",
    "pitch",
    "off_nom_roll",
];

/// On match, write one fixed `(key, value)` at the command date.
struct SingleFixedRule {
    name: &'static str,
    attrs: &'static [(&'static str, &'static str)],
    params: &'static [(&'static str, i64)],
    state_keys: &'static [&'static str],
    key: &'static str,
    val: &'static str,
}

impl TransitionRule for SingleFixedRule {
    fn name(&self) -> &'static str {
        self.name
    }
    fn state_keys(&self) -> &'static [&'static str] {
        self.state_keys
    }
    fn command_attributes(&self) -> &'static [(&'static str, &'static str)] {
        self.attrs
    }
    fn command_params(&self) -> &'static [(&'static str, i64)] {
        self.params
    }

    fn set_transitions(
        &self,
        map: &mut TransitionMap,
        cmds: &CommandTable,
    ) -> Result<(), StatesError> {
        for row in self.state_changing_commands(cmds).iter() {
            map.set_value(row.date(), self.key, Value::Str(self.val.to_string()));
        }
        Ok(())
    }
}

/// On match, copy one named command parameter into a state key.
struct ParamRule {
    name: &'static str,
    attrs: &'static [(&'static str, &'static str)],
    state_keys: &'static [&'static str],
    key: &'static str,
    param_key: &'static str,
}

impl TransitionRule for ParamRule {
    fn name(&self) -> &'static str {
        self.name
    }
    fn state_keys(&self) -> &'static [&'static str] {
        self.state_keys
    }
    fn command_attributes(&self) -> &'static [(&'static str, &'static str)] {
        self.attrs
    }

    fn set_transitions(
        &self,
        map: &mut TransitionMap,
        cmds: &CommandTable,
    ) -> Result<(), StatesError> {
        for row in self.state_changing_commands(cmds).iter() {
            match row.get(self.param_key) {
                Some(val) => map.set_value(row.date(), self.key, val),
                None => warn!(
                    target: "states",
                    rule = self.name,
                    date = row.date(),
                    param = self.param_key,
                    "missing_command_param"
                ),
            }
        }
        Ok(())
    }
}

/// `MP_DITHER`/`AODITPAR`: convert the six dither fields into phase (deg),
/// amplitude (arcsec) and period (s) per axis.
struct DitherParamsRule;

impl TransitionRule for DitherParamsRule {
    fn name(&self) -> &'static str {
        "dither_params"
    }
    fn state_keys(&self) -> &'static [&'static str] {
        &[
            "dither_phase_pitch",
            "dither_phase_yaw",
            "dither_ampl_pitch",
            "dither_ampl_yaw",
            "dither_period_pitch",
            "dither_period_yaw",
        ]
    }
    fn command_attributes(&self) -> &'static [(&'static str, &'static str)] {
        &[("type", "MP_DITHER"), ("tlmsid", "AODITPAR")]
    }

    fn set_transitions(
        &self,
        map: &mut TransitionMap,
        cmds: &CommandTable,
    ) -> Result<(), StatesError> {
        for row in self.state_changing_commands(cmds).iter() {
            let cmd = row.cmd();
            let (Some(angp), Some(angy), Some(coefp), Some(coefy), Some(ratep), Some(ratey)) =
                (cmd.angp, cmd.angy, cmd.coefp, cmd.coefy, cmd.ratep, cmd.ratey)
            else {
                warn!(target: "states", date = row.date(), "dither_cmd_missing_fields");
                continue;
            };
            let date = row.date();
            map.set_value(date, "dither_phase_pitch", Value::Float(angp.to_degrees()));
            map.set_value(date, "dither_phase_yaw", Value::Float(angy.to_degrees()));
            map.set_value(
                date,
                "dither_ampl_pitch",
                Value::Float(coefp.to_degrees() * 3600.0),
            );
            map.set_value(
                date,
                "dither_ampl_yaw",
                Value::Float(coefy.to_degrees() * 3600.0),
            );
            map.set_value(
                date,
                "dither_period_pitch",
                Value::Float(2.0 * std::f64::consts::PI / ratep),
            );
            map.set_value(
                date,
                "dither_period_yaw",
                Value::Float(2.0 * std::f64::consts::PI / ratey),
            );
        }
        Ok(())
    }
}

/// `MP_TARGQUAT`: copy the commanded quaternion into the target attitude.
struct TargQuatRule;

impl TransitionRule for TargQuatRule {
    fn name(&self) -> &'static str {
        "targ_quat"
    }
    fn state_keys(&self) -> &'static [&'static str] {
        PCAD_STATE_KEYS
    }
    fn command_attributes(&self) -> &'static [(&'static str, &'static str)] {
        &[("type", "MP_TARGQUAT")]
    }

    fn set_transitions(
        &self,
        map: &mut TransitionMap,
        cmds: &CommandTable,
    ) -> Result<(), StatesError> {
        for row in self.state_changing_commands(cmds).iter() {
            let cmd = row.cmd();
            let quats = [
                ("targ_q1", cmd.q1),
                ("targ_q2", cmd.q2),
                ("targ_q3", cmd.q3),
                ("targ_q4", cmd.q4),
            ];
            if quats.iter().any(|(_, q)| q.is_none()) {
                warn!(target: "states", date = row.date(), "targquat_cmd_missing_quat");
                continue;
            }
            for (key, q) in quats {
                map.set_value(row.date(), key, Value::Float(q.unwrap()));
            }
        }
        Ok(())
    }
}

/// `AOMANUVR`: defer to the fold, which expands the maneuver into per-leg
/// attitude transitions.
struct ManeuverRule;

impl TransitionRule for ManeuverRule {
    fn name(&self) -> &'static str {
        "maneuver"
    }
    fn state_keys(&self) -> &'static [&'static str] {
        PCAD_STATE_KEYS
    }
    fn command_attributes(&self) -> &'static [(&'static str, &'static str)] {
        &[("type", "COMMAND_SW"), ("tlmsid", "AOMANUVR")]
    }

    fn set_transitions(
        &self,
        map: &mut TransitionMap,
        cmds: &CommandTable,
    ) -> Result<(), StatesError> {
        for row in self.state_changing_commands(cmds).iter() {
            map.set(
                row.date(),
                "maneuver",
                Update::Deferred(DeferredKind::Maneuver {
                    cmd: row.cmd().clone(),
                }),
            );
        }
        Ok(())
    }
}

/// `AONSMSAF`: safing transition to normal-sun mode, deferred like a
/// maneuver but targeting the sun-pointed attitude.
struct NormalSunRule;

impl TransitionRule for NormalSunRule {
    fn name(&self) -> &'static str {
        "normal_sun"
    }
    fn state_keys(&self) -> &'static [&'static str] {
        PCAD_STATE_KEYS
    }
    fn command_attributes(&self) -> &'static [(&'static str, &'static str)] {
        &[("type", "COMMAND_SW"), ("tlmsid", "AONSMSAF")]
    }

    fn set_transitions(
        &self,
        map: &mut TransitionMap,
        cmds: &CommandTable,
    ) -> Result<(), StatesError> {
        for row in self.state_changing_commands(cmds).iter() {
            map.set(
                row.date(),
                "maneuver",
                Update::Deferred(DeferredKind::NormalSun {
                    cmd: row.cmd().clone(),
                }),
            );
        }
        Ok(())
    }
}

/// Automatic sun-position-monitor enable 11 minutes after eclipse exit, but
/// only when the battery-connect command landed within 2:05 of eclipse
/// entry.
struct SpmEclipseEnableRule;

impl TransitionRule for SpmEclipseEnableRule {
    fn name(&self) -> &'static str {
        "spm_eclipse_enable"
    }
    fn state_keys(&self) -> &'static [&'static str] {
        &["sun_pos_mon"]
    }
    fn command_attributes(&self) -> &'static [(&'static str, &'static str)] {
        // Selection needs two command families; done in set_transitions.
        &[]
    }

    fn set_transitions(
        &self,
        map: &mut TransitionMap,
        cmds: &CommandTable,
    ) -> Result<(), StatesError> {
        let subset = cmds.filtered(|row| {
            row.tlmsid() == Some("EOESTECN") || row.cmd().cmd_type == CmdType::OrbPoint
        });

        let mut connect_time = 0.0;
        let mut connect_flag = false;

        for row in subset.iter() {
            if row.tlmsid() == Some("EOESTECN") {
                connect_time = Date::parse(row.date())?.secs();
            } else if row.cmd().cmd_type == CmdType::OrbPoint {
                match row.cmd().event_type.as_deref() {
                    Some("PENTRY") | Some("LSPENTRY") => {
                        let entry_time = Date::parse(row.date())?.secs();
                        connect_flag = entry_time - connect_time < 125.0;
                    }
                    Some("PEXIT") | Some("LSPEXIT") if connect_flag => {
                        let enab_date = Date::parse(row.date())?.add_secs(11.0 * 60.0);
                        map.set_value(
                            enab_date.as_str(),
                            "sun_pos_mon",
                            Value::Str("ENAB".to_string()),
                        );
                        connect_flag = false;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

/// `ACISPKT`: dispatch on tlmsid into the ACIS configuration keys.
struct AcisRule;

impl TransitionRule for AcisRule {
    fn name(&self) -> &'static str {
        "acis"
    }
    fn state_keys(&self) -> &'static [&'static str] {
        &[
            "clocking",
            "power_cmd",
            "vid_board",
            "fep_count",
            "si_mode",
            "ccd_count",
        ]
    }
    fn command_attributes(&self) -> &'static [(&'static str, &'static str)] {
        &[("type", "ACISPKT")]
    }

    fn set_transitions(
        &self,
        map: &mut TransitionMap,
        cmds: &CommandTable,
    ) -> Result<(), StatesError> {
        for row in self.state_changing_commands(cmds).iter() {
            let Some(tlmsid) = row.tlmsid() else {
                continue;
            };
            let date = row.date();

            if tlmsid.starts_with("WSPOW") {
                let pwr = decode_power(tlmsid)?;
                map.set_value(date, "fep_count", Value::Int(pwr.fep_count));
                map.set_value(date, "ccd_count", Value::Int(pwr.ccd_count));
                map.set_value(date, "vid_board", Value::Int(pwr.vid_board));
                map.set_value(date, "clocking", Value::Int(pwr.clocking));
                map.set_value(date, "power_cmd", Value::Str(tlmsid.to_string()));
            } else if tlmsid == "XCZ0000005" || tlmsid == "XTZ0000005" {
                map.set_value(date, "clocking", Value::Int(1));
                map.set_value(date, "power_cmd", Value::Str(tlmsid.to_string()));
            } else if tlmsid == "WSVIDALLDN" {
                map.set_value(date, "vid_board", Value::Int(0));
                map.set_value(date, "power_cmd", Value::Str(tlmsid.to_string()));
            } else if tlmsid == "AA00000000" {
                map.set_value(date, "clocking", Value::Int(0));
                map.set_value(date, "power_cmd", Value::Str(tlmsid.to_string()));
            } else if tlmsid == "WSFEPALLUP" {
                map.set_value(date, "fep_count", Value::Int(6));
                map.set_value(date, "power_cmd", Value::Str(tlmsid.to_string()));
            } else if tlmsid.starts_with("WC") {
                match tlmsid.get(2..7) {
                    Some(mode) => {
                        map.set_value(date, "si_mode", Value::Str(format!("CC_{mode}")))
                    }
                    None => warn!(target: "states", tlmsid, "short_acis_cc_tlmsid"),
                }
            } else if tlmsid.starts_with("WT") {
                match tlmsid.get(2..7) {
                    Some(mode) => {
                        map.set_value(date, "si_mode", Value::Str(format!("TE_{mode}")))
                    }
                    None => warn!(target: "states", tlmsid, "short_acis_te_tlmsid"),
                }
            }
        }
        Ok(())
    }
}

/// Register every rule. Order matters: it fixes the global state-key
/// ordering and the per-date update ordering.
pub(crate) fn register_all(reg: &mut Registry) {
    // Mechanisms.
    reg.register(Box::new(SingleFixedRule {
        name: "hetg_insr",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "4OHETGIN")],
        params: &[],
        state_keys: &["hetg"],
        key: "hetg",
        val: "INSR",
    }));
    reg.register(Box::new(SingleFixedRule {
        name: "hetg_retr",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "4OHETGRE")],
        params: &[],
        state_keys: &["hetg"],
        key: "hetg",
        val: "RETR",
    }));
    reg.register(Box::new(SingleFixedRule {
        name: "letg_insr",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "4OLETGIN")],
        params: &[],
        state_keys: &["letg"],
        key: "letg",
        val: "INSR",
    }));
    reg.register(Box::new(SingleFixedRule {
        name: "letg_retr",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "4OLETGRE")],
        params: &[],
        state_keys: &["letg"],
        key: "letg",
        val: "RETR",
    }));

    reg.register(Box::new(ParamRule {
        name: "sim_tsc",
        attrs: &[("type", "SIMTRANS")],
        state_keys: &["simpos"],
        key: "simpos",
        param_key: "pos",
    }));
    reg.register(Box::new(ParamRule {
        name: "sim_focus",
        attrs: &[("type", "SIMFOCUS")],
        state_keys: &["simfa_pos"],
        key: "simfa_pos",
        param_key: "pos",
    }));

    // OBC etc.
    reg.register(Box::new(ParamRule {
        name: "obsid",
        attrs: &[("type", "MP_OBSID")],
        state_keys: &["obsid"],
        key: "obsid",
        param_key: "id",
    }));
    reg.register(Box::new(SingleFixedRule {
        name: "spm_enable",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "AOFUNCEN")],
        params: &[("aopcadse", 30)],
        state_keys: &["sun_pos_mon"],
        key: "sun_pos_mon",
        val: "ENAB",
    }));
    reg.register(Box::new(SingleFixedRule {
        name: "spm_disable",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "AOFUNCDS")],
        params: &[("aopcadsd", 30)],
        state_keys: &["sun_pos_mon"],
        key: "sun_pos_mon",
        val: "DISA",
    }));
    reg.register(Box::new(SpmEclipseEnableRule));

    // PCAD.
    reg.register(Box::new(SingleFixedRule {
        name: "dither_enable",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "AOENDITH")],
        params: &[],
        state_keys: &["dither"],
        key: "dither",
        val: "ENAB",
    }));
    reg.register(Box::new(SingleFixedRule {
        name: "dither_disable",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "AODSDITH")],
        params: &[],
        state_keys: &["dither"],
        key: "dither",
        val: "DISA",
    }));
    reg.register(Box::new(DitherParamsRule));
    reg.register(Box::new(SingleFixedRule {
        name: "nmm",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "AONMMODE")],
        params: &[],
        state_keys: PCAD_STATE_KEYS,
        key: "pcad_mode",
        val: "NMAN",
    }));
    reg.register(Box::new(SingleFixedRule {
        name: "npm",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "AONPMODE")],
        params: &[],
        state_keys: PCAD_STATE_KEYS,
        key: "pcad_mode",
        val: "NPNT",
    }));
    reg.register(Box::new(SingleFixedRule {
        name: "auto_npm_enable",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "AONM2NPE")],
        params: &[],
        state_keys: PCAD_STATE_KEYS,
        key: "auto_npnt",
        val: "ENAB",
    }));
    reg.register(Box::new(SingleFixedRule {
        name: "auto_npm_disable",
        attrs: &[("type", "COMMAND_SW"), ("tlmsid", "AONM2NPD")],
        params: &[],
        state_keys: PCAD_STATE_KEYS,
        key: "auto_npnt",
        val: "DISA",
    }));
    reg.register(Box::new(TargQuatRule));
    reg.register(Box::new(ManeuverRule));
    reg.register(Box::new(NormalSunRule));

    // ACIS.
    reg.register(Box::new(AcisRule));
}
