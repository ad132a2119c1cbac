//! Pipeline-level property tests: interval invariants, maneuver expansion,
//! reducer behavior, initial-state seeding.

mod common;

use common::{pars_int, sw, table};
use core_attitude::Quat;
use core_cmds::{Cmd, CmdType, CommandTable};
use core_states::{StateTable, Value, get_states_for_cmds, reduce_states};
use indexmap::IndexMap;

fn assert_monotonic(states: &StateTable) {
    for i in 0..states.len() {
        assert!(
            states.datestart[i] < states.datestop[i],
            "row {i}: {} !< {}",
            states.datestart[i],
            states.datestop[i]
        );
        if i + 1 < states.len() {
            assert_eq!(states.datestop[i], states.datestart[i + 1], "gap after row {i}");
        }
    }
}

fn quat_cmd(date: &str, q: &Quat) -> Cmd {
    Cmd::new(date, CmdType::MpTargquat).with_quat([q.q1, q.q2, q.q3, q.q4])
}

/// Mode setup, a first (null) maneuver to establish attitude, then a real
/// slew to a second target.
fn manvr_cmds(auto_npnt_tlmsid: &str) -> CommandTable {
    let targ1 = Quat::from_equatorial(10.0, 5.0, 0.0);
    let targ2 = Quat::from_equatorial(80.0, -30.0, 120.0);
    table(
        vec![
            sw("2020:010:00:00:00.000", "AONMMODE"),
            sw("2020:010:00:00:01.000", auto_npnt_tlmsid),
            quat_cmd("2020:010:00:00:02.000", &targ1),
            sw("2020:010:00:00:03.000", "AOMANUVR"),
            sw("2020:010:02:00:00.000", "AONMMODE"),
            quat_cmd("2020:010:02:00:01.000", &targ2),
            sw("2020:010:02:00:02.000", "AOMANUVR"),
        ],
        vec![],
    )
}

#[test]
fn maneuver_with_auto_npnt_ends_in_npnt() {
    let cmds = manvr_cmds("AONM2NPE");
    let states = get_states_for_cmds(&cmds, Some(&["pcad_mode"]), None).unwrap();

    assert_monotonic(&states);

    // Fold ends pointed at the second target, back in NPNT.
    assert_eq!(
        states.last_value("pcad_mode").unwrap(),
        Some(&Value::Str("NPNT".into()))
    );
    let targ2 = Quat::from_equatorial(80.0, -30.0, 120.0);
    for (key, expect) in [
        ("q1", targ2.q1),
        ("q2", targ2.q2),
        ("q3", targ2.q3),
        ("q4", targ2.q4),
    ] {
        let got = states
            .last_value(key)
            .unwrap()
            .and_then(|v| v.as_float())
            .unwrap();
        assert!((got - expect).abs() < 1e-9, "{key}: {got} vs {expect}");
    }

    // The slew from targ1 to targ2 is a large angle: it must have produced
    // intermediate attitude rows.
    assert!(states.len() > 10, "expected sampled maneuver legs");
}

#[test]
fn maneuver_with_auto_npnt_disabled_never_enters_npnt() {
    let cmds = manvr_cmds("AONM2NPD");
    let states = get_states_for_cmds(&cmds, Some(&["pcad_mode"]), None).unwrap();

    assert_monotonic(&states);
    let modes = states.col("pcad_mode").unwrap();
    assert!(
        modes
            .iter()
            .all(|m| m.as_ref().and_then(|v| v.as_str()) != Some("NPNT")),
        "NPNT must not appear with auto-transition disabled"
    );
    assert_eq!(
        states.last_value("pcad_mode").unwrap(),
        Some(&Value::Str("NMAN".into()))
    );
}

#[test]
fn dither_parameter_conversions() {
    use std::f64::consts::PI;

    let mut cmd = Cmd::new("2020:001:00:00:00.000", CmdType::MpDither).with_tlmsid("AODITPAR");
    cmd.angp = Some(PI);
    cmd.angy = Some(PI);
    // One degree of coefficient is 3600 arcsec of amplitude.
    cmd.coefp = Some(PI / 180.0);
    cmd.coefy = Some(PI / 180.0);
    cmd.ratep = Some(2.0 * PI);
    cmd.ratey = Some(2.0 * PI);

    let states =
        get_states_for_cmds(&table(vec![cmd], vec![]), Some(&["dither_ampl_pitch"]), None)
            .unwrap();
    let get = |key: &str| {
        states
            .value(0, key)
            .unwrap()
            .and_then(|v| v.as_float())
            .unwrap()
    };
    assert!((get("dither_phase_pitch") - 180.0).abs() < 1e-9);
    assert!((get("dither_phase_yaw") - 180.0).abs() < 1e-9);
    assert!((get("dither_ampl_pitch") - 3600.0).abs() < 1e-6);
    assert!((get("dither_ampl_yaw") - 3600.0).abs() < 1e-6);
    assert!((get("dither_period_pitch") - 1.0).abs() < 1e-9);
    assert!((get("dither_period_yaw") - 1.0).abs() < 1e-9);
}

#[test]
fn reducer_is_idempotent() {
    let cmds = table(
        vec![
            Cmd::new("2020:001:00:00:00.000", CmdType::MpObsid).with_idx(1),
            sw("2020:002:00:00:00.000", "4OHETGIN"),
            Cmd::new("2020:003:00:00:00.000", CmdType::MpObsid).with_idx(2),
            sw("2020:004:00:00:00.000", "4OHETGRE"),
        ],
        vec![pars_int(1, "id", 101), pars_int(2, "id", 102)],
    );
    let states = get_states_for_cmds(&cmds, Some(&["obsid", "hetg"]), None).unwrap();

    let once = reduce_states(&states, &["obsid"]).unwrap();
    let twice = reduce_states(&once, &["obsid"]).unwrap();

    assert_eq!(once.datestart, twice.datestart);
    assert_eq!(once.datestop, twice.datestop);
    assert_eq!(once.col("obsid").unwrap(), twice.col("obsid").unwrap());
    assert_monotonic(&once);
}

#[test]
fn reducer_with_constant_column_keeps_first_row() {
    let cmds = table(
        vec![
            Cmd::new("2020:001:00:00:00.000", CmdType::MpObsid).with_idx(1),
            sw("2020:002:00:00:00.000", "4OHETGIN"),
            sw("2020:004:00:00:00.000", "4OHETGRE"),
        ],
        vec![pars_int(1, "id", 101)],
    );
    let states = get_states_for_cmds(&cmds, Some(&["obsid", "hetg"]), None).unwrap();
    assert_eq!(states.len(), 3);

    // obsid never changes across the table: one full-range interval.
    let reduced = reduce_states(&states, &["obsid"]).unwrap();
    assert_eq!(reduced.len(), 1);
    assert_eq!(reduced.datestart[0], states.datestart[0]);
    assert_eq!(reduced.datestop[0], *states.datestop.last().unwrap());
}

#[test]
fn state0_seeds_first_row_and_ignores_unknown_keys() {
    let cmds = table(
        vec![Cmd::new("2020:005:00:00:00.000", CmdType::MpObsid).with_idx(1)],
        vec![pars_int(1, "id", 900)],
    );
    let mut state0 = IndexMap::new();
    state0.insert("hetg".to_string(), Value::Str("RETR".into()));
    state0.insert("not_a_key".to_string(), Value::Int(1));

    let states =
        get_states_for_cmds(&cmds, Some(&["obsid", "hetg"]), Some(&state0)).unwrap();
    assert_eq!(
        states.value(0, "hetg").unwrap(),
        Some(&Value::Str("RETR".into()))
    );
    assert_eq!(states.value(0, "obsid").unwrap(), Some(&Value::Int(900)));
    assert!(states.col("not_a_key").is_err());
}

#[test]
fn pcad_request_returns_full_cluster_columns() {
    let cmds = manvr_cmds("AONM2NPE");
    let states = get_states_for_cmds(&cmds, Some(&["q1"]), None).unwrap();
    for key in ["q1", "targ_q1", "ra", "dec", "roll", "pitch", "off_nom_roll", "pcad_mode"] {
        assert!(states.col(key).is_ok(), "missing PCAD column {key}");
    }
    // Non-PCAD keys are not dragged in.
    assert!(states.col("obsid").is_err());
}
