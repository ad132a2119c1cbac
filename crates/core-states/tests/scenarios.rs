//! End-to-end pipeline scenarios over literal command fixtures.

mod common;

use common::{pars_int, sw, table};
use core_cmds::{Cmd, CmdType};
use core_states::{
    DATE_FAR_FUTURE, StatesError, Value, get_state0_with, get_states_for_cmds, reduce_states,
};

#[test]
fn obsid_single_command() {
    let cmds = table(
        vec![Cmd::new("2020:001:00:00:00.000", CmdType::MpObsid).with_idx(42)],
        vec![pars_int(42, "id", 23456)],
    );
    let states = get_states_for_cmds(&cmds, Some(&["obsid"]), None).unwrap();

    assert_eq!(states.len(), 1);
    assert_eq!(states.datestart[0], "2020:001:00:00:00.000");
    assert_eq!(states.datestop[0], DATE_FAR_FUTURE);
    assert_eq!(states.value(0, "obsid").unwrap(), Some(&Value::Int(23456)));
}

#[test]
fn grating_insert_then_retract() {
    let t1 = "2020:001:01:00:00.000";
    let t2 = "2020:003:12:00:00.000";
    let cmds = table(vec![sw(t1, "4OHETGIN"), sw(t2, "4OHETGRE")], vec![]);
    let states = get_states_for_cmds(&cmds, Some(&["hetg"]), None).unwrap();

    assert_eq!(states.len(), 2);
    assert_eq!(states.datestart[0], t1);
    assert_eq!(states.datestop[0], t2);
    assert_eq!(states.datestart[1], t2);
    assert_eq!(states.datestop[1], DATE_FAR_FUTURE);
    assert_eq!(
        states.value(0, "hetg").unwrap(),
        Some(&Value::Str("INSR".into()))
    );
    assert_eq!(
        states.value(1, "hetg").unwrap(),
        Some(&Value::Str("RETR".into()))
    );
}

#[test]
fn acis_si_mode_from_wt_command() {
    let cmds = table(
        vec![Cmd::new("2020:001:00:00:00.000", CmdType::AcisPkt).with_tlmsid("WT00C62A")],
        vec![],
    );
    let states = get_states_for_cmds(&cmds, Some(&["si_mode"]), None).unwrap();
    assert_eq!(
        states.value(0, "si_mode").unwrap(),
        Some(&Value::Str("TE_00C62".into()))
    );
}

#[test]
fn spm_eclipse_enable_timing() {
    let mk_orb = |date: &str, event: &str| {
        Cmd::new(date, CmdType::OrbPoint).with_event_type(event)
    };

    // Battery connect 60 s before entry: ENAB at exit + 11 min.
    let cmds = table(
        vec![
            sw("2020:001:00:00:00.000", "EOESTECN"),
            mk_orb("2020:001:00:01:00.000", "PENTRY"),
            mk_orb("2020:001:00:33:20.000", "PEXIT"),
        ],
        vec![],
    );
    let states = get_states_for_cmds(&cmds, Some(&["sun_pos_mon"]), None).unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states.datestart[0], "2020:001:00:44:20.000");
    assert_eq!(
        states.value(0, "sun_pos_mon").unwrap(),
        Some(&Value::Str("ENAB".into()))
    );

    // Connect 130 s before entry: too early, no transition at all.
    let cmds = table(
        vec![
            sw("2020:001:00:00:00.000", "EOESTECN"),
            mk_orb("2020:001:00:02:10.000", "PENTRY"),
            mk_orb("2020:001:00:33:20.000", "PEXIT"),
        ],
        vec![],
    );
    let err = get_states_for_cmds(&cmds, Some(&["sun_pos_mon"]), None);
    assert!(matches!(err, Err(StatesError::NoTransitions { .. })));
}

#[test]
fn reduce_to_obsid_transitions() {
    // Five intervals via interleaved obsid and grating commands; obsid
    // sequence A A B B C.
    let cmds = table(
        vec![
            Cmd::new("2020:001:00:00:00.000", CmdType::MpObsid).with_idx(1),
            sw("2020:002:00:00:00.000", "4OHETGIN"),
            Cmd::new("2020:003:00:00:00.000", CmdType::MpObsid).with_idx(2),
            sw("2020:004:00:00:00.000", "4OHETGRE"),
            Cmd::new("2020:005:00:00:00.000", CmdType::MpObsid).with_idx(3),
        ],
        vec![
            pars_int(1, "id", 101),
            pars_int(2, "id", 102),
            pars_int(3, "id", 103),
        ],
    );
    let states = get_states_for_cmds(&cmds, Some(&["obsid", "hetg"]), None).unwrap();
    assert_eq!(states.len(), 5);

    let reduced = reduce_states(&states, &["obsid"]).unwrap();
    assert_eq!(reduced.len(), 3);
    let obsids: Vec<Option<&Value>> = (0..3)
        .map(|i| reduced.value(i, "obsid").unwrap())
        .collect();
    assert_eq!(
        obsids,
        vec![
            Some(&Value::Int(101)),
            Some(&Value::Int(102)),
            Some(&Value::Int(103)),
        ]
    );
    // Reduced intervals are re-stitched.
    assert_eq!(reduced.datestart[0], "2020:001:00:00:00.000");
    assert_eq!(reduced.datestop[0], "2020:003:00:00:00.000");
    assert_eq!(reduced.datestop[1], "2020:005:00:00:00.000");
    assert_eq!(reduced.datestop[2], DATE_FAR_FUTURE);
    // The grating column is gone.
    assert!(reduced.col("hetg").is_err());
}

#[test]
fn state0_lookback_expansion_and_failure() {
    use core_cmds::{Archive, ParsDict};
    use std::sync::Arc;

    // One grating command 100 days before the resolve date, nothing since.
    let now = "2020:200:00:00:00.000";
    let archive = Archive::new(
        vec![sw("2020:100:00:00:00.000", "4OHETGIN")],
        Arc::new(ParsDict::from_entries(vec![])),
    );

    // Lookbacks reaching 180 days find the INSR transition.
    let state0 = get_state0_with(
        &archive,
        Some(now),
        Some(&["hetg"]),
        Some(&[7.0, 30.0, 180.0]),
    )
    .unwrap();
    assert_eq!(state0.get("hetg"), Some(&Value::Str("INSR".into())));

    // Lookbacks capped at 30 days miss it and name the key and the cap.
    let err = get_state0_with(&archive, Some(now), Some(&["hetg"]), Some(&[7.0, 30.0]));
    match err {
        Err(StatesError::MissingState { keys, max_lookback, .. }) => {
            assert_eq!(keys, vec!["hetg".to_string()]);
            assert_eq!(max_lookback, 30.0);
        }
        other => panic!("expected MissingState, got {other:?}"),
    }
}

#[test]
fn state0_side_populates_coupled_keys() {
    use core_cmds::{Archive, ParsDict};
    use std::sync::Arc;

    // A pointing-mode command within the first lookback resolves pcad_mode
    // and (being PCAD-coupled) may fill more; obsid resolves independently.
    let archive = Archive::new(
        vec![
            Cmd::new("2020:195:00:00:00.000", CmdType::MpObsid).with_idx(1),
            sw("2020:196:00:00:00.000", "AONMMODE"),
        ],
        Arc::new(ParsDict::from_entries(vec![pars_int(1, "id", 55)])),
    );
    let state0 = get_state0_with(
        &archive,
        Some("2020:200:00:00:00.000"),
        Some(&["obsid", "pcad_mode"]),
        Some(&[7.0]),
    )
    .unwrap();
    assert_eq!(state0.get("obsid"), Some(&Value::Int(55)));
    assert_eq!(state0.get("pcad_mode"), Some(&Value::Str("NMAN".into())));
}
