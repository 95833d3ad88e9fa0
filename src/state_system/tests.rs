// Tests for the in-memory attribute store

use super::*;

#[test]
fn test_paths_resolve_to_stable_quarks() {
    let mut ss = StateSystem::new(0);
    let a = ss.quark_absolute_and_add(&["TID", "42", "FDTBL"]);
    let b = ss.quark_absolute_and_add(&["TID", "42", "FDTBL"]);
    assert_eq!(a, b);

    let tid = ss.opt_quark_absolute(&["TID", "42"]).unwrap();
    assert_eq!(ss.opt_quark_relative(tid, "FDTBL"), Some(a));
    assert_eq!(ss.parent_attribute(a), Some(tid));
    assert_eq!(ss.attribute_name(a), "FDTBL");
    assert_eq!(ss.full_attribute_path(a), "TID/42/FDTBL");
    assert!(ss.opt_quark_absolute(&["TID", "43"]).is_none());
}

#[test]
fn test_resource_names_with_slashes_are_one_segment() {
    let mut ss = StateSystem::new(0);
    let q = ss.quark_absolute_and_add(&["RES", "/tmp/a", "42"]);
    assert_eq!(ss.attribute_name(q), "42");
    let res = ss.parent_attribute(q).unwrap();
    assert_eq!(ss.attribute_name(res), "/tmp/a");
}

#[test]
fn test_sub_attributes_in_creation_order() {
    let mut ss = StateSystem::new(0);
    let tbl = ss.quark_absolute_and_add(&["FDTBL", "0"]);
    let fd5 = ss.quark_relative_and_add(tbl, "5");
    let fd1 = ss.quark_relative_and_add(tbl, "1");
    let fd3 = ss.quark_relative_and_add(tbl, "3");
    assert_eq!(ss.sub_attributes(tbl), vec![fd5, fd1, fd3]);
}

#[test]
fn test_modify_builds_interval_history() {
    let mut ss = StateSystem::new(0);
    let q = ss.quark_absolute_and_add(&["x"]);
    ss.modify_attribute(10, StateValue::Long(1), q).unwrap();
    ss.modify_attribute(20, StateValue::Long(2), q).unwrap();
    ss.close_history(30);

    let history = ss.history(q);
    assert_eq!(
        history,
        vec![
            StateInterval { start: 0, end: 9, value: StateValue::Null },
            StateInterval { start: 10, end: 19, value: StateValue::Long(1) },
            StateInterval { start: 20, end: 30, value: StateValue::Long(2) },
        ]
    );
    assert_eq!(ss.query_value(15, q), StateValue::Long(1));
    assert_eq!(ss.query_value(30, q), StateValue::Long(2));
    assert_eq!(ss.query_value(31, q), StateValue::Null);
}

#[test]
fn test_same_value_is_not_a_new_interval() {
    let mut ss = StateSystem::new(0);
    let q = ss.quark_absolute_and_add(&["x"]);
    ss.modify_attribute(10, StateValue::Int(3), q).unwrap();
    ss.modify_attribute(20, StateValue::Int(3), q).unwrap();
    assert_eq!(ss.history(q).len(), 2);
}

#[test]
fn test_same_timestamp_replaces_ongoing() {
    let mut ss = StateSystem::new(0);
    let q = ss.quark_absolute_and_add(&["x"]);
    ss.modify_attribute(10, StateValue::Long(1), q).unwrap();
    ss.modify_attribute(10, StateValue::Long(2), q).unwrap();
    assert_eq!(ss.query_value(10, q), StateValue::Long(2));
    assert_eq!(ss.history(q).len(), 2);
}

#[test]
fn test_time_going_backwards_is_rejected() {
    let mut ss = StateSystem::new(0);
    let q = ss.quark_absolute_and_add(&["x"]);
    ss.modify_attribute(10, StateValue::Long(1), q).unwrap();
    let err = ss.modify_attribute(5, StateValue::Long(2), q).unwrap_err();
    assert!(matches!(err, StateSystemError::TimeOrder { time: 5, start: 10, .. }));
    assert_eq!(ss.query_ongoing(q), StateValue::Long(1));
}

#[test]
fn test_type_mismatch_is_rejected() {
    let mut ss = StateSystem::new(0);
    let q = ss.quark_absolute_and_add(&["FDTBL", "0", "5"]);
    ss.modify_attribute(1, StateValue::from("/tmp/a"), q).unwrap();
    let err = ss.modify_attribute(2, StateValue::Long(3), q).unwrap_err();
    assert_eq!(
        err,
        StateSystemError::TypeMismatch {
            attribute: "FDTBL/0/5".to_string(),
            expected: StateValueType::Str,
            found: StateValueType::Long,
        }
    );
    // Null is compatible with every type
    ss.modify_attribute(3, StateValue::Null, q).unwrap();
    ss.update_ongoing_state(StateValue::from("/tmp/b"), q).unwrap();
    assert!(ss.update_ongoing_state(StateValue::Int(1), q).is_err());
}

#[test]
fn test_update_ongoing_keeps_start() {
    let mut ss = StateSystem::new(0);
    let q = ss.quark_absolute_and_add(&["x"]);
    ss.modify_attribute(10, StateValue::Long(100), q).unwrap();
    ss.update_ongoing_state(StateValue::Long(60), q).unwrap();
    ss.modify_attribute(20, StateValue::Null, q).unwrap();
    assert_eq!(
        ss.query_single_state(12, q),
        Some(StateInterval { start: 10, end: 19, value: StateValue::Long(60) })
    );
}

#[test]
fn test_remove_attribute_is_recursive() {
    let mut ss = StateSystem::new(0);
    let fd = ss.quark_absolute_and_add(&["FDTBL", "0", "5"]);
    let read = ss.quark_relative_and_add(fd, "READ");
    let slot = ss.quark_relative_and_add(read, "0");
    ss.modify_attribute(1, StateValue::from("/tmp/a"), fd).unwrap();
    ss.modify_attribute(2, StateValue::Long(60), read).unwrap();
    ss.modify_attribute(2, StateValue::Long(60), slot).unwrap();

    ss.remove_attribute(5, fd).unwrap();

    for q in [fd, read, slot] {
        assert_eq!(ss.query_ongoing(q), StateValue::Null);
    }
    assert_eq!(ss.query_value(4, read), StateValue::Long(60));
}

#[test]
fn test_increment_attribute_long() {
    let mut ss = StateSystem::new(0);
    let q = ss.quark_absolute_and_add(&["TID", "1", "READ"]);
    ss.increment_attribute_long(5, q, 60).unwrap();
    ss.increment_attribute_long(8, q, 40).unwrap();
    assert_eq!(ss.query_ongoing(q), StateValue::Long(100));
    assert_eq!(ss.query_value(6, q), StateValue::Long(60));

    let name = ss.quark_absolute_and_add(&["FDTBL", "0", "1"]);
    ss.modify_attribute(1, StateValue::from("/tmp/a"), name).unwrap();
    assert!(matches!(
        ss.increment_attribute_long(2, name, 1),
        Err(StateSystemError::NotANumber { .. })
    ));
}

#[test]
fn test_increment_overflow_is_rejected() {
    let mut ss = StateSystem::new(0);
    let q = ss.quark_absolute_and_add(&["TID", "1", "WRITE"]);
    ss.modify_attribute(1, StateValue::Long(i64::MAX - 1), q).unwrap();
    assert!(matches!(
        ss.increment_attribute_long(2, q, 2),
        Err(StateSystemError::Overflow { delta: 2, .. })
    ));
    assert_eq!(ss.query_ongoing(q), StateValue::Long(i64::MAX - 1));
}

#[test]
fn test_query_outside_range() {
    let mut ss = StateSystem::new(100);
    let q = ss.quark_absolute_and_add(&["x"]);
    ss.modify_attribute(150, StateValue::Long(1), q).unwrap();
    assert!(ss.query_single_state(50, q).is_none());
    assert!(ss.query_single_state(151, q).is_none());
    assert_eq!(ss.query_value(150, q), StateValue::Long(1));
    assert!(ss.query_single_state(10, 9999).is_none());
    assert_eq!(ss.start_time(), 100);
    assert_eq!(ss.current_end_time(), 150);
}
