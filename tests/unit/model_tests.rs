//! Unit tests for task and parameter identifiers.

use kerbside::models::{BinColor, Offset, ParameterKey, TaskKey, TaskType};
use kerbside::AppError;

#[test]
fn task_names_are_color_then_type() {
    let names: Vec<String> = TaskKey::ALL.iter().map(ToString::to_string).collect();
    assert_eq!(
        names,
        ["red_put_out", "red_bring_in", "yellow_put_out", "yellow_bring_in"]
    );
}

#[test]
fn task_names_parse_back() {
    for key in TaskKey::ALL {
        assert_eq!(key.to_string().parse::<TaskKey>().expect("parse"), key);
    }
}

#[test]
fn unknown_task_is_not_found() {
    let err = "blue_put_out".parse::<TaskKey>().expect_err("unknown");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn parameter_names_carry_task_and_side() {
    let key = ParameterKey::new(
        TaskKey::new(BinColor::Yellow, TaskType::BringIn),
        Offset::Pre,
    );
    assert_eq!(key.to_string(), "yellow_bring_in_pre_hours");
    assert_eq!(
        "yellow_bring_in_pre_hours"
            .parse::<ParameterKey>()
            .expect("parse"),
        key
    );
}

#[test]
fn eight_distinct_parameters() {
    let mut names: Vec<String> = ParameterKey::ALL.iter().map(ToString::to_string).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 8);
}

#[test]
fn unknown_parameter_is_not_found() {
    let err = "red_put_out_hours".parse::<ParameterKey>().expect_err("unknown");
    assert_eq!(err.to_string(), "not found: unknown parameter: red_put_out_hours");
}

#[test]
fn default_hours_by_task_type() {
    assert_eq!(TaskType::PutOut.default_hours(), (6.0, 8.0));
    assert_eq!(TaskType::BringIn.default_hours(), (4.0, 5.0));
}
