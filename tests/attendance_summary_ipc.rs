mod support;

use serde_json::json;
use support::{add_student, class_with_subjects, Sidecar};

#[test]
fn overall_percentage_rounds_the_pooled_ratio() {
    let (mut sidecar, workspace) = Sidecar::with_workspace("schoold-attendance-overall");
    let fx = class_with_subjects(&mut sidecar, &[]);
    let s = add_student(&mut sidecar, &fx.class_id, "Regular", "1");
    let never = add_student(&mut sidecar, &fx.class_id, "Never Recorded", "2");

    for (month, present) in [("February", 20), ("january", 18)] {
        sidecar.call(
            "attendance.saveBatch",
            json!({
                "month": month,
                "year": "2025",
                "entries": [{ "studentId": s, "presentDays": present, "totalWorkingDays": 22 }],
            }),
        );
    }

    let res = sidecar.call("attendance.student", json!({ "studentId": s }));
    assert_eq!(res["overallPercentage"].as_i64(), Some(86));
    assert_eq!(res["totalPresent"].as_i64(), Some(38));
    assert_eq!(res["totalWorkingDays"].as_i64(), Some(44));
    assert_eq!(res["belowThreshold"].as_bool(), Some(false));

    let months: Vec<&str> = res["perMonth"]
        .as_array()
        .expect("perMonth")
        .iter()
        .map(|m| m["month"].as_str().expect("month"))
        .collect();
    assert_eq!(months, vec!["January", "February"]);
    assert_eq!(res["perMonth"][0]["percentage"].as_i64(), Some(82));

    let empty = sidecar.call("attendance.student", json!({ "studentId": never }));
    assert_eq!(empty["overallPercentage"].as_i64(), Some(0));
    assert_eq!(empty["perMonth"], json!([]));

    // Raising the warning threshold flags the same student.
    sidecar.call("settings.update", json!({ "patch": { "attendanceWarnPercent": 90 } }));
    let res = sidecar.call("attendance.student", json!({ "studentId": s }));
    assert_eq!(res["belowThreshold"].as_bool(), Some(true));

    let summary = sidecar.call(
        "attendance.classSummary",
        json!({ "classId": fx.class_id, "month": "January", "year": 2025 }),
    );
    assert_eq!(summary["recordedCount"].as_u64(), Some(1));
    assert_eq!(summary["overallPercentage"].as_i64(), Some(82));
    assert!(summary["students"][1]["percentage"].is_null());

    drop(sidecar);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn invalid_attendance_entries_are_rejected() {
    let (mut sidecar, workspace) = Sidecar::with_workspace("schoold-attendance-invalid");
    let fx = class_with_subjects(&mut sidecar, &[]);
    let s = add_student(&mut sidecar, &fx.class_id, "Someone", "1");

    let cases = vec![
        json!({ "month": "March", "year": 2025,
                "entries": [{ "studentId": s, "presentDays": 23, "totalWorkingDays": 22 }] }),
        json!({ "month": "March", "year": 2025,
                "entries": [{ "studentId": s, "presentDays": -1, "totalWorkingDays": 22 }] }),
        json!({ "month": "Smarch", "year": 2025,
                "entries": [{ "studentId": s, "presentDays": 1, "totalWorkingDays": 22 }] }),
        json!({ "month": "March", "year": 2025,
                "entries": [{ "studentId": "missing", "presentDays": 1, "totalWorkingDays": 22 }] }),
    ];
    for params in cases {
        let code = sidecar.call_err("attendance.saveBatch", params);
        assert!(code == "bad_params" || code == "not_found", "got {}", code);
    }

    let open = sidecar.call(
        "attendance.open",
        json!({ "classId": fx.class_id, "month": "March", "year": 2025 }),
    );
    assert!(open["students"][0]["presentDays"].is_null());

    drop(sidecar);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn day_counts_are_capped_at_a_calendar_month() {
    let (mut sidecar, workspace) = Sidecar::with_workspace("schoold-attendance-cap");
    let fx = class_with_subjects(&mut sidecar, &[]);
    let s = add_student(&mut sidecar, &fx.class_id, "Capped", "1");

    for (present, working) in [(i64::MAX, i64::MAX), (32, 32), (0, 32)] {
        let code = sidecar.call_err(
            "attendance.saveBatch",
            json!({
                "month": "May",
                "year": 2025,
                "entries": [{ "studentId": s, "presentDays": present, "totalWorkingDays": working }],
            }),
        );
        assert_eq!(code, "bad_params", "accepted {}/{}", present, working);
    }

    for month in ["May", "June"] {
        sidecar.call(
            "attendance.saveBatch",
            json!({
                "month": month,
                "year": 2025,
                "entries": [{ "studentId": s, "presentDays": 31, "totalWorkingDays": 31 }],
            }),
        );
    }

    // The sidecar must still answer after summing the stored months.
    let res = sidecar.call("attendance.student", json!({ "studentId": s }));
    assert_eq!(res["overallPercentage"].as_i64(), Some(100));
    assert_eq!(res["totalWorkingDays"].as_i64(), Some(62));
    let dash = sidecar.call("dashboard.student", json!({ "studentId": s }));
    assert_eq!(dash["attendancePercentage"].as_i64(), Some(100));

    drop(sidecar);
    let _ = std::fs::remove_dir_all(workspace);
}
