mod support;

use serde_json::json;
use support::{class_with_subjects, add_student, str_field, temp_dir, Sidecar};

#[test]
fn protocol_errors_keep_the_process_alive() {
    let mut sidecar = Sidecar::spawn();

    let bad = sidecar.send_raw("{not json");
    assert_eq!(bad.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(bad.pointer("/error/code").and_then(|v| v.as_str()), Some("bad_json"));

    assert_eq!(sidecar.call_err("grades.explode", json!({})), "not_implemented");
    assert_eq!(sidecar.call_err("students.create", json!({ "name": "x" })), "no_workspace");

    // List methods answer without a workspace.
    let classes = sidecar.call("classes.list", json!({}));
    assert_eq!(classes["classes"], json!([]));

    let health = sidecar.call("health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health["workspacePath"].is_null());
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (mut sidecar, workspace) = Sidecar::with_workspace("schoold-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");

    let health = sidecar.call("health", json!({}));
    assert_eq!(
        health["workspacePath"].as_str(),
        Some(workspace.to_string_lossy().as_ref())
    );

    let fx = class_with_subjects(&mut sidecar, &[("Maths", 100.0)]);
    let student_id = add_student(&mut sidecar, &fx.class_id, "Smoke Student", "1");
    let teacher = sidecar.call(
        "teachers.create",
        json!({
            "name": "Smoke Teacher",
            "assignedClassId": fx.class_id,
            "subjectIds": [fx.subject_ids[0]],
        }),
    );
    let teacher_id = str_field(&teacher, "teacherId");

    // Every call below must be routed to a handler; failures other than
    // not_implemented are acceptable here.
    let calls = vec![
        ("settings.get", json!({})),
        ("settings.update", json!({ "patch": { "schoolName": "Smoke School" } })),
        ("classes.list", json!({})),
        ("classes.update", json!({ "classId": fx.class_id, "patch": { "section": "B" } })),
        ("teachers.list", json!({})),
        ("teachers.get", json!({ "teacherId": teacher_id })),
        ("teachers.update", json!({ "teacherId": teacher_id, "patch": { "email": "t@example.org" } })),
        ("subjects.list", json!({ "classId": fx.class_id })),
        ("subjects.update", json!({ "subjectId": fx.subject_ids[0], "patch": { "name": "Mathematics" } })),
        ("students.list", json!({ "classId": fx.class_id })),
        ("students.get", json!({ "studentId": student_id })),
        ("students.update", json!({ "studentId": student_id, "patch": { "parentName": "P. Smoke" } })),
        ("exams.list", json!({ "classId": fx.class_id })),
        ("exams.update", json!({ "examMonthId": fx.exam_id, "patch": { "isActive": false } })),
        ("marks.open", json!({ "classId": fx.class_id, "subjectId": fx.subject_ids[0], "examMonthId": fx.exam_id })),
        ("marks.saveBatch", json!({
            "subjectId": fx.subject_ids[0],
            "examMonthId": fx.exam_id,
            "teacherId": teacher_id,
            "entries": [{ "studentId": student_id, "marksObtained": 71 }],
        })),
        ("marks.student", json!({ "studentId": student_id })),
        ("attendance.open", json!({ "classId": fx.class_id, "month": "March", "year": 2025 })),
        ("attendance.saveBatch", json!({
            "month": "March",
            "year": 2025,
            "entries": [{ "studentId": student_id, "presentDays": 20, "totalWorkingDays": 22 }],
        })),
        ("attendance.student", json!({ "studentId": student_id })),
        ("attendance.classSummary", json!({ "classId": fx.class_id, "month": "March", "year": 2025 })),
        ("rankings.class", json!({ "classId": fx.class_id, "examMonthId": fx.exam_id })),
        ("progress.student", json!({ "studentId": student_id })),
        ("dashboard.admin", json!({})),
        ("dashboard.teacher", json!({ "teacherId": teacher_id })),
        ("dashboard.student", json!({ "studentId": student_id })),
        ("backup.exportWorkspace", json!({ "outPath": bundle_out.to_string_lossy() })),
    ];
    for (method, params) in calls {
        let resp = sidecar.request(method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
    }

    let dest = temp_dir("schoold-router-smoke-restore");
    sidecar.call(
        "backup.importWorkspace",
        json!({ "inPath": bundle_out.to_string_lossy(), "workspacePath": dest.to_string_lossy() }),
    );

    // Importing elsewhere leaves the active workspace selected.
    let health = sidecar.call("health", json!({}));
    assert_eq!(
        health["workspacePath"].as_str(),
        Some(workspace.to_string_lossy().as_ref())
    );

    sidecar.call("exams.delete", json!({ "examMonthId": fx.exam_id }));
    sidecar.call("students.delete", json!({ "studentId": student_id }));
    sidecar.call("teachers.delete", json!({ "teacherId": teacher_id }));
    sidecar.call("subjects.delete", json!({ "subjectId": fx.subject_ids[0] }));
    sidecar.call("classes.delete", json!({ "classId": fx.class_id }));

    drop(sidecar);
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(dest);
}
