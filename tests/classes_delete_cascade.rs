mod support;

use serde_json::json;
use support::{add_student, class_with_subjects, save_marks, str_field, Sidecar};

#[test]
fn deleting_a_class_removes_its_records_and_unassigns_teachers() {
    let (mut sidecar, workspace) = Sidecar::with_workspace("schoold-class-delete");
    let doomed = class_with_subjects(&mut sidecar, &[("Maths", 100.0)]);
    let kept = class_with_subjects(&mut sidecar, &[("English", 100.0)]);

    let s1 = add_student(&mut sidecar, &doomed.class_id, "Leaving", "1");
    let s2 = add_student(&mut sidecar, &kept.class_id, "Staying", "1");
    save_marks(
        &mut sidecar,
        &doomed.subject_ids[0],
        &doomed.exam_id,
        json!([{ "studentId": s1, "marksObtained": 70 }]),
    );
    save_marks(
        &mut sidecar,
        &kept.subject_ids[0],
        &kept.exam_id,
        json!([{ "studentId": s2, "marksObtained": 65 }]),
    );
    sidecar.call(
        "attendance.saveBatch",
        json!({
            "month": "April",
            "year": 2025,
            "entries": [{ "studentId": s1, "presentDays": 10, "totalWorkingDays": 20 }],
        }),
    );

    let teacher = sidecar.call(
        "teachers.create",
        json!({
            "name": "Ms. Rao",
            "assignedClassId": doomed.class_id,
            "subjectIds": [doomed.subject_ids[0], kept.subject_ids[0]],
        }),
    );
    let teacher_id = str_field(&teacher, "teacherId");

    sidecar.call("classes.delete", json!({ "classId": doomed.class_id }));

    let classes = sidecar.call("classes.list", json!({}));
    let ids: Vec<&str> = classes["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .map(|c| c["id"].as_str().expect("id"))
        .collect();
    assert_eq!(ids, vec![kept.class_id.as_str()]);

    assert_eq!(
        sidecar.call_err("students.get", json!({ "studentId": s1 })),
        "not_found"
    );
    assert_eq!(
        sidecar.call_err(
            "rankings.class",
            json!({ "classId": doomed.class_id, "examMonthId": doomed.exam_id })
        ),
        "not_found"
    );

    let profile = sidecar.call("teachers.get", json!({ "teacherId": teacher_id }));
    assert!(profile["teacher"]["assignedClassId"].is_null());
    let subjects = profile["teacher"]["subjects"].as_array().expect("subjects");
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0]["name"].as_str(), Some("English"));

    let res = sidecar.call(
        "rankings.class",
        json!({ "classId": kept.class_id, "examMonthId": kept.exam_id }),
    );
    assert_eq!(res["rankings"][0]["percentage"].as_f64(), Some(65.0));

    let dash = sidecar.call("dashboard.admin", json!({}));
    assert_eq!(dash["classCount"].as_i64(), Some(1));
    assert_eq!(dash["studentCount"].as_i64(), Some(1));
    assert_eq!(dash["teacherCount"].as_i64(), Some(1));

    drop(sidecar);
    let _ = std::fs::remove_dir_all(workspace);
}
