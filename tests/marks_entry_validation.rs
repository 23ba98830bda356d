mod support;

use serde_json::json;
use support::{add_student, class_with_subjects, save_marks, Sidecar};

#[test]
fn out_of_range_batches_are_rejected_whole() {
    let (mut sidecar, workspace) = Sidecar::with_workspace("schoold-marks-range");
    let fx = class_with_subjects(&mut sidecar, &[("Science", 50.0)]);
    let a = add_student(&mut sidecar, &fx.class_id, "A", "1");
    let b = add_student(&mut sidecar, &fx.class_id, "B", "2");

    for bad in [json!(51), json!(-1), json!("forty")] {
        let code = sidecar.call_err(
            "marks.saveBatch",
            json!({
                "subjectId": fx.subject_ids[0],
                "examMonthId": fx.exam_id,
                "entries": [
                    { "studentId": a, "marksObtained": 30 },
                    { "studentId": b, "marksObtained": bad },
                ],
            }),
        );
        assert_eq!(code, "bad_params");
    }

    let open = sidecar.call(
        "marks.open",
        json!({ "classId": fx.class_id, "subjectId": fx.subject_ids[0], "examMonthId": fx.exam_id }),
    );
    assert_eq!(open["subject"]["totalMarks"].as_f64(), Some(50.0));
    for s in open["students"].as_array().expect("students") {
        assert_eq!(s["hasMark"].as_bool(), Some(false), "partial batch saved: {}", s);
    }

    // The upper bound is inclusive.
    let saved = save_marks(
        &mut sidecar,
        &fx.subject_ids[0],
        &fx.exam_id,
        json!([{ "studentId": a, "marksObtained": 50 }]),
    );
    assert_eq!(saved["saved"].as_u64(), Some(1));

    drop(sidecar);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn marks_for_students_outside_the_class_are_refused() {
    let (mut sidecar, workspace) = Sidecar::with_workspace("schoold-marks-enrolment");
    let fx = class_with_subjects(&mut sidecar, &[("Maths", 100.0)]);
    let other = class_with_subjects(&mut sidecar, &[("History", 100.0)]);
    let outsider = add_student(&mut sidecar, &other.class_id, "Outsider", "1");

    let code = sidecar.call_err(
        "marks.saveBatch",
        json!({
            "subjectId": fx.subject_ids[0],
            "examMonthId": fx.exam_id,
            "entries": [{ "studentId": outsider, "marksObtained": 70 }],
        }),
    );
    assert_eq!(code, "bad_params");

    // Exam and subject from different classes.
    let code = sidecar.call_err(
        "marks.saveBatch",
        json!({
            "subjectId": fx.subject_ids[0],
            "examMonthId": other.exam_id,
            "entries": [],
        }),
    );
    assert_eq!(code, "bad_params");

    drop(sidecar);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn absent_marks_count_as_zero_of_the_total() {
    let (mut sidecar, workspace) = Sidecar::with_workspace("schoold-marks-absent");
    let fx = class_with_subjects(&mut sidecar, &[("Maths", 100.0), ("Science", 50.0)]);
    let s = add_student(&mut sidecar, &fx.class_id, "Absent Once", "1");

    save_marks(
        &mut sidecar,
        &fx.subject_ids[0],
        &fx.exam_id,
        json!([{ "studentId": s, "marksObtained": 90 }]),
    );
    save_marks(
        &mut sidecar,
        &fx.subject_ids[1],
        &fx.exam_id,
        json!([{ "studentId": s, "marksObtained": null }]),
    );

    let res = sidecar.call("marks.student", json!({ "studentId": s, "examMonthId": fx.exam_id }));
    assert_eq!(res["overall"]["totalObtained"].as_f64(), Some(90.0));
    assert_eq!(res["overall"]["totalPossible"].as_f64(), Some(150.0));
    assert_eq!(res["overall"]["percentage"].as_f64(), Some(60.0));

    let rows = res["marks"].as_array().expect("marks rows");
    let maths = rows
        .iter()
        .find(|r| r["subjectName"].as_str() == Some("Maths"))
        .expect("maths row");
    assert_eq!(maths["percentage"].as_i64(), Some(90));
    assert_eq!(maths["band"].as_str(), Some("good"));
    let science = rows
        .iter()
        .find(|r| r["subjectName"].as_str() == Some("Science"))
        .expect("science row");
    assert!(science["marksObtained"].is_null());
    assert_eq!(science["band"].as_str(), Some("poor"));

    // Resaving overwrites instead of duplicating.
    save_marks(
        &mut sidecar,
        &fx.subject_ids[1],
        &fx.exam_id,
        json!([{ "studentId": s, "marksObtained": 25 }]),
    );
    let res = sidecar.call("marks.student", json!({ "studentId": s }));
    assert_eq!(res["marks"].as_array().map(|v| v.len()), Some(2));
    assert_eq!(res["overall"]["totalObtained"].as_f64(), Some(115.0));
    assert_eq!(res["overall"]["percentage"].as_f64(), Some(76.7));

    drop(sidecar);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn subject_totals_are_bounded() {
    let (mut sidecar, workspace) = Sidecar::with_workspace("schoold-marks-total-bound");
    let class = sidecar.call("classes.create", json!({ "name": "Grade 7" }));

    for total in [json!(1e308), json!(10001), json!(0), json!(-5)] {
        let code = sidecar.call_err(
            "subjects.create",
            json!({ "classId": class["classId"], "name": "Huge", "totalMarks": total }),
        );
        assert_eq!(code, "bad_params", "accepted totalMarks {}", total);
    }
    let subject = sidecar.call(
        "subjects.create",
        json!({ "classId": class["classId"], "name": "Project", "totalMarks": 10000 }),
    );
    let subject_id = subject["subjectId"].as_str().expect("subjectId").to_string();
    assert_eq!(
        sidecar.call_err(
            "subjects.update",
            json!({ "subjectId": subject_id, "patch": { "totalMarks": 1e308 } }),
        ),
        "bad_params"
    );
    assert_eq!(
        sidecar.call_err(
            "settings.update",
            json!({ "patch": { "defaultTotalMarks": 1e308 } }),
        ),
        "bad_params"
    );

    drop(sidecar);
    let _ = std::fs::remove_dir_all(workspace);
}
