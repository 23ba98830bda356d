use crate::calc::{self, MarkRecord, PerformanceBand};
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_str, get_required_array, get_required_str, list_roster, require_row,
    student_class_id, with_db,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

struct SubjectInfo {
    class_id: String,
    name: String,
    total_marks: Option<f64>,
}

fn load_subject(conn: &Connection, subject_id: &str) -> Result<SubjectInfo, HandlerErr> {
    conn.query_row(
        "SELECT class_id, name, total_marks FROM subjects WHERE id = ?",
        [subject_id],
        |r| {
            Ok(SubjectInfo {
                class_id: r.get(0)?,
                name: r.get(1)?,
                total_marks: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("subject not found"))
}

/// Name and class of an exam period.
fn load_exam(conn: &Connection, exam_id: &str) -> Result<(String, String), HandlerErr> {
    conn.query_row(
        "SELECT name, class_id FROM exam_months WHERE id = ?",
        [exam_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("exam not found"))
}

/// Every mark row recorded for one exam period.
pub(crate) fn load_exam_marks(conn: &Connection, exam_id: &str) -> Result<Vec<MarkRecord>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT student_id, subject_id, exam_month_id, marks_obtained, total_marks
         FROM marks
         WHERE exam_month_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([exam_id], mark_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every mark row recorded for one student across all exam periods.
pub(crate) fn load_student_marks(
    conn: &Connection,
    student_id: &str,
) -> Result<Vec<MarkRecord>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT student_id, subject_id, exam_month_id, marks_obtained, total_marks
         FROM marks
         WHERE student_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([student_id], mark_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn mark_record(r: &rusqlite::Row<'_>) -> rusqlite::Result<MarkRecord> {
    Ok(MarkRecord {
        student_id: r.get(0)?,
        subject_id: r.get(1)?,
        exam_period_id: r.get(2)?,
        marks_obtained: r.get(3)?,
        total_marks: r.get(4)?,
    })
}

fn marks_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let exam_id = get_required_str(params, "examMonthId")?;
    require_row(conn, "classes", "class", &class_id)?;
    let subject = load_subject(conn, &subject_id)?;
    if subject.class_id != class_id {
        return Err(HandlerErr::bad_params("subject does not belong to class"));
    }
    let (exam_name, _) = load_exam(conn, &exam_id)?;

    let mut stmt = conn.prepare(
        "SELECT student_id, marks_obtained
         FROM marks
         WHERE subject_id = ? AND exam_month_id = ?",
    )?;
    let existing: HashMap<String, Option<f64>> = stmt
        .query_map((&subject_id, &exam_id), |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;

    let students: Vec<serde_json::Value> = list_roster(conn, &class_id)?
        .into_iter()
        .map(|s| {
            let recorded = existing.get(&s.id);
            json!({
                "studentId": s.id,
                "name": s.name,
                "rollNumber": s.roll_number,
                "hasMark": recorded.is_some(),
                "marksObtained": recorded.copied().flatten(),
            })
        })
        .collect();

    Ok(json!({
        "subject": {
            "id": subject_id,
            "name": subject.name,
            "totalMarks": subject.total_marks.unwrap_or(calc::DEFAULT_TOTAL_MARKS),
        },
        "exam": { "id": exam_id, "name": exam_name },
        "students": students,
    }))
}

struct MarkEntry {
    student_id: String,
    marks_obtained: Option<f64>,
}

fn parse_mark_entries(
    entries: &[serde_json::Value],
    total: f64,
) -> Result<Vec<MarkEntry>, HandlerErr> {
    let mut out = Vec::with_capacity(entries.len());
    for (i, e) in entries.iter().enumerate() {
        let student_id = get_required_str(e, "studentId")
            .map_err(|err| err.with_details(json!({ "index": i })))?;
        let marks_obtained = match e.get("marksObtained") {
            None => {
                return Err(HandlerErr::bad_params("missing marksObtained")
                    .with_details(json!({ "index": i })))
            }
            Some(v) if v.is_null() => None,
            Some(v) => {
                let Some(n) = v.as_f64().filter(|n| n.is_finite()) else {
                    return Err(HandlerErr::bad_params("marksObtained must be a number or null")
                        .with_details(json!({ "index": i })));
                };
                if n < 0.0 || n > total {
                    return Err(HandlerErr::bad_params(format!(
                        "marksObtained must be between 0 and {}",
                        total
                    ))
                    .with_details(json!({ "index": i, "studentId": student_id })));
                }
                Some(n)
            }
        };
        out.push(MarkEntry {
            student_id,
            marks_obtained,
        });
    }
    Ok(out)
}

/// Upserts one subject's marks for an exam period. The whole batch is
/// rejected if any entry is out of range or names a student outside the
/// subject's class.
fn marks_save_batch(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_required_str(params, "subjectId")?;
    let exam_id = get_required_str(params, "examMonthId")?;
    let teacher_id = get_optional_str(params, "teacherId")?;
    let raw_entries = get_required_array(params, "entries")?;

    let subject = load_subject(conn, &subject_id)?;
    let (_, exam_class_id) = load_exam(conn, &exam_id)?;
    if exam_class_id != subject.class_id {
        return Err(HandlerErr::bad_params(
            "exam and subject belong to different classes",
        ));
    }
    if let Some(tid) = teacher_id.as_deref() {
        require_row(conn, "teachers", "teacher", tid)?;
    }
    let total = subject.total_marks.unwrap_or(calc::DEFAULT_TOTAL_MARKS);
    let entries = parse_mark_entries(raw_entries, total)?;

    let enrolled: HashSet<String> = list_roster(conn, &subject.class_id)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    if let Some(bad) = entries.iter().find(|e| !enrolled.contains(&e.student_id)) {
        return Err(HandlerErr::bad_params("student is not enrolled in the subject's class")
            .with_details(json!({ "studentId": bad.student_id })));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let now = db::now_ts();
    for e in &entries {
        tx.execute(
            "INSERT INTO marks(id, student_id, subject_id, exam_month_id, marks_obtained, total_marks, teacher_id, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, subject_id, exam_month_id) DO UPDATE SET
               marks_obtained = excluded.marks_obtained,
               total_marks = excluded.total_marks,
               teacher_id = excluded.teacher_id,
               updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                &e.student_id,
                &subject_id,
                &exam_id,
                e.marks_obtained,
                total,
                &teacher_id,
                &now,
                &now,
            ),
        )
        .map_err(|err| HandlerErr::db_write("db_update_failed", "marks", err))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    log::info!(
        "saved {} marks for subject {} exam {}",
        entries.len(),
        subject_id,
        exam_id
    );
    Ok(json!({ "saved": entries.len() }))
}

/// Subject-wise marks for one student, optionally limited to one exam period,
/// plus the overall total computed the same way rankings are.
fn marks_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let exam_id = get_optional_str(params, "examMonthId")?;
    student_class_id(conn, &student_id)?;

    let mut stmt = conn.prepare(
        "SELECT m.subject_id, s.name, m.exam_month_id, e.name, m.marks_obtained, m.total_marks
         FROM marks m
         LEFT JOIN subjects s ON s.id = m.subject_id
         LEFT JOIN exam_months e ON e.id = m.exam_month_id
         WHERE m.student_id = ?1 AND (?2 IS NULL OR m.exam_month_id = ?2)
         ORDER BY e.created_at DESC, s.name",
    )?;
    let rows = stmt
        .query_map((&student_id, &exam_id), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<f64>>(4)?,
                r.get::<_, Option<f64>>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut records: Vec<MarkRecord> = Vec::with_capacity(rows.len());
    let mut out_rows: Vec<serde_json::Value> = Vec::with_capacity(rows.len());
    for (subject_id, subject_name, row_exam_id, exam_name, obtained, total) in rows {
        let pct = calc::subject_percentage(obtained, total);
        out_rows.push(json!({
            "subjectId": subject_id,
            "subjectName": subject_name,
            "examMonthId": row_exam_id,
            "examName": exam_name,
            "marksObtained": obtained,
            "totalMarks": total.unwrap_or(calc::DEFAULT_TOTAL_MARKS),
            "percentage": pct,
            "band": PerformanceBand::from_percentage(pct),
        }));
        records.push(MarkRecord {
            student_id: student_id.clone(),
            subject_id,
            exam_period_id: row_exam_id,
            marks_obtained: obtained,
            total_marks: total,
        });
    }

    let overall = calc::compute_totals(&records)
        .into_iter()
        .next()
        .unwrap_or_else(|| calc::StudentTotal::empty(student_id.clone()));

    Ok(json!({
        "studentId": student_id,
        "marks": out_rows,
        "overall": overall,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.open" => Some(with_db(state, req, marks_open)),
        "marks.saveBatch" => Some(with_db(state, req, marks_save_batch)),
        "marks.student" => Some(with_db(state, req, marks_student)),
        _ => None,
    }
}
