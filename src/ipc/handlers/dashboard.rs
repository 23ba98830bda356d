use crate::calc;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::attendance::load_student_attendance;
use crate::ipc::handlers::rankings::class_ranking;
use crate::ipc::helpers::{get_required_str, student_class_id, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn count(conn: &Connection, table: &str) -> Result<i64, HandlerErr> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(conn.query_row(&sql, [], |r| r.get(0))?)
}

/// Newest exam period, optionally restricted to one class.
fn latest_exam(conn: &Connection, class_id: Option<&str>) -> Result<Option<(String, String)>, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT id, name FROM exam_months
             WHERE (?1 IS NULL OR class_id = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
            [class_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?)
}

fn dashboard_admin(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "studentCount": count(conn, "students")?,
        "teacherCount": count(conn, "teachers")?,
        "classCount": count(conn, "classes")?,
        "latestExamName": latest_exam(conn, None)?.map(|(_, name)| name),
    }))
}

fn dashboard_teacher(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let assigned: Option<Option<String>> = conn
        .query_row(
            "SELECT assigned_class_id FROM teachers WHERE id = ?",
            [&teacher_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(assigned_class_id) = assigned else {
        return Err(HandlerErr::not_found("teacher not found"));
    };

    let mut subj_stmt = conn.prepare(
        "SELECT s.id, s.name
         FROM teacher_subjects ts
         JOIN subjects s ON s.id = ts.subject_id
         WHERE ts.teacher_id = ?
         ORDER BY s.name",
    )?;
    let subjects = subj_stmt
        .query_map([&teacher_id], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            Ok(json!({ "id": id, "name": name }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let Some(class_id) = assigned_class_id else {
        return Ok(json!({
            "assignedClass": null,
            "studentCount": 0,
            "subjects": subjects,
            "activeExams": [],
        }));
    };

    let class_name: Option<String> = conn
        .query_row("SELECT name FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()?;
    let student_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM students WHERE class_id = ?",
        [&class_id],
        |r| r.get(0),
    )?;
    let mut exam_stmt = conn.prepare(
        "SELECT id, name FROM exam_months
         WHERE class_id = ? AND is_active = 1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let active_exams = exam_stmt
        .query_map([&class_id], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            Ok(json!({ "id": id, "name": name }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "assignedClass": { "id": class_id, "name": class_name },
        "studentCount": student_count,
        "subjects": subjects,
        "activeExams": active_exams,
    }))
}

fn dashboard_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let class_id = student_class_id(conn, &student_id)?;
    let class_name: String =
        conn.query_row("SELECT name FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })?;

    let latest = match latest_exam(conn, Some(&class_id))? {
        Some((exam_id, exam_name)) => {
            let rows = class_ranking(conn, &class_id, &exam_id)?;
            let total_students = rows.len();
            rows.into_iter()
                .find(|r| r.ranked.total.student_id == student_id)
                .map(|r| {
                    json!({
                        "examMonthId": exam_id,
                        "examName": exam_name,
                        "totalObtained": r.ranked.total.total_obtained,
                        "totalPossible": r.ranked.total.total_possible,
                        "percentage": r.ranked.total.percentage,
                        "rank": r.ranked.rank,
                        "totalStudents": total_students,
                    })
                })
        }
        None => None,
    };

    let attendance = calc::compute_attendance_summary(load_student_attendance(conn, &student_id)?);

    Ok(json!({
        "studentId": student_id,
        "className": class_name,
        "latestExam": latest,
        "attendancePercentage": attendance.overall_percentage,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.admin" => Some(with_db(state, req, dashboard_admin)),
        "dashboard.teacher" => Some(with_db(state, req, dashboard_teacher)),
        "dashboard.student" => Some(with_db(state, req, dashboard_student)),
        _ => None,
    }
}
