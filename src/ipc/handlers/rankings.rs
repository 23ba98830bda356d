use crate::calc::{self, ExamRef, RankedStudent, StudentTotal};
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::marks::{load_exam_marks, load_student_marks};
use crate::ipc::helpers::{
    get_optional_str, get_required_str, list_roster, require_row, student_class_id, with_db,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::{HashMap, HashSet};

pub(crate) struct RankedRow {
    pub ranked: RankedStudent,
    pub name: String,
}

/// Ranks every student enrolled in `class_id` for one exam period.
///
/// Enrolled students without marks take part as zero rows, and the roster
/// order is the input order, so it decides ties. Marks of students outside
/// the class are ignored.
pub(crate) fn class_ranking(
    conn: &Connection,
    class_id: &str,
    exam_id: &str,
) -> Result<Vec<RankedRow>, HandlerErr> {
    let roster = list_roster(conn, class_id)?;
    let enrolled: HashSet<&str> = roster.iter().map(|s| s.id.as_str()).collect();

    let marks: Vec<calc::MarkRecord> = load_exam_marks(conn, exam_id)?
        .into_iter()
        .filter(|m| enrolled.contains(m.student_id.as_str()))
        .collect();
    let mut totals_by_student: HashMap<String, StudentTotal> = calc::compute_totals(&marks)
        .into_iter()
        .map(|t| (t.student_id.clone(), t))
        .collect();

    let mut names: HashMap<String, String> = HashMap::with_capacity(roster.len());
    let mut ordered: Vec<StudentTotal> = Vec::with_capacity(roster.len());
    for s in &roster {
        ordered.push(
            totals_by_student
                .remove(&s.id)
                .unwrap_or_else(|| StudentTotal::empty(s.id.clone())),
        );
        names.insert(s.id.clone(), s.name.clone());
    }

    Ok(calc::rank(ordered)
        .into_iter()
        .map(|ranked| {
            let name = names
                .get(&ranked.total.student_id)
                .cloned()
                .unwrap_or_default();
            RankedRow { ranked, name }
        })
        .collect())
}

fn exam_name(conn: &Connection, exam_id: &str) -> Result<String, HandlerErr> {
    conn.query_row(
        "SELECT name FROM exam_months WHERE id = ?",
        [exam_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("exam not found"))
}

fn rankings_class(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let exam_id = get_required_str(params, "examMonthId")?;
    let viewer = get_optional_str(params, "studentId")?;
    require_row(conn, "classes", "class", &class_id)?;
    let name = exam_name(conn, &exam_id)?;

    let rows = class_ranking(conn, &class_id, &exam_id)?;
    let rankings: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            let t = &r.ranked.total;
            json!({
                "rank": r.ranked.rank,
                "studentId": t.student_id,
                "studentName": r.name,
                "totalObtained": t.total_obtained,
                "totalPossible": t.total_possible,
                "percentage": t.percentage,
                "isCurrentStudent": viewer.as_deref() == Some(t.student_id.as_str()),
            })
        })
        .collect();

    Ok(json!({
        "classId": class_id,
        "exam": { "id": exam_id, "name": name },
        "totalStudents": rankings.len(),
        "rankings": rankings,
    }))
}

/// Exams a student has marks in. The sort key appends the rowid so exams
/// created within the same millisecond keep insertion order.
fn student_exam_refs(conn: &Connection, student_id: &str) -> Result<Vec<ExamRef>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT id, name, created_at, rowid
         FROM exam_months
         WHERE id IN (SELECT DISTINCT exam_month_id FROM marks WHERE student_id = ?)",
    )?;
    let refs = stmt
        .query_map([student_id], |r| {
            let created_at: String = r.get(2)?;
            let rowid: i64 = r.get(3)?;
            Ok(ExamRef {
                id: r.get(0)?,
                name: r.get(1)?,
                created_at: format!("{}#{:012}", created_at, rowid),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(refs)
}

fn progress_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    student_class_id(conn, &student_id)?;

    let marks = load_student_marks(conn, &student_id)?;
    let exams = student_exam_refs(conn, &student_id)?;
    let trend = calc::compute_exam_trend(&marks, &exams);

    let mut stmt = conn.prepare(
        "SELECT id, name FROM subjects
         WHERE id IN (SELECT subject_id FROM marks WHERE student_id = ?)",
    )?;
    let subject_names: HashMap<String, String> = stmt
        .query_map([&student_id], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<HashMap<_, _>, _>>()?;

    let latest_subjects: Vec<serde_json::Value> = match trend.last() {
        Some(latest) => marks
            .iter()
            .filter(|m| m.exam_period_id == latest.exam_id)
            .map(|m| {
                json!({
                    "subjectId": m.subject_id,
                    "subject": subject_names
                        .get(&m.subject_id)
                        .map(String::as_str)
                        .unwrap_or("Unknown"),
                    "marks": m.obtained_or_default(),
                    "total": m.total_or_default(),
                })
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(json!({
        "studentId": student_id,
        "examPerformance": trend,
        "latestExam": trend.last().map(|e| json!({ "id": e.exam_id, "name": e.exam_name })),
        "latestSubjects": latest_subjects,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rankings.class" => Some(with_db(state, req, rankings_class)),
        "progress.student" => Some(with_db(state, req, progress_student)),
        _ => None,
    }
}
