use crate::calc::{self, AttendanceRecord};
use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::handlers::settings::load_settings;
use crate::ipc::helpers::{
    get_optional_str, get_required_array, get_required_str, list_roster, require_row,
    student_class_id, with_db,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::cmp::Reverse;
use std::collections::HashMap;
use uuid::Uuid;

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Canonical month name for `raw` (case-insensitive).
fn parse_month(raw: &str) -> Result<&'static str, HandlerErr> {
    let t = raw.trim();
    MONTHS
        .iter()
        .find(|m| m.eq_ignore_ascii_case(t))
        .copied()
        .ok_or_else(|| HandlerErr::bad_params("month must be a month name, e.g. \"January\""))
}

fn month_index(month: &str) -> usize {
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(month))
        .unwrap_or(MONTHS.len())
}

fn get_year(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let Some(v) = params.get("year") else {
        return Err(HandlerErr::bad_params("missing year"));
    };
    // The entry form submits the year as a string.
    let year = v
        .as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()));
    match year {
        Some(y) if (1900..=9999).contains(&y) => Ok(y),
        _ => Err(HandlerErr::bad_params("year must be a four-digit integer")),
    }
}

/// Day counts are per calendar month.
const MAX_DAYS_IN_MONTH: i64 = 31;

fn get_day_count(entry: &serde_json::Value, key: &str, index: usize) -> Result<i64, HandlerErr> {
    let v = entry.get(key).and_then(|v| v.as_i64());
    match v {
        Some(n) if (0..=MAX_DAYS_IN_MONTH).contains(&n) => Ok(n),
        _ => Err(HandlerErr::bad_params(format!(
            "{} must be an integer between 0 and {}",
            key, MAX_DAYS_IN_MONTH
        ))
        .with_details(json!({ "index": index }))),
    }
}

fn month_records(
    conn: &Connection,
    class_id: &str,
    month: &str,
    year: i64,
) -> Result<HashMap<String, AttendanceRecord>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT a.student_id, a.month, a.year, a.present_days, a.total_working_days
         FROM attendance a
         JOIN students s ON s.id = a.student_id
         WHERE s.class_id = ? AND a.month = ? AND a.year = ?",
    )?;
    let rows = stmt
        .query_map((class_id, month, year), attendance_record)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().map(|r| (r.student_id.clone(), r)).collect())
}

fn attendance_record(r: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        student_id: r.get(0)?,
        month: r.get(1)?,
        year: r.get(2)?,
        present_days: r.get(3)?,
        total_working_days: r.get(4)?,
    })
}

/// A student's monthly rows, most recent year first, then calendar order.
pub(crate) fn load_student_attendance(
    conn: &Connection,
    student_id: &str,
) -> Result<Vec<AttendanceRecord>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT student_id, month, year, present_days, total_working_days
         FROM attendance
         WHERE student_id = ?",
    )?;
    let mut rows = stmt
        .query_map([student_id], attendance_record)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.sort_by_key(|r| (Reverse(r.year), month_index(&r.month)));
    Ok(rows)
}

fn attendance_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let month = parse_month(&get_required_str(params, "month")?)?;
    let year = get_year(params)?;
    require_row(conn, "classes", "class", &class_id)?;

    let existing = month_records(conn, &class_id, month, year)?;
    let students: Vec<serde_json::Value> = list_roster(conn, &class_id)?
        .into_iter()
        .map(|s| {
            let rec = existing.get(&s.id);
            json!({
                "studentId": s.id,
                "name": s.name,
                "rollNumber": s.roll_number,
                "presentDays": rec.and_then(|r| r.present_days),
                "totalWorkingDays": rec.and_then(|r| r.total_working_days),
            })
        })
        .collect();

    Ok(json!({
        "classId": class_id,
        "month": month,
        "year": year,
        "students": students,
    }))
}

fn attendance_save_batch(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let month = parse_month(&get_required_str(params, "month")?)?;
    let year = get_year(params)?;
    let teacher_id = get_optional_str(params, "teacherId")?;
    let raw_entries = get_required_array(params, "entries")?;
    if let Some(tid) = teacher_id.as_deref() {
        require_row(conn, "teachers", "teacher", tid)?;
    }

    let mut entries: Vec<(String, i64, i64)> = Vec::with_capacity(raw_entries.len());
    for (i, e) in raw_entries.iter().enumerate() {
        let student_id = get_required_str(e, "studentId")
            .map_err(|err| err.with_details(json!({ "index": i })))?;
        let present = get_day_count(e, "presentDays", i)?;
        let working = get_day_count(e, "totalWorkingDays", i)?;
        if present > working {
            return Err(HandlerErr::bad_params(
                "presentDays must not exceed totalWorkingDays",
            )
            .with_details(json!({ "index": i, "studentId": student_id })));
        }
        require_row(conn, "students", "student", &student_id)
            .map_err(|err| err.with_details(json!({ "studentId": student_id })))?;
        entries.push((student_id, present, working));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let now = db::now_ts();
    for (student_id, present, working) in &entries {
        tx.execute(
            "INSERT INTO attendance(id, student_id, month, year, present_days, total_working_days, teacher_id, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, month, year) DO UPDATE SET
               present_days = excluded.present_days,
               total_working_days = excluded.total_working_days,
               teacher_id = excluded.teacher_id,
               updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                student_id,
                month,
                year,
                present,
                working,
                &teacher_id,
                &now,
                &now,
            ),
        )
        .map_err(|err| HandlerErr::db_write("db_update_failed", "attendance", err))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    log::info!("saved {} attendance rows for {} {}", entries.len(), month, year);
    Ok(json!({ "saved": entries.len() }))
}

fn attendance_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    student_class_id(conn, &student_id)?;
    let warn_below = load_settings(conn)?.attendance_warn_percent;

    let summary = calc::compute_attendance_summary(load_student_attendance(conn, &student_id)?);
    let months: Vec<serde_json::Value> = summary
        .per_month
        .iter()
        .map(|r| {
            json!({
                "month": r.month,
                "year": r.year,
                "presentDays": r.present_days,
                "totalWorkingDays": r.total_working_days,
                "percentage": r.percentage(),
            })
        })
        .collect();

    Ok(json!({
        "studentId": student_id,
        "overallPercentage": summary.overall_percentage,
        "totalPresent": summary.total_present,
        "totalWorkingDays": summary.total_working_days,
        "belowThreshold": summary.overall_percentage < warn_below,
        "thresholdPercent": warn_below,
        "perMonth": months,
    }))
}

/// One month of attendance across a class roster.
fn attendance_class_summary(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let month = parse_month(&get_required_str(params, "month")?)?;
    let year = get_year(params)?;
    require_row(conn, "classes", "class", &class_id)?;

    let mut existing = month_records(conn, &class_id, month, year)?;
    let roster = list_roster(conn, &class_id)?;
    let mut recorded: Vec<AttendanceRecord> = Vec::new();
    let mut students: Vec<serde_json::Value> = Vec::with_capacity(roster.len());
    for s in roster {
        let rec = existing.remove(&s.id);
        students.push(json!({
            "studentId": s.id,
            "name": s.name,
            "presentDays": rec.as_ref().and_then(|r| r.present_days),
            "totalWorkingDays": rec.as_ref().and_then(|r| r.total_working_days),
            "percentage": rec.as_ref().map(|r| r.percentage()),
        }));
        if let Some(r) = rec {
            recorded.push(r);
        }
    }
    let summary = calc::compute_attendance_summary(recorded);

    Ok(json!({
        "classId": class_id,
        "month": month,
        "year": year,
        "overallPercentage": summary.overall_percentage,
        "recordedCount": summary.per_month.len(),
        "students": students,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.open" => Some(with_db(state, req, attendance_open)),
        "attendance.saveBatch" => Some(with_db(state, req, attendance_save_batch)),
        "attendance.student" => Some(with_db(state, req, attendance_student)),
        "attendance.classSummary" => Some(with_db(state, req, attendance_class_summary)),
        _ => None,
    }
}
