use crate::calc;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::settings::load_settings;
use crate::ipc::helpers::{
    get_optional_f64, get_optional_str, get_patch, get_required_name, get_required_str,
    require_row, with_db,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn validate_total(total: f64) -> Result<f64, HandlerErr> {
    if total > 0.0 && total <= calc::MAX_TOTAL_MARKS {
        Ok(total)
    } else {
        Err(HandlerErr::bad_params(format!(
            "totalMarks must be greater than 0 and at most {}",
            calc::MAX_TOTAL_MARKS
        )))
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return ok(&req.id, json!({ "subjects": [] }));
    }
    with_db(state, req, subjects_list)
}

fn subjects_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.class_id, c.name, s.name, s.total_marks
         FROM subjects s
         JOIN classes c ON c.id = s.class_id
         WHERE (?1 IS NULL OR s.class_id = ?1)
         ORDER BY c.name, s.name",
    )?;
    let subjects = stmt
        .query_map([&class_id], |r| {
            let id: String = r.get(0)?;
            let class_id: String = r.get(1)?;
            let class_name: String = r.get(2)?;
            let name: String = r.get(3)?;
            let total_marks: Option<f64> = r.get(4)?;
            Ok(json!({
                "id": id,
                "classId": class_id,
                "className": class_name,
                "name": name,
                "totalMarks": total_marks,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "subjects": subjects }))
}

fn subjects_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_name(params, "name")?;
    let total = match get_optional_f64(params, "totalMarks")? {
        Some(t) => validate_total(t)?,
        None => load_settings(conn)?.default_total_marks,
    };
    require_row(conn, "classes", "class", &class_id)?;

    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, class_id, name, total_marks, created_at) VALUES(?, ?, ?, ?, ?)",
        (&subject_id, &class_id, &name, total, db::now_ts()),
    )
    .map_err(|e| HandlerErr::db_write("db_insert_failed", "subjects", e))?;

    Ok(json!({ "subjectId": subject_id, "name": name, "totalMarks": total }))
}

/// Changing `totalMarks` affects marks saved afterwards; existing rows keep
/// the total they were entered against.
fn subjects_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_required_str(params, "subjectId")?;
    let patch = get_patch(params, &["name", "totalMarks"])?;
    require_row(conn, "subjects", "subject", &subject_id)?;

    if patch.get("name").is_some() {
        let name = get_required_name(patch, "name")?;
        conn.execute("UPDATE subjects SET name = ? WHERE id = ?", (&name, &subject_id))
            .map_err(|e| HandlerErr::db_write("db_update_failed", "subjects", e))?;
    }
    if patch.get("totalMarks").is_some() {
        let Some(total) = get_optional_f64(patch, "totalMarks")? else {
            return Err(HandlerErr::bad_params("totalMarks must be a number"));
        };
        let total = validate_total(total)?;
        conn.execute(
            "UPDATE subjects SET total_marks = ? WHERE id = ?",
            (total, &subject_id),
        )
        .map_err(|e| HandlerErr::db_write("db_update_failed", "subjects", e))?;
    }
    Ok(json!({ "ok": true }))
}

fn subjects_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_required_str(params, "subjectId")?;
    require_row(conn, "subjects", "subject", &subject_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let steps: &[(&str, &str)] = &[
        ("marks", "DELETE FROM marks WHERE subject_id = ?1"),
        ("teacher_subjects", "DELETE FROM teacher_subjects WHERE subject_id = ?1"),
        ("subjects", "DELETE FROM subjects WHERE id = ?1"),
    ];
    for (table, sql) in steps {
        tx.execute(sql, [&subject_id])
            .map_err(|e| HandlerErr::db_write("db_delete_failed", table, e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    log::info!("subject deleted: {}", subject_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(with_db(state, req, subjects_create)),
        "subjects.update" => Some(with_db(state, req, subjects_update)),
        "subjects.delete" => Some(with_db(state, req, subjects_delete)),
        _ => None,
    }
}
