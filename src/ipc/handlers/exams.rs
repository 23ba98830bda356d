use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_bool, get_optional_str, get_patch, get_required_name, get_required_str,
    require_row, with_db,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn handle_exams_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return ok(&req.id, json!({ "exams": [] }));
    }
    with_db(state, req, exams_list)
}

/// Exam periods, newest first.
fn exams_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?;
    let active_only = get_optional_bool(params, "activeOnly")?.unwrap_or(false);
    let mut stmt = conn.prepare(
        "SELECT id, class_id, name, month_year, is_active, created_at
         FROM exam_months
         WHERE (?1 IS NULL OR class_id = ?1)
           AND (?2 = 0 OR is_active = 1)
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let exams = stmt
        .query_map((&class_id, active_only), |r| {
            let id: String = r.get(0)?;
            let class_id: String = r.get(1)?;
            let name: String = r.get(2)?;
            let month_year: String = r.get(3)?;
            let is_active: bool = r.get::<_, i64>(4)? != 0;
            let created_at: String = r.get(5)?;
            Ok(json!({
                "id": id,
                "classId": class_id,
                "name": name,
                "monthYear": month_year,
                "isActive": is_active,
                "createdAt": created_at,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "exams": exams }))
}

fn exams_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_name(params, "name")?;
    let month_year = get_required_name(params, "monthYear")?;
    let is_active = get_optional_bool(params, "isActive")?.unwrap_or(true);
    require_row(conn, "classes", "class", &class_id)?;

    let exam_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exam_months(id, class_id, name, month_year, is_active, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &exam_id,
            &class_id,
            &name,
            &month_year,
            is_active as i64,
            db::now_ts(),
        ),
    )
    .map_err(|e| HandlerErr::db_write("db_insert_failed", "exam_months", e))?;

    Ok(json!({ "examMonthId": exam_id, "name": name }))
}

fn exams_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let exam_id = get_required_str(params, "examMonthId")?;
    let patch = get_patch(params, &["name", "monthYear", "isActive"])?;
    require_row(conn, "exam_months", "exam", &exam_id)?;

    if patch.get("name").is_some() {
        let name = get_required_name(patch, "name")?;
        conn.execute("UPDATE exam_months SET name = ? WHERE id = ?", (&name, &exam_id))
            .map_err(|e| HandlerErr::db_write("db_update_failed", "exam_months", e))?;
    }
    if patch.get("monthYear").is_some() {
        let month_year = get_required_name(patch, "monthYear")?;
        conn.execute(
            "UPDATE exam_months SET month_year = ? WHERE id = ?",
            (&month_year, &exam_id),
        )
        .map_err(|e| HandlerErr::db_write("db_update_failed", "exam_months", e))?;
    }
    if patch.get("isActive").is_some() {
        let Some(active) = get_optional_bool(patch, "isActive")? else {
            return Err(HandlerErr::bad_params("isActive must be a boolean"));
        };
        conn.execute(
            "UPDATE exam_months SET is_active = ? WHERE id = ?",
            (active as i64, &exam_id),
        )
        .map_err(|e| HandlerErr::db_write("db_update_failed", "exam_months", e))?;
    }
    Ok(json!({ "ok": true }))
}

fn exams_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let exam_id = get_required_str(params, "examMonthId")?;
    require_row(conn, "exam_months", "exam", &exam_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute("DELETE FROM marks WHERE exam_month_id = ?", [&exam_id])
        .map_err(|e| HandlerErr::db_write("db_delete_failed", "marks", e))?;
    tx.execute("DELETE FROM exam_months WHERE id = ?", [&exam_id])
        .map_err(|e| HandlerErr::db_write("db_delete_failed", "exam_months", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    log::info!("exam deleted: {}", exam_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.list" => Some(handle_exams_list(state, req)),
        "exams.create" => Some(with_db(state, req, exams_create)),
        "exams.update" => Some(with_db(state, req, exams_update)),
        "exams.delete" => Some(with_db(state, req, exams_delete)),
        _ => None,
    }
}
