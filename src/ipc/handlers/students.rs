use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_patch, get_required_name, get_required_str, require_row, with_db,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const PATCH_FIELDS: &[&str] = &["name", "rollNumber", "section", "parentName", "classId"];

fn student_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = r.get(0)?;
    let class_id: String = r.get(1)?;
    let class_name: String = r.get(2)?;
    let name: String = r.get(3)?;
    let roll_number: Option<String> = r.get(4)?;
    let section: Option<String> = r.get(5)?;
    let parent_name: Option<String> = r.get(6)?;
    Ok(json!({
        "id": id,
        "classId": class_id,
        "className": class_name,
        "name": name,
        "rollNumber": roll_number,
        "section": section,
        "parentName": parent_name,
    }))
}

const STUDENT_SELECT: &str = "SELECT s.id, s.class_id, c.name, s.name, s.roll_number, s.section, s.parent_name
     FROM students s
     JOIN classes c ON c.id = s.class_id";

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return ok(&req.id, json!({ "students": [] }));
    }
    with_db(state, req, students_list)
}

/// Students in roster order, optionally limited to one class.
fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?;
    let sql = format!(
        "{}
         WHERE (?1 IS NULL OR s.class_id = ?1)
         ORDER BY c.name, s.roll_number IS NULL, s.roll_number GLOB '[0-9]*' = 0, CAST(s.roll_number AS INTEGER), s.roll_number, s.name",
        STUDENT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map([&class_id], student_json)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "students": students }))
}

fn students_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let sql = format!("{} WHERE s.id = ?", STUDENT_SELECT);
    let student = conn
        .query_row(&sql, [&student_id], student_json)
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("student not found"))?;
    Ok(json!({ "student": student }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_name(params, "name")?;
    let roll_number = get_optional_str(params, "rollNumber")?;
    let section = get_optional_str(params, "section")?;
    let parent_name = get_optional_str(params, "parentName")?;
    require_row(conn, "classes", "class", &class_id)?;

    let student_id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO students(id, class_id, name, roll_number, section, parent_name, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &class_id,
            &name,
            &roll_number,
            &section,
            &parent_name,
            &now,
            &now,
        ),
    )
    .map_err(|e| HandlerErr::db_write("db_insert_failed", "students", e))?;

    Ok(json!({ "studentId": student_id, "name": name }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let patch = get_patch(params, PATCH_FIELDS)?;
    require_row(conn, "students", "student", &student_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if patch.get("name").is_some() {
        let name = get_required_name(patch, "name")?;
        tx.execute("UPDATE students SET name = ? WHERE id = ?", (&name, &student_id))
            .map_err(|e| HandlerErr::db_write("db_update_failed", "students", e))?;
    }
    if patch.get("classId").is_some() {
        let class_id = get_required_name(patch, "classId")?;
        require_row(&tx, "classes", "class", &class_id)?;
        tx.execute(
            "UPDATE students SET class_id = ? WHERE id = ?",
            (&class_id, &student_id),
        )
        .map_err(|e| HandlerErr::db_write("db_update_failed", "students", e))?;
    }
    for (key, column) in [
        ("rollNumber", "roll_number"),
        ("section", "section"),
        ("parentName", "parent_name"),
    ] {
        if patch.get(key).is_none() {
            continue;
        }
        let value = get_optional_str(patch, key)?;
        let sql = format!("UPDATE students SET {} = ? WHERE id = ?", column);
        tx.execute(&sql, (&value, &student_id))
            .map_err(|e| HandlerErr::db_write("db_update_failed", "students", e))?;
    }
    tx.execute(
        "UPDATE students SET updated_at = ? WHERE id = ?",
        (db::now_ts(), &student_id),
    )
    .map_err(|e| HandlerErr::db_write("db_update_failed", "students", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_row(conn, "students", "student", &student_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let steps: &[(&str, &str)] = &[
        ("marks", "DELETE FROM marks WHERE student_id = ?1"),
        ("attendance", "DELETE FROM attendance WHERE student_id = ?1"),
        ("students", "DELETE FROM students WHERE id = ?1"),
    ];
    for (table, sql) in steps {
        tx.execute(sql, [&student_id])
            .map_err(|e| HandlerErr::db_write("db_delete_failed", table, e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    log::info!("student deleted: {}", student_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(with_db(state, req, students_get)),
        "students.create" => Some(with_db(state, req, students_create)),
        "students.update" => Some(with_db(state, req, students_update)),
        "students.delete" => Some(with_db(state, req, students_delete)),
        _ => None,
    }
}
