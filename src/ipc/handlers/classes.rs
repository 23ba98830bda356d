use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_patch, get_required_name, get_required_str, require_row, with_db,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return ok(&req.id, json!({ "classes": [] }));
    }
    with_db(state, req, classes_list)
}

fn classes_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.section,
           c.academic_year,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM subjects sj WHERE sj.class_id = c.id) AS subject_count
         FROM classes c
         ORDER BY c.name, c.section",
    )?;
    let classes = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let section: Option<String> = row.get(2)?;
            let academic_year: Option<String> = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let subject_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "section": section,
                "academicYear": academic_year,
                "studentCount": student_count,
                "subjectCount": subject_count
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "classes": classes }))
}

fn classes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_name(params, "name")?;
    let section = get_optional_str(params, "section")?;
    let academic_year = get_optional_str(params, "academicYear")?;

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, section, academic_year, created_at) VALUES(?, ?, ?, ?, ?)",
        (&class_id, &name, &section, &academic_year, db::now_ts()),
    )
    .map_err(|e| HandlerErr::db_write("db_insert_failed", "classes", e))?;

    Ok(json!({ "classId": class_id, "name": name }))
}

fn classes_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let patch = get_patch(params, &["name", "section", "academicYear"])?;
    require_row(conn, "classes", "class", &class_id)?;

    if patch.get("name").is_some() {
        let name = get_required_name(patch, "name")?;
        conn.execute("UPDATE classes SET name = ? WHERE id = ?", (&name, &class_id))
            .map_err(|e| HandlerErr::db_write("db_update_failed", "classes", e))?;
    }
    if patch.get("section").is_some() {
        let section = get_optional_str(patch, "section")?;
        conn.execute(
            "UPDATE classes SET section = ? WHERE id = ?",
            (&section, &class_id),
        )
        .map_err(|e| HandlerErr::db_write("db_update_failed", "classes", e))?;
    }
    if patch.get("academicYear").is_some() {
        let year = get_optional_str(patch, "academicYear")?;
        conn.execute(
            "UPDATE classes SET academic_year = ? WHERE id = ?",
            (&year, &class_id),
        )
        .map_err(|e| HandlerErr::db_write("db_update_failed", "classes", e))?;
    }
    Ok(json!({ "ok": true }))
}

fn classes_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    require_row(conn, "classes", "class", &class_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    // Explicit dependency order; no ON DELETE CASCADE in the schema.
    let steps: &[(&str, &str)] = &[
        (
            "marks",
            "DELETE FROM marks
             WHERE student_id IN (SELECT id FROM students WHERE class_id = ?1)
                OR subject_id IN (SELECT id FROM subjects WHERE class_id = ?1)
                OR exam_month_id IN (SELECT id FROM exam_months WHERE class_id = ?1)",
        ),
        (
            "attendance",
            "DELETE FROM attendance
             WHERE student_id IN (SELECT id FROM students WHERE class_id = ?1)",
        ),
        (
            "teacher_subjects",
            "DELETE FROM teacher_subjects
             WHERE subject_id IN (SELECT id FROM subjects WHERE class_id = ?1)",
        ),
        ("exam_months", "DELETE FROM exam_months WHERE class_id = ?1"),
        ("subjects", "DELETE FROM subjects WHERE class_id = ?1"),
        ("students", "DELETE FROM students WHERE class_id = ?1"),
        (
            "teachers",
            "UPDATE teachers SET assigned_class_id = NULL WHERE assigned_class_id = ?1",
        ),
        ("classes", "DELETE FROM classes WHERE id = ?1"),
    ];
    for (table, sql) in steps {
        tx.execute(sql, [&class_id])
            .map_err(|e| HandlerErr::db_write("db_delete_failed", table, e))?;
    }

    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    log::info!("class deleted: {}", class_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(with_db(state, req, classes_create)),
        "classes.update" => Some(with_db(state, req, classes_update)),
        "classes.delete" => Some(with_db(state, req, classes_delete)),
        _ => None,
    }
}
