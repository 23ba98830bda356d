use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_patch, get_required_name, get_required_str, require_row, with_db,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn parse_subject_ids(v: Option<&serde_json::Value>) -> Result<Option<Vec<String>>, HandlerErr> {
    let Some(v) = v else { return Ok(None) };
    if v.is_null() {
        return Ok(Some(Vec::new()));
    }
    let Some(arr) = v.as_array() else {
        return Err(HandlerErr::bad_params("subjectIds must be an array of strings"));
    };
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let Some(s) = item.as_str() else {
            return Err(HandlerErr::bad_params("subjectIds must be an array of strings"));
        };
        if !out.iter().any(|x| x == s) {
            out.push(s.to_string());
        }
    }
    Ok(Some(out))
}

fn check_assigned_class(conn: &Connection, class_id: Option<&str>) -> Result<(), HandlerErr> {
    if let Some(cid) = class_id {
        require_row(conn, "classes", "class", cid)?;
    }
    Ok(())
}

fn replace_subject_links(
    conn: &Connection,
    teacher_id: &str,
    subject_ids: &[String],
) -> Result<(), HandlerErr> {
    for sid in subject_ids {
        require_row(conn, "subjects", "subject", sid)?;
    }
    conn.execute(
        "DELETE FROM teacher_subjects WHERE teacher_id = ?",
        [teacher_id],
    )
    .map_err(|e| HandlerErr::db_write("db_delete_failed", "teacher_subjects", e))?;
    for sid in subject_ids {
        conn.execute(
            "INSERT INTO teacher_subjects(id, teacher_id, subject_id) VALUES(?, ?, ?)",
            (Uuid::new_v4().to_string(), teacher_id, sid),
        )
        .map_err(|e| HandlerErr::db_write("db_insert_failed", "teacher_subjects", e))?;
    }
    Ok(())
}

fn subject_ids_for(conn: &Connection, teacher_id: &str) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT subject_id FROM teacher_subjects WHERE teacher_id = ? ORDER BY subject_id",
    )?;
    let ids = stmt
        .query_map([teacher_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        return ok(&req.id, json!({ "teachers": [] }));
    }
    with_db(state, req, teachers_list)
}

fn teachers_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.email, t.assigned_class_id, c.name
         FROM teachers t
         LEFT JOIN classes c ON c.id = t.assigned_class_id
         ORDER BY t.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut teachers = Vec::with_capacity(rows.len());
    for (id, name, email, class_id, class_name) in rows {
        let subject_ids = subject_ids_for(conn, &id)?;
        teachers.push(json!({
            "id": id,
            "name": name,
            "email": email,
            "assignedClassId": class_id,
            "assignedClassName": class_name,
            "subjectIds": subject_ids,
        }));
    }
    Ok(json!({ "teachers": teachers }))
}

fn teachers_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let row: Option<(String, Option<String>, Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT t.name, t.email, t.assigned_class_id, c.name
             FROM teachers t
             LEFT JOIN classes c ON c.id = t.assigned_class_id
             WHERE t.id = ?",
            [&teacher_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((name, email, class_id, class_name)) = row else {
        return Err(HandlerErr::not_found("teacher not found"));
    };

    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, c.name
         FROM teacher_subjects ts
         JOIN subjects s ON s.id = ts.subject_id
         JOIN classes c ON c.id = s.class_id
         WHERE ts.teacher_id = ?
         ORDER BY c.name, s.name",
    )?;
    let subjects = stmt
        .query_map([&teacher_id], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let class_name: String = r.get(2)?;
            Ok(json!({ "id": id, "name": name, "className": class_name }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "teacher": {
            "id": teacher_id,
            "name": name,
            "email": email,
            "assignedClassId": class_id,
            "assignedClassName": class_name,
            "subjects": subjects,
        }
    }))
}

fn teachers_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_name(params, "name")?;
    let email = get_optional_str(params, "email")?;
    let class_id = get_optional_str(params, "assignedClassId")?;
    let subject_ids = parse_subject_ids(params.get("subjectIds"))?.unwrap_or_default();
    check_assigned_class(conn, class_id.as_deref())?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let teacher_id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    tx.execute(
        "INSERT INTO teachers(id, name, email, assigned_class_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&teacher_id, &name, &email, &class_id, &now, &now),
    )
    .map_err(|e| HandlerErr::db_write("db_insert_failed", "teachers", e))?;
    replace_subject_links(&tx, &teacher_id, &subject_ids)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "teacherId": teacher_id, "name": name }))
}

fn teachers_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let patch = get_patch(params, &["name", "email", "assignedClassId", "subjectIds"])?;
    require_row(conn, "teachers", "teacher", &teacher_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if patch.get("name").is_some() {
        let name = get_required_name(patch, "name")?;
        tx.execute("UPDATE teachers SET name = ? WHERE id = ?", (&name, &teacher_id))
            .map_err(|e| HandlerErr::db_write("db_update_failed", "teachers", e))?;
    }
    if patch.get("email").is_some() {
        let email = get_optional_str(patch, "email")?;
        tx.execute("UPDATE teachers SET email = ? WHERE id = ?", (&email, &teacher_id))
            .map_err(|e| HandlerErr::db_write("db_update_failed", "teachers", e))?;
    }
    if patch.get("assignedClassId").is_some() {
        let class_id = get_optional_str(patch, "assignedClassId")?;
        check_assigned_class(&tx, class_id.as_deref())?;
        tx.execute(
            "UPDATE teachers SET assigned_class_id = ? WHERE id = ?",
            (&class_id, &teacher_id),
        )
        .map_err(|e| HandlerErr::db_write("db_update_failed", "teachers", e))?;
    }
    if let Some(subject_ids) = parse_subject_ids(patch.get("subjectIds"))? {
        replace_subject_links(&tx, &teacher_id, &subject_ids)?;
    }
    tx.execute(
        "UPDATE teachers SET updated_at = ? WHERE id = ?",
        (db::now_ts(), &teacher_id),
    )
    .map_err(|e| HandlerErr::db_write("db_update_failed", "teachers", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn teachers_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    require_row(conn, "teachers", "teacher", &teacher_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    // Entered marks and attendance outlive the teacher who recorded them.
    let steps: &[(&str, &str)] = &[
        ("teacher_subjects", "DELETE FROM teacher_subjects WHERE teacher_id = ?1"),
        ("marks", "UPDATE marks SET teacher_id = NULL WHERE teacher_id = ?1"),
        (
            "attendance",
            "UPDATE attendance SET teacher_id = NULL WHERE teacher_id = ?1",
        ),
        ("teachers", "DELETE FROM teachers WHERE id = ?1"),
    ];
    for (table, sql) in steps {
        tx.execute(sql, [&teacher_id])
            .map_err(|e| HandlerErr::db_write("db_delete_failed", table, e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    log::info!("teacher deleted: {}", teacher_id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.get" => Some(with_db(state, req, teachers_get)),
        "teachers.create" => Some(with_db(state, req, teachers_create)),
        "teachers.update" => Some(with_db(state, req, teachers_update)),
        "teachers.delete" => Some(with_db(state, req, teachers_delete)),
        _ => None,
    }
}
