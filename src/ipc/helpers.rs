use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};

/// Runs a handler body against the open workspace database and wraps the
/// outcome in a response envelope.
pub fn with_db<F>(state: &AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => {
            log::warn!("{} failed: {}", req.method, e);
            e.response(&req.id)
        }
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Like [`get_required_str`] but trims and rejects blank values.
pub fn get_required_name(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let v = get_required_str(params, key)?.trim().to_string();
    if v.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(v)
}

/// Missing, null and blank strings all read as `None`.
pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!(
                    "{} must be string or null",
                    key
                )));
            };
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
    }
}

pub fn get_optional_f64(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number or null", key))),
    }
}

pub fn get_optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

pub fn get_required_array<'a>(params: &'a Value, key: &str) -> Result<&'a Vec<Value>, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {} array", key)))
}

/// Returns `params.patch`, rejecting keys outside `allowed`.
pub fn get_patch<'a>(params: &'a Value, allowed: &[&str]) -> Result<&'a Value, HandlerErr> {
    let Some(patch) = params.get("patch").filter(|v| v.is_object()) else {
        return Err(HandlerErr::bad_params("missing patch object"));
    };
    if let Some(obj) = patch.as_object() {
        check_keys(obj, allowed)?;
    }
    Ok(patch)
}

fn check_keys(obj: &Map<String, Value>, allowed: &[&str]) -> Result<(), HandlerErr> {
    for key in obj.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(HandlerErr::bad_params(format!("unknown patch field: {}", key)));
        }
    }
    Ok(())
}

pub fn row_exists(conn: &Connection, table: &str, id: &str) -> Result<bool, HandlerErr> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    Ok(conn
        .query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

/// Fails with `not_found` unless `id` exists in `table`. `what` names the
/// entity in the error message.
pub fn require_row(conn: &Connection, table: &str, what: &str, id: &str) -> Result<(), HandlerErr> {
    if row_exists(conn, table, id)? {
        Ok(())
    } else {
        Err(HandlerErr::not_found(format!("{} not found", what)))
    }
}

#[derive(Debug, Clone)]
pub struct RosterStudent {
    pub id: String,
    pub name: String,
    pub roll_number: Option<String>,
}

/// Students of a class in roster order: numeric roll numbers compared
/// numerically, then non-numeric roll numbers as text, then students without
/// one. Name breaks remaining ties.
pub fn list_roster(conn: &Connection, class_id: &str) -> Result<Vec<RosterStudent>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT id, name, roll_number
         FROM students
         WHERE class_id = ?
         ORDER BY roll_number IS NULL, roll_number GLOB '[0-9]*' = 0, CAST(roll_number AS INTEGER), roll_number, name",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(RosterStudent {
                id: r.get(0)?,
                name: r.get(1)?,
                roll_number: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Class a student is enrolled in.
pub fn student_class_id(conn: &Connection, student_id: &str) -> Result<String, HandlerErr> {
    conn.query_row(
        "SELECT class_id FROM students WHERE id = ?",
        [student_id],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("student not found"))
}
