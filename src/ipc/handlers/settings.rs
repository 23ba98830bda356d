use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_patch, with_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

const SETTINGS_KEY: &str = "school";

const PATCH_FIELDS: &[&str] = &[
    "schoolName",
    "academicYear",
    "address",
    "phone",
    "email",
    "logoUrl",
    "attendanceWarnPercent",
    "defaultTotalMarks",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolSettings {
    pub school_name: Option<String>,
    pub academic_year: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub logo_url: Option<String>,
    /// Students whose overall attendance falls below this are flagged.
    pub attendance_warn_percent: i64,
    /// Total used for new subjects created without one.
    pub default_total_marks: f64,
}

impl Default for SchoolSettings {
    fn default() -> Self {
        Self {
            school_name: None,
            academic_year: None,
            address: None,
            phone: None,
            email: None,
            logo_url: None,
            attendance_warn_percent: 75,
            default_total_marks: crate::calc::DEFAULT_TOTAL_MARKS,
        }
    }
}

impl SchoolSettings {
    fn validate(&self) -> Result<(), HandlerErr> {
        if !(0..=100).contains(&self.attendance_warn_percent) {
            return Err(HandlerErr::bad_params(
                "attendanceWarnPercent must be between 0 and 100",
            ));
        }
        if !(self.default_total_marks > 0.0
            && self.default_total_marks <= crate::calc::MAX_TOTAL_MARKS)
        {
            return Err(HandlerErr::bad_params(format!(
                "defaultTotalMarks must be greater than 0 and at most {}",
                crate::calc::MAX_TOTAL_MARKS
            )));
        }
        Ok(())
    }
}

pub fn load_settings(conn: &Connection) -> Result<SchoolSettings, HandlerErr> {
    let raw = db::settings_get_json(conn, SETTINGS_KEY)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    match raw {
        // A stored blob that no longer parses falls back to defaults.
        Some(v) => Ok(serde_json::from_value(v).unwrap_or_default()),
        None => Ok(SchoolSettings::default()),
    }
}

fn settings_get(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let s = load_settings(conn)?;
    serde_json::to_value(s).map_err(|e| HandlerErr::new("io_failed", e.to_string()))
}

fn settings_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let patch = get_patch(params, PATCH_FIELDS)?;
    let current = load_settings(conn)?;

    let mut merged = serde_json::to_value(&current)
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    if let (Some(dst), Some(src)) = (merged.as_object_mut(), patch.as_object()) {
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
    let next: SchoolSettings = serde_json::from_value(merged)
        .map_err(|e| HandlerErr::bad_params(format!("invalid settings patch: {}", e)))?;
    next.validate()?;

    let stored = serde_json::to_value(&next)
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    db::settings_set_json(conn, SETTINGS_KEY, &stored)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    log::info!("school settings updated");
    Ok(stored)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(with_db(state, req, settings_get)),
        "settings.update" => Some(with_db(state, req, settings_update)),
        _ => None,
    }
}
