use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn required_path(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_path(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let export = match backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path)) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("backup export failed: {:#}", e);
            return err(
                &req.id,
                "io_failed",
                format!("{:#}", e),
                Some(json!({ "path": out_path })),
            );
        }
    };
    log::info!("workspace exported to {}", out_path);

    ok(
        &req.id,
        json!({
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "dbSha256": export.db_sha256,
        }),
    )
}

/// Replaces a workspace database from a bundle. When the target is the
/// active workspace its connection is dropped first and reopened afterwards,
/// whether or not the import succeeded.
fn handle_backup_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match required_path(req, "inPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let workspace_path = req
        .params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| PathBuf::from(s.trim()))
        .or_else(|| state.workspace.clone());
    let Some(workspace_path) = workspace_path else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    let is_active = state.workspace.as_deref() == Some(workspace_path.as_path());
    if is_active {
        state.close_db();
    }

    let imported = backup::import_workspace_bundle(&src, &workspace_path);

    if is_active {
        if let Err(e) = state.open_workspace(workspace_path.clone()) {
            return err(&req.id, "db_open_failed", format!("{:#}", e), None);
        }
    }

    match imported {
        Ok(summary) => {
            log::info!(
                "workspace {} restored from {}",
                workspace_path.to_string_lossy(),
                in_path
            );
            ok(
                &req.id,
                json!({
                    "workspacePath": workspace_path.to_string_lossy(),
                    "bundleFormat": summary.bundle_format,
                    "dbSha256": summary.db_sha256,
                }),
            )
        }
        Err(e) => {
            log::warn!("backup import failed: {:#}", e);
            err(
                &req.id,
                "io_failed",
                format!("{:#}", e),
                Some(json!({ "path": in_path })),
            )
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspace" => Some(handle_backup_export(state, req)),
        "backup.importWorkspace" => Some(handle_backup_import(state, req)),
        _ => None,
    }
}
