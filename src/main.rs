mod backup;
mod calc;
mod db;
mod ipc;
mod logging;

use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

const WORKSPACE_ENV: &str = "SCHOOLD_WORKSPACE";

fn main() {
    logging::init_logger();
    log::info!("schoold {} starting", env!("CARGO_PKG_VERSION"));

    let mut state = ipc::AppState::default();
    if let Some(path) = std::env::var_os(WORKSPACE_ENV).filter(|p| !p.is_empty()) {
        if let Err(e) = state.open_workspace(PathBuf::from(path)) {
            log::warn!("{} could not be opened: {:#}", WORKSPACE_ENV, e);
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::warn!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // No id to echo back.
            Err(e) => json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() },
            }),
        };
        if writeln!(stdout, "{}", resp).and_then(|_| stdout.flush()).is_err() {
            break;
        }
    }
    log::info!("stdin closed, exiting");
}
