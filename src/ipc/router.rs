use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type TryHandle = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const FAMILIES: &[TryHandle] = &[
    handlers::core::try_handle,
    handlers::settings::try_handle,
    handlers::classes::try_handle,
    handlers::teachers::try_handle,
    handlers::subjects::try_handle,
    handlers::students::try_handle,
    handlers::exams::try_handle,
    handlers::marks::try_handle,
    handlers::attendance::try_handle,
    handlers::rankings::try_handle,
    handlers::dashboard::try_handle,
    handlers::backup::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    log::debug!("request {} {}", req.id, req.method);
    for try_handle in FAMILIES {
        if let Some(resp) = try_handle(state, &req) {
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
