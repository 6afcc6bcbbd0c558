use chrono::Datelike;
use rusqlite::Connection;

use crate::idgen::{self, AllocError, EntityKind};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::store::SqliteKeys;

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "no workspace selected"))
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_f64(params: &serde_json::Value, key: &str) -> Option<f64> {
    params.get(key).and_then(|v| v.as_f64())
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_opt_i64(params: &serde_json::Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64())
}

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Allocate the next identifier for a record about to be inserted.
///
/// Exhaustion and overflow surface as retryable errors. A dead store is the
/// one case where a degraded timestamp identifier is issued instead, logged
/// so the relaxed uniqueness guarantee is visible to operators.
pub fn allocate_record_id(conn: &Connection, kind: EntityKind) -> Result<String, HandlerErr> {
    let keys = SqliteKeys::for_kind(conn, kind);
    match idgen::allocate(&keys, kind) {
        Ok(id) => Ok(id),
        Err(AllocError::StoreUnavailable(e)) => {
            let id = idgen::degraded_identifier(kind, chrono::Local::now().year());
            tracing::warn!(error = %e, %id, "identifier store unavailable; issuing degraded identifier");
            Ok(id)
        }
        Err(e @ AllocError::Exhausted { .. }) => Err(HandlerErr::new("id_exhausted", e.to_string())),
        Err(e @ AllocError::SequenceOverflow { .. }) => {
            Err(HandlerErr::new("id_overflow", e.to_string()))
        }
    }
}
