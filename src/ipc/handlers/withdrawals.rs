use rusqlite::{params, types::Value as SqlValue, Connection, OptionalExtension};
use serde_json::json;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_opt_str, get_required_f64, get_required_str, now_iso, require_db,
};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "withdrawals.list" => handle_list(state, req),
        "withdrawals.get" => handle_get(state, req),
        "withdrawals.create" => handle_create(state, req),
        "withdrawals.approve" => handle_set_status(state, req, "approved"),
        "withdrawals.reject" => handle_set_status(state, req, "rejected"),
        "withdrawals.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(match out {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

const WITHDRAWAL_COLS: &str = "id, amount, category, description, payment_method, recipient,
     receipt_number, date, status, approved_at, notes, created_at, updated_at";

fn row_to_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "withdrawalId": r.get::<_, String>(0)?,
        "amount": r.get::<_, f64>(1)?,
        "category": r.get::<_, String>(2)?,
        "description": r.get::<_, String>(3)?,
        "paymentMethod": r.get::<_, String>(4)?,
        "recipient": r.get::<_, Option<String>>(5)?,
        "receiptNumber": r.get::<_, Option<String>>(6)?,
        "date": r.get::<_, String>(7)?,
        "status": r.get::<_, String>(8)?,
        "approvedAt": r.get::<_, Option<String>>(9)?,
        "notes": r.get::<_, Option<String>>(10)?,
        "createdAt": r.get::<_, String>(11)?,
        "updatedAt": r.get::<_, Option<String>>(12)?,
    }))
}

fn fetch_withdrawal(conn: &Connection, id: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM withdrawals WHERE id = ?1", WITHDRAWAL_COLS),
        [id],
        row_to_json,
    )
    .optional()
    .map_err(HandlerErr::db)
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut sql = format!("SELECT {} FROM withdrawals", WITHDRAWAL_COLS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();

    if let Some(category) = get_opt_str(&req.params, "category") {
        clauses.push("category = ?");
        args.push(SqlValue::Text(category));
    }
    if let Some(status) = get_opt_str(&req.params, "status") {
        clauses.push("status = ?");
        args.push(SqlValue::Text(status));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY date DESC");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db)?;
    let withdrawals = stmt
        .query_map(rusqlite::params_from_iter(args), row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(json!({ "withdrawals": withdrawals }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "withdrawalId")?;
    fetch_withdrawal(conn, &id)?.ok_or_else(|| HandlerErr::not_found("withdrawal"))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let amount = get_required_f64(p, "amount")?;
    if amount < 0.0 {
        return Err(HandlerErr::bad_params("amount must not be negative"));
    }
    let category = get_required_str(p, "category")?;
    let description = get_required_str(p, "description")?;
    let now = now_iso();

    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO withdrawals(
            id, amount, category, description, payment_method, recipient, receipt_number,
            date, status, notes, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            amount,
            category,
            description,
            get_opt_str(p, "paymentMethod").unwrap_or_else(|| "cash".to_string()),
            get_opt_str(p, "recipient"),
            get_opt_str(p, "receiptNumber"),
            get_opt_str(p, "date").unwrap_or_else(|| now.clone()),
            get_opt_str(p, "status").unwrap_or_else(|| "pending".to_string()),
            get_opt_str(p, "notes"),
            now,
        ],
    )
    .map_err(HandlerErr::db)?;

    fetch_withdrawal(conn, &id)?.ok_or_else(|| HandlerErr::not_found("withdrawal"))
}

fn handle_set_status(
    state: &mut AppState,
    req: &Request,
    status: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "withdrawalId")?;
    let now = now_iso();
    let approved_at = (status == "approved").then(|| now.clone());
    let changed = conn
        .execute(
            "UPDATE withdrawals SET status = ?1, approved_at = ?2, updated_at = ?3 WHERE id = ?4",
            params![status, approved_at, now, id],
        )
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("withdrawal"));
    }
    fetch_withdrawal(conn, &id)?.ok_or_else(|| HandlerErr::not_found("withdrawal"))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "withdrawalId")?;
    let changed = conn
        .execute("DELETE FROM withdrawals WHERE id = ?1", [&id])
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("withdrawal"));
    }
    Ok(json!({ "deleted": true }))
}
