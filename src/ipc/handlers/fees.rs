use rusqlite::{params, types::Value as SqlValue, Connection, OptionalExtension};
use serde_json::json;

use crate::fees::derive_status;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_opt_f64, get_opt_str, get_required_f64, get_required_str, now_iso, require_db,
};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "fees.list" => handle_list(state, req),
        "fees.get" => handle_get(state, req),
        "fees.create" => handle_create(state, req),
        "fees.recordPayment" => handle_record_payment(state, req),
        "fees.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(match out {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

const FEE_COLS: &str = "id, student_id, fee_type, amount, period, due_date, paid_date, status,
     paid_amount, payment_method, receipt_number, notes, created_at, updated_at";

fn row_to_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "feeId": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "feeType": r.get::<_, String>(2)?,
        "amount": r.get::<_, f64>(3)?,
        "period": r.get::<_, Option<String>>(4)?,
        "dueDate": r.get::<_, Option<String>>(5)?,
        "paidDate": r.get::<_, Option<String>>(6)?,
        "status": r.get::<_, String>(7)?,
        "paidAmount": r.get::<_, f64>(8)?,
        "paymentMethod": r.get::<_, Option<String>>(9)?,
        "receiptNumber": r.get::<_, Option<String>>(10)?,
        "notes": r.get::<_, Option<String>>(11)?,
        "createdAt": r.get::<_, String>(12)?,
        "updatedAt": r.get::<_, Option<String>>(13)?,
    }))
}

fn fetch_fee(conn: &Connection, id: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM fees WHERE id = ?1", FEE_COLS),
        [id],
        row_to_json,
    )
    .optional()
    .map_err(HandlerErr::db)
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut sql = format!("SELECT {} FROM fees", FEE_COLS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();

    if let Some(student_id) = get_opt_str(&req.params, "studentId") {
        clauses.push("student_id = ?");
        args.push(SqlValue::Text(student_id));
    }
    if let Some(status) = get_opt_str(&req.params, "status") {
        clauses.push("status = ?");
        args.push(SqlValue::Text(status));
    }
    if let Some(fee_type) = get_opt_str(&req.params, "feeType") {
        clauses.push("fee_type = ?");
        args.push(SqlValue::Text(fee_type));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db)?;
    let fees = stmt
        .query_map(rusqlite::params_from_iter(args), row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(json!({ "fees": fees }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "feeId")?;
    fetch_fee(conn, &id)?.ok_or_else(|| HandlerErr::not_found("fee"))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let student_id = get_required_str(p, "studentId")?;
    let fee_type = get_required_str(p, "feeType")?;
    let amount = get_required_f64(p, "amount")?;
    if fee_type == "tuition" && get_opt_str(p, "period").is_none() {
        return Err(HandlerErr::bad_params("tuition fees require a period"));
    }

    let student_exists = conn
        .query_row("SELECT 1 FROM students WHERE id = ?1", [&student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::db)?
        .is_some();
    if !student_exists {
        return Err(HandlerErr::not_found("student"));
    }

    let now = now_iso();
    let payment_method = get_opt_str(p, "paymentMethod");
    // Creating with a payment method records payment in full up front.
    let (paid_amount, paid_date) = if payment_method.is_some() {
        (get_opt_f64(p, "paidAmount").unwrap_or(amount), Some(now.clone()))
    } else {
        (get_opt_f64(p, "paidAmount").unwrap_or(0.0), None)
    };
    let status = derive_status(amount, paid_amount).as_str();

    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO fees(
            id, student_id, fee_type, amount, period, due_date, paid_date, status,
            paid_amount, payment_method, receipt_number, notes, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            id,
            student_id,
            fee_type,
            amount,
            get_opt_str(p, "period"),
            get_opt_str(p, "dueDate"),
            paid_date,
            status,
            paid_amount,
            payment_method,
            get_opt_str(p, "receiptNumber"),
            get_opt_str(p, "notes"),
            now,
        ],
    )
    .map_err(HandlerErr::db)?;

    fetch_fee(conn, &id)?.ok_or_else(|| HandlerErr::not_found("fee"))
}

fn handle_record_payment(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let id = get_required_str(p, "feeId")?;
    let paid_amount = get_required_f64(p, "paidAmount")?;
    if paid_amount < 0.0 {
        return Err(HandlerErr::bad_params("paidAmount must not be negative"));
    }

    let amount: f64 = conn
        .query_row("SELECT amount FROM fees WHERE id = ?1", [&id], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::db)?
        .ok_or_else(|| HandlerErr::not_found("fee"))?;

    // paidAmount is the new running total; status falls out of the amounts.
    let status = derive_status(amount, paid_amount);
    let now = now_iso();
    let paid_date = if paid_amount > 0.0 { Some(now.clone()) } else { None };

    conn.execute(
        "UPDATE fees SET paid_amount = ?1, status = ?2, paid_date = ?3,
            payment_method = COALESCE(?4, payment_method),
            receipt_number = COALESCE(?5, receipt_number),
            updated_at = ?6
         WHERE id = ?7",
        params![
            paid_amount,
            status.as_str(),
            paid_date,
            get_opt_str(p, "paymentMethod"),
            get_opt_str(p, "receiptNumber"),
            now,
            id,
        ],
    )
    .map_err(HandlerErr::db)?;

    fetch_fee(conn, &id)?.ok_or_else(|| HandlerErr::not_found("fee"))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "feeId")?;
    let changed = conn
        .execute("DELETE FROM fees WHERE id = ?1", [&id])
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("fee"));
    }
    Ok(json!({ "deleted": true }))
}
