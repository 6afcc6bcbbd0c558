use rusqlite::{params, types::Value as SqlValue, Connection, OptionalExtension};
use serde_json::json;

use crate::idgen::EntityKind;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    allocate_record_id, get_opt_f64, get_opt_str, get_required_str, now_iso, require_db,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{classify_insert, InsertError};

const INSERT_ATTEMPTS: u32 = 3;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "teachers.list" => handle_list(state, req),
        "teachers.get" => handle_get(state, req),
        "teachers.create" => handle_create(state, req),
        "teachers.update" => handle_update(state, req),
        "teachers.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(match out {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

const TEACHER_COLS: &str = "id, first_name, last_name, date_of_birth, gender, address, phone,
     email, qualification, specialization, hire_date, salary, status, photo, created_at,
     updated_at";

fn row_to_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "teacherId": r.get::<_, String>(0)?,
        "firstName": r.get::<_, String>(1)?,
        "lastName": r.get::<_, String>(2)?,
        "dateOfBirth": r.get::<_, Option<String>>(3)?,
        "gender": r.get::<_, String>(4)?,
        "address": r.get::<_, Option<String>>(5)?,
        "phone": r.get::<_, String>(6)?,
        "email": r.get::<_, Option<String>>(7)?,
        "qualification": r.get::<_, Option<String>>(8)?,
        "specialization": r.get::<_, Option<String>>(9)?,
        "hireDate": r.get::<_, String>(10)?,
        "salary": r.get::<_, Option<f64>>(11)?,
        "status": r.get::<_, String>(12)?,
        "photo": r.get::<_, Option<String>>(13)?,
        "createdAt": r.get::<_, String>(14)?,
        "updatedAt": r.get::<_, Option<String>>(15)?,
    }))
}

fn fetch_teacher(conn: &Connection, id: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM teachers WHERE id = ?1", TEACHER_COLS),
        [id],
        row_to_json,
    )
    .optional()
    .map_err(HandlerErr::db)
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut sql = format!("SELECT {} FROM teachers", TEACHER_COLS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();

    if let Some(status) = get_opt_str(&req.params, "status") {
        clauses.push("status = ?");
        args.push(SqlValue::Text(status));
    }
    if let Some(spec) = get_opt_str(&req.params, "specialization") {
        clauses.push("specialization = ?");
        args.push(SqlValue::Text(spec));
    }
    if let Some(search) = get_opt_str(&req.params, "search") {
        clauses.push("(first_name LIKE ? OR last_name LIKE ? OR id LIKE ?)");
        let needle = format!("%{}%", search);
        args.push(SqlValue::Text(needle.clone()));
        args.push(SqlValue::Text(needle.clone()));
        args.push(SqlValue::Text(needle));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db)?;
    let teachers = stmt
        .query_map(rusqlite::params_from_iter(args), row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(json!({ "teachers": teachers }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "teacherId")?;
    fetch_teacher(conn, &id)?.ok_or_else(|| HandlerErr::not_found("teacher"))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;

    let first_name = get_required_str(p, "firstName")?;
    let last_name = get_required_str(p, "lastName")?;
    let gender = get_required_str(p, "gender")?;
    let phone = get_required_str(p, "phone")?;
    let now = now_iso();
    let hire_date = get_opt_str(p, "hireDate").unwrap_or_else(|| now.clone());
    let status = get_opt_str(p, "status").unwrap_or_else(|| "active".to_string());
    let explicit_id = get_opt_str(p, "teacherId");

    let mut attempt = 0;
    loop {
        attempt += 1;
        let id = match &explicit_id {
            Some(id) => id.clone(),
            None => allocate_record_id(conn, EntityKind::Teacher)?,
        };

        let res = conn.execute(
            "INSERT INTO teachers(
                id, first_name, last_name, date_of_birth, gender, address, phone, email,
                qualification, specialization, hire_date, salary, status, photo, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                id,
                first_name,
                last_name,
                get_opt_str(p, "dateOfBirth"),
                gender,
                get_opt_str(p, "address"),
                phone,
                get_opt_str(p, "email"),
                get_opt_str(p, "qualification"),
                get_opt_str(p, "specialization"),
                hire_date,
                get_opt_f64(p, "salary"),
                status,
                get_opt_str(p, "photo"),
                now,
            ],
        );

        match res {
            Ok(_) => {
                return fetch_teacher(conn, &id)?.ok_or_else(|| HandlerErr::not_found("teacher"))
            }
            Err(e) => match classify_insert(e) {
                InsertError::Conflict if explicit_id.is_none() && attempt < INSERT_ATTEMPTS => {
                    tracing::warn!(%id, "teacher identifier claimed concurrently; reallocating");
                    continue;
                }
                InsertError::Conflict => {
                    return Err(HandlerErr::new(
                        "id_conflict",
                        format!("teacher id {} already exists", id),
                    ));
                }
                InsertError::Db(e) => return Err(HandlerErr::db(e)),
            },
        }
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let id = get_required_str(p, "teacherId")?;

    let mut sets: Vec<String> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();
    for (key, col) in [
        ("firstName", "first_name"),
        ("lastName", "last_name"),
        ("dateOfBirth", "date_of_birth"),
        ("gender", "gender"),
        ("address", "address"),
        ("phone", "phone"),
        ("email", "email"),
        ("qualification", "qualification"),
        ("specialization", "specialization"),
        ("hireDate", "hire_date"),
        ("status", "status"),
        ("photo", "photo"),
    ] {
        if let Some(v) = get_opt_str(p, key) {
            sets.push(format!("{} = ?", col));
            args.push(SqlValue::Text(v));
        }
    }
    if let Some(salary) = get_opt_f64(p, "salary") {
        sets.push("salary = ?".to_string());
        args.push(SqlValue::Real(salary));
    }
    if sets.is_empty() {
        return Err(HandlerErr::bad_params("no updatable fields supplied"));
    }
    sets.push("updated_at = ?".to_string());
    args.push(SqlValue::Text(now_iso()));
    args.push(SqlValue::Text(id.clone()));

    let sql = format!("UPDATE teachers SET {} WHERE id = ?", sets.join(", "));
    let changed = conn
        .execute(&sql, rusqlite::params_from_iter(args))
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("teacher"));
    }
    fetch_teacher(conn, &id)?.ok_or_else(|| HandlerErr::not_found("teacher"))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "teacherId")?;
    let changed = conn
        .execute("DELETE FROM teachers WHERE id = ?1", [&id])
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("teacher"));
    }
    Ok(json!({ "deleted": true }))
}
