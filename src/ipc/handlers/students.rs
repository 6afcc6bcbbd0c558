use rusqlite::{params, types::Value as SqlValue, Connection, OptionalExtension};
use serde_json::json;

use crate::idgen::EntityKind;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    allocate_record_id, get_opt_str, get_required_str, now_iso, require_db,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{classify_insert, InsertError};

/// Outer bound on allocate→insert rounds. Allocation's own retries only
/// cover collisions visible at check time; this loop covers claims that
/// land between the check and our insert.
const INSERT_ATTEMPTS: u32 = 3;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "students.list" => handle_list(state, req),
        "students.get" => handle_get(state, req),
        "students.create" => handle_create(state, req),
        "students.update" => handle_update(state, req),
        "students.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(match out {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

const STUDENT_COLS: &str = "id, first_name, last_name, date_of_birth, gender, address, phone,
     email, parent_name, parent_phone, parent_email, enrollment_date, class, status, photo,
     created_at, updated_at";

fn row_to_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "studentId": r.get::<_, String>(0)?,
        "firstName": r.get::<_, String>(1)?,
        "lastName": r.get::<_, String>(2)?,
        "dateOfBirth": r.get::<_, Option<String>>(3)?,
        "gender": r.get::<_, String>(4)?,
        "address": r.get::<_, Option<String>>(5)?,
        "phone": r.get::<_, Option<String>>(6)?,
        "email": r.get::<_, Option<String>>(7)?,
        "parentName": r.get::<_, Option<String>>(8)?,
        "parentPhone": r.get::<_, Option<String>>(9)?,
        "parentEmail": r.get::<_, Option<String>>(10)?,
        "enrollmentDate": r.get::<_, String>(11)?,
        "class": r.get::<_, Option<String>>(12)?,
        "status": r.get::<_, String>(13)?,
        "photo": r.get::<_, Option<String>>(14)?,
        "createdAt": r.get::<_, String>(15)?,
        "updatedAt": r.get::<_, Option<String>>(16)?,
    }))
}

fn fetch_student(conn: &Connection, id: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?1", STUDENT_COLS),
        [id],
        row_to_json,
    )
    .optional()
    .map_err(HandlerErr::db)
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut sql = format!("SELECT {} FROM students", STUDENT_COLS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();

    if let Some(status) = get_opt_str(&req.params, "status") {
        clauses.push("status = ?");
        args.push(SqlValue::Text(status));
    }
    if let Some(class) = get_opt_str(&req.params, "class") {
        clauses.push("class = ?");
        args.push(SqlValue::Text(class));
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
    let students = stmt
        .query_map(rusqlite::params_from_iter(args), row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(json!({ "students": students }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "studentId")?;
    fetch_student(conn, &id)?.ok_or_else(|| HandlerErr::not_found("student"))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;

    let first_name = get_required_str(p, "firstName")?;
    let last_name = get_required_str(p, "lastName")?;
    let gender = get_required_str(p, "gender")?;
    let now = now_iso();
    let enrollment_date = get_opt_str(p, "enrollmentDate").unwrap_or_else(|| now.clone());
    let status = get_opt_str(p, "status").unwrap_or_else(|| "active".to_string());
    let explicit_id = get_opt_str(p, "studentId");

    let mut attempt = 0;
    loop {
        attempt += 1;
        let id = match &explicit_id {
            Some(id) => id.clone(),
            None => allocate_record_id(conn, EntityKind::Student)?,
        };

        let res = conn.execute(
            "INSERT INTO students(
                id, first_name, last_name, date_of_birth, gender, address, phone, email,
                parent_name, parent_phone, parent_email, enrollment_date, class, status,
                photo, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                id,
                first_name,
                last_name,
                get_opt_str(p, "dateOfBirth"),
                gender,
                get_opt_str(p, "address"),
                get_opt_str(p, "phone"),
                get_opt_str(p, "email"),
                get_opt_str(p, "parentName"),
                get_opt_str(p, "parentPhone"),
                get_opt_str(p, "parentEmail"),
                enrollment_date,
                get_opt_str(p, "class"),
                status,
                get_opt_str(p, "photo"),
                now,
            ],
        );

        match res {
            Ok(_) => {
                return fetch_student(conn, &id)?.ok_or_else(|| HandlerErr::not_found("student"))
            }
            Err(e) => match classify_insert(e) {
                InsertError::Conflict if explicit_id.is_none() && attempt < INSERT_ATTEMPTS => {
                    tracing::warn!(%id, "student identifier claimed concurrently; reallocating");
                    continue;
                }
                InsertError::Conflict => {
                    return Err(HandlerErr::new(
                        "id_conflict",
                        format!("student id {} already exists", id),
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
    let id = get_required_str(p, "studentId")?;

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
        ("parentName", "parent_name"),
        ("parentPhone", "parent_phone"),
        ("parentEmail", "parent_email"),
        ("enrollmentDate", "enrollment_date"),
        ("class", "class"),
        ("status", "status"),
        ("photo", "photo"),
    ] {
        if let Some(v) = get_opt_str(p, key) {
            sets.push(format!("{} = ?", col));
            args.push(SqlValue::Text(v));
        }
    }
    if sets.is_empty() {
        return Err(HandlerErr::bad_params("no updatable fields supplied"));
    }
    sets.push("updated_at = ?".to_string());
    args.push(SqlValue::Text(now_iso()));
    args.push(SqlValue::Text(id.clone()));

    let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
    let changed = conn
        .execute(&sql, rusqlite::params_from_iter(args))
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("student"));
    }
    fetch_student(conn, &id)?.ok_or_else(|| HandlerErr::not_found("student"))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "studentId")?;
    let changed = conn
        .execute("DELETE FROM students WHERE id = ?1", [&id])
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("student"));
    }
    Ok(json!({ "deleted": true }))
}
