use rusqlite::{params, types::Value as SqlValue, Connection, OptionalExtension};
use serde_json::json;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_opt_i64, get_opt_str, get_required_str, now_iso, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store::{classify_insert, InsertError};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "halqas.list" => handle_list(state, req),
        "halqas.get" => handle_get(state, req),
        "halqas.create" => handle_create(state, req),
        "halqas.update" => handle_update(state, req),
        "halqas.delete" => handle_delete(state, req),
        "halqas.addStudent" => handle_add_student(state, req),
        "halqas.removeStudent" => handle_remove_student(state, req),
        _ => return None,
    };
    Some(match out {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

const HALQA_COLS: &str = "id, name, description, teacher_id, schedule_days, start_time, end_time,
     location, status, max_students, created_at, updated_at";

fn row_to_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    // schedule_days is stored as a JSON array of weekday names.
    let days: serde_json::Value = r
        .get::<_, Option<String>>(4)?
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_else(|| json!([]));
    Ok(json!({
        "halqaId": r.get::<_, String>(0)?,
        "name": r.get::<_, String>(1)?,
        "description": r.get::<_, Option<String>>(2)?,
        "teacherId": r.get::<_, String>(3)?,
        "scheduleDays": days,
        "startTime": r.get::<_, Option<String>>(5)?,
        "endTime": r.get::<_, Option<String>>(6)?,
        "location": r.get::<_, Option<String>>(7)?,
        "status": r.get::<_, String>(8)?,
        "maxStudents": r.get::<_, i64>(9)?,
        "createdAt": r.get::<_, String>(10)?,
        "updatedAt": r.get::<_, Option<String>>(11)?,
    }))
}

fn roster(conn: &Connection, halqa_id: &str) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT student_id FROM halqa_students WHERE halqa_id = ?1 ORDER BY student_id")
        .map_err(HandlerErr::db)?;
    stmt.query_map([halqa_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)
}

fn fetch_halqa(conn: &Connection, id: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    let halqa = conn
        .query_row(
            &format!("SELECT {} FROM halqas WHERE id = ?1", HALQA_COLS),
            [id],
            row_to_json,
        )
        .optional()
        .map_err(HandlerErr::db)?;
    let Some(mut halqa) = halqa else {
        return Ok(None);
    };
    halqa["studentIds"] = json!(roster(conn, id)?);
    Ok(Some(halqa))
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut sql = format!("SELECT {} FROM halqas", HALQA_COLS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();

    if let Some(status) = get_opt_str(&req.params, "status") {
        clauses.push("status = ?");
        args.push(SqlValue::Text(status));
    }
    if let Some(teacher_id) = get_opt_str(&req.params, "teacherId") {
        clauses.push("teacher_id = ?");
        args.push(SqlValue::Text(teacher_id));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db)?;
    let mut halqas = stmt
        .query_map(rusqlite::params_from_iter(args), row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    for halqa in &mut halqas {
        let id = halqa["halqaId"].as_str().unwrap_or_default().to_string();
        let students = roster(conn, &id)?;
        halqa["studentCount"] = json!(students.len());
        halqa["studentIds"] = json!(students);
    }
    Ok(json!({ "halqas": halqas }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "halqaId")?;
    fetch_halqa(conn, &id)?.ok_or_else(|| HandlerErr::not_found("halqa"))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let name = get_required_str(p, "name")?;
    let teacher_id = get_required_str(p, "teacherId")?;

    let teacher_exists = conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?1", [&teacher_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::db)?
        .is_some();
    if !teacher_exists {
        return Err(HandlerErr::not_found("teacher"));
    }

    let schedule_days = p
        .get("scheduleDays")
        .filter(|v| v.is_array())
        .map(|v| v.to_string());
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO halqas(
            id, name, description, teacher_id, schedule_days, start_time, end_time,
            location, status, max_students, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            name,
            get_opt_str(p, "description"),
            teacher_id,
            schedule_days,
            get_opt_str(p, "startTime"),
            get_opt_str(p, "endTime"),
            get_opt_str(p, "location"),
            get_opt_str(p, "status").unwrap_or_else(|| "active".to_string()),
            get_opt_i64(p, "maxStudents").unwrap_or(30),
            now_iso(),
        ],
    )
    .map_err(HandlerErr::db)?;

    fetch_halqa(conn, &id)?.ok_or_else(|| HandlerErr::not_found("halqa"))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let id = get_required_str(p, "halqaId")?;

    let mut sets: Vec<String> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();
    for (key, col) in [
        ("name", "name"),
        ("description", "description"),
        ("teacherId", "teacher_id"),
        ("startTime", "start_time"),
        ("endTime", "end_time"),
        ("location", "location"),
        ("status", "status"),
    ] {
        if let Some(v) = get_opt_str(p, key) {
            sets.push(format!("{} = ?", col));
            args.push(SqlValue::Text(v));
        }
    }
    if let Some(days) = p.get("scheduleDays").filter(|v| v.is_array()) {
        sets.push("schedule_days = ?".to_string());
        args.push(SqlValue::Text(days.to_string()));
    }
    if let Some(max) = get_opt_i64(p, "maxStudents") {
        sets.push("max_students = ?".to_string());
        args.push(SqlValue::Integer(max));
    }
    if sets.is_empty() {
        return Err(HandlerErr::bad_params("no updatable fields supplied"));
    }
    sets.push("updated_at = ?".to_string());
    args.push(SqlValue::Text(now_iso()));
    args.push(SqlValue::Text(id.clone()));

    let sql = format!("UPDATE halqas SET {} WHERE id = ?", sets.join(", "));
    let changed = conn
        .execute(&sql, rusqlite::params_from_iter(args))
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("halqa"));
    }
    fetch_halqa(conn, &id)?.ok_or_else(|| HandlerErr::not_found("halqa"))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "halqaId")?;
    conn.execute("DELETE FROM halqa_students WHERE halqa_id = ?1", [&id])
        .map_err(HandlerErr::db)?;
    let changed = conn
        .execute("DELETE FROM halqas WHERE id = ?1", [&id])
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("halqa"));
    }
    Ok(json!({ "deleted": true }))
}

fn handle_add_student(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let halqa_id = get_required_str(&req.params, "halqaId")?;
    let student_id = get_required_str(&req.params, "studentId")?;

    let max_students = conn
        .query_row(
            "SELECT max_students FROM halqas WHERE id = ?1",
            [&halqa_id],
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(HandlerErr::db)?
        .ok_or_else(|| HandlerErr::not_found("halqa"))?;

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

    let enrolled: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM halqa_students WHERE halqa_id = ?1",
            [&halqa_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;
    if enrolled >= max_students {
        return Err(HandlerErr::new("halqa_full", "halqa is at capacity"));
    }

    let res = conn.execute(
        "INSERT INTO halqa_students(halqa_id, student_id) VALUES (?1, ?2)",
        params![halqa_id, student_id],
    );
    if let Err(e) = res {
        return Err(match classify_insert(e) {
            InsertError::Conflict => {
                HandlerErr::new("already_enrolled", "student already in this halqa")
            }
            InsertError::Db(e) => HandlerErr::db(e),
        });
    }

    fetch_halqa(conn, &halqa_id)?.ok_or_else(|| HandlerErr::not_found("halqa"))
}

fn handle_remove_student(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let halqa_id = get_required_str(&req.params, "halqaId")?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let changed = conn
        .execute(
            "DELETE FROM halqa_students WHERE halqa_id = ?1 AND student_id = ?2",
            params![halqa_id, student_id],
        )
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("enrollment"));
    }
    fetch_halqa(conn, &halqa_id)?.ok_or_else(|| HandlerErr::not_found("halqa"))
}
