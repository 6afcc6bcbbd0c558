use rusqlite::{params, types::Value as SqlValue, Connection, OptionalExtension};
use serde_json::json;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_opt_i64, get_opt_str, get_required_i64, get_required_str, now_iso, require_db,
};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "progress.list" => handle_list(state, req),
        "progress.get" => handle_get(state, req),
        "progress.create" => handle_create(state, req),
        "progress.update" => handle_update(state, req),
        "progress.review" => handle_review(state, req),
        "progress.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(match out {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

const PROGRESS_COLS: &str = "id, student_id, teacher_id, surah, from_ayah, to_ayah, status,
     memorization_date, review_count, last_review_date, notes, grade, created_at, updated_at";

fn row_to_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "progressId": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "teacherId": r.get::<_, String>(2)?,
        "surah": r.get::<_, String>(3)?,
        "fromAyah": r.get::<_, i64>(4)?,
        "toAyah": r.get::<_, i64>(5)?,
        "status": r.get::<_, String>(6)?,
        "memorizationDate": r.get::<_, Option<String>>(7)?,
        "reviewCount": r.get::<_, i64>(8)?,
        "lastReviewDate": r.get::<_, Option<String>>(9)?,
        "notes": r.get::<_, Option<String>>(10)?,
        "grade": r.get::<_, Option<String>>(11)?,
        "createdAt": r.get::<_, String>(12)?,
        "updatedAt": r.get::<_, Option<String>>(13)?,
    }))
}

fn fetch_entry(conn: &Connection, id: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM quran_progress WHERE id = ?1", PROGRESS_COLS),
        [id],
        row_to_json,
    )
    .optional()
    .map_err(HandlerErr::db)
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut sql = format!("SELECT {} FROM quran_progress", PROGRESS_COLS);
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();

    if let Some(student_id) = get_opt_str(&req.params, "studentId") {
        clauses.push("student_id = ?");
        args.push(SqlValue::Text(student_id));
    }
    if let Some(teacher_id) = get_opt_str(&req.params, "teacherId") {
        clauses.push("teacher_id = ?");
        args.push(SqlValue::Text(teacher_id));
    }
    if let Some(status) = get_opt_str(&req.params, "status") {
        clauses.push("status = ?");
        args.push(SqlValue::Text(status));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db)?;
    let entries = stmt
        .query_map(rusqlite::params_from_iter(args), row_to_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(json!({ "entries": entries }))
}

fn handle_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "progressId")?;
    fetch_entry(conn, &id)?.ok_or_else(|| HandlerErr::not_found("progress entry"))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let student_id = get_required_str(p, "studentId")?;
    let teacher_id = get_required_str(p, "teacherId")?;
    let surah = get_required_str(p, "surah")?;
    let from_ayah = get_required_i64(p, "fromAyah")?;
    let to_ayah = get_required_i64(p, "toAyah")?;
    if from_ayah < 1 || to_ayah < from_ayah {
        return Err(HandlerErr::bad_params("ayah range is invalid"));
    }

    for (table, id, what) in [
        ("students", &student_id, "student"),
        ("teachers", &teacher_id, "teacher"),
    ] {
        let exists = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", table),
                [id],
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map_err(HandlerErr::db)?
            .is_some();
        if !exists {
            return Err(HandlerErr::not_found(what));
        }
    }

    let status = get_opt_str(p, "status").unwrap_or_else(|| "in-progress".to_string());
    let memorization_date = if status == "memorized" {
        get_opt_str(p, "memorizationDate").or_else(|| Some(now_iso()))
    } else {
        get_opt_str(p, "memorizationDate")
    };

    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO quran_progress(
            id, student_id, teacher_id, surah, from_ayah, to_ayah, status,
            memorization_date, notes, grade, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            student_id,
            teacher_id,
            surah,
            from_ayah,
            to_ayah,
            status,
            memorization_date,
            get_opt_str(p, "notes"),
            get_opt_str(p, "grade"),
            now_iso(),
        ],
    )
    .map_err(HandlerErr::db)?;

    fetch_entry(conn, &id)?.ok_or_else(|| HandlerErr::not_found("progress entry"))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let id = get_required_str(p, "progressId")?;

    let mut sets: Vec<String> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();
    for (key, col) in [
        ("surah", "surah"),
        ("status", "status"),
        ("memorizationDate", "memorization_date"),
        ("notes", "notes"),
        ("grade", "grade"),
    ] {
        if let Some(v) = get_opt_str(p, key) {
            sets.push(format!("{} = ?", col));
            args.push(SqlValue::Text(v));
        }
    }
    for (key, col) in [("fromAyah", "from_ayah"), ("toAyah", "to_ayah")] {
        if let Some(v) = get_opt_i64(p, key) {
            sets.push(format!("{} = ?", col));
            args.push(SqlValue::Integer(v));
        }
    }
    if sets.is_empty() {
        return Err(HandlerErr::bad_params("no updatable fields supplied"));
    }
    sets.push("updated_at = ?".to_string());
    args.push(SqlValue::Text(now_iso()));
    args.push(SqlValue::Text(id.clone()));

    let sql = format!("UPDATE quran_progress SET {} WHERE id = ?", sets.join(", "));
    let changed = conn
        .execute(&sql, rusqlite::params_from_iter(args))
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("progress entry"));
    }
    fetch_entry(conn, &id)?.ok_or_else(|| HandlerErr::not_found("progress entry"))
}

fn handle_review(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let p = &req.params;
    let id = get_required_str(p, "progressId")?;
    let now = now_iso();
    let changed = conn
        .execute(
            "UPDATE quran_progress SET review_count = review_count + 1,
                last_review_date = ?1, grade = COALESCE(?2, grade), updated_at = ?1
             WHERE id = ?3",
            params![now, get_opt_str(p, "grade"), id],
        )
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("progress entry"));
    }
    fetch_entry(conn, &id)?.ok_or_else(|| HandlerErr::not_found("progress entry"))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "progressId")?;
    let changed = conn
        .execute("DELETE FROM quran_progress WHERE id = ?1", [&id])
        .map_err(HandlerErr::db)?;
    if changed == 0 {
        return Err(HandlerErr::not_found("progress entry"));
    }
    Ok(json!({ "deleted": true }))
}
