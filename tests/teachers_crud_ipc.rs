
use chrono::Datelike;
use serde_json::json;
use test_support::{error_code, request, request_ok, select_workspace, spawn_sidecar, temp_dir};

#[test]
fn teachers_use_their_own_identifier_namespace() {
    let workspace = temp_dir("halqad-teachers-ns");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    // A student in the same workspace must not advance the teacher sequence.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "students.create",
        json!({ "firstName": "Ahmad", "lastName": "Hassan", "gender": "male" }),
    );

    let year = chrono::Local::now().year();
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "t1",
        "teachers.create",
        json!({
            "firstName": "Ustadh",
            "lastName": "Kareem",
            "gender": "male",
            "phone": "0711111111",
            "specialization": "tajweed"
        }),
    );
    assert_eq!(
        created.get("teacherId").and_then(|v| v.as_str()),
        Some(format!("TCH-{}-0001", year).as_str())
    );
}

#[test]
fn teacher_update_get_and_delete_roundtrip() {
    let workspace = temp_dir("halqad-teachers-crud");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "t1",
        "teachers.create",
        json!({
            "firstName": "Aisha",
            "lastName": "Rahman",
            "gender": "female",
            "phone": "0722222222"
        }),
    );
    let id = created
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "t2",
        "teachers.update",
        json!({ "teacherId": id, "salary": 850.0, "status": "inactive" }),
    );
    assert_eq!(updated.get("salary").and_then(|v| v.as_f64()), Some(850.0));
    assert_eq!(
        updated.get("status").and_then(|v| v.as_str()),
        Some("inactive")
    );
    assert!(updated.get("updatedAt").and_then(|v| v.as_str()).is_some());

    let inactive = request_ok(
        &mut stdin,
        &mut reader,
        "t3",
        "teachers.list",
        json!({ "status": "inactive" }),
    );
    assert_eq!(
        inactive
            .get("teachers")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "t4",
        "teachers.delete",
        json!({ "teacherId": id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "t5",
        "teachers.get",
        json!({ "teacherId": id }),
    );
    assert_eq!(gone.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&gone), Some("not_found"));
}

#[test]
fn identifier_is_never_recycled_after_delete() {
    let workspace = temp_dir("halqad-teachers-norecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let year = chrono::Local::now().year();
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "t1",
        "teachers.create",
        json!({ "firstName": "A", "lastName": "B", "gender": "male", "phone": "1" }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "t2",
        "teachers.create",
        json!({ "firstName": "C", "lastName": "D", "gender": "male", "phone": "2" }),
    );
    let first_id = first.get("teacherId").and_then(|v| v.as_str()).unwrap();
    assert_eq!(first_id, format!("TCH-{}-0001", year));
    assert_eq!(
        second.get("teacherId").and_then(|v| v.as_str()),
        Some(format!("TCH-{}-0002", year).as_str())
    );

    // Deleting 0001 leaves a gap; the next allocation continues from the max.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "t3",
        "teachers.delete",
        json!({ "teacherId": first_id }),
    );
    let third = request_ok(
        &mut stdin,
        &mut reader,
        "t4",
        "teachers.create",
        json!({ "firstName": "E", "lastName": "F", "gender": "female", "phone": "3" }),
    );
    assert_eq!(
        third.get("teacherId").and_then(|v| v.as_str()),
        Some(format!("TCH-{}-0003", year).as_str())
    );
}
