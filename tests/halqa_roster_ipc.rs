
use serde_json::json;
use test_support::{error_code, request, request_ok, select_workspace, spawn_sidecar, temp_dir};

fn create_student(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    id: &str,
    first: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "students.create",
        json!({ "firstName": first, "lastName": "Ali", "gender": "male" }),
    );
    created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string()
}

#[test]
fn roster_enforces_capacity_and_membership() {
    let workspace = temp_dir("halqad-roster");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "t1",
        "teachers.create",
        json!({ "firstName": "Hamza", "lastName": "Idris", "gender": "male", "phone": "07" }),
    );
    let teacher_id = teacher
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();

    let halqa = request_ok(
        &mut stdin,
        &mut reader,
        "h1",
        "halqas.create",
        json!({
            "name": "Morning Halqa",
            "teacherId": teacher_id,
            "scheduleDays": ["monday", "wednesday"],
            "maxStudents": 2
        }),
    );
    let halqa_id = halqa
        .get("halqaId")
        .and_then(|v| v.as_str())
        .expect("halqaId")
        .to_string();
    assert_eq!(
        halqa.get("scheduleDays").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    let s1 = create_student(&mut stdin, &mut reader, "s1", "Omar");
    let s2 = create_student(&mut stdin, &mut reader, "s2", "Salim");
    let s3 = create_student(&mut stdin, &mut reader, "s3", "Anas");

    let after_first = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "halqas.addStudent",
        json!({ "halqaId": halqa_id, "studentId": s1 }),
    );
    assert_eq!(
        after_first
            .get("studentIds")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let dup = request(
        &mut stdin,
        &mut reader,
        "a2",
        "halqas.addStudent",
        json!({ "halqaId": halqa_id, "studentId": s1 }),
    );
    assert_eq!(error_code(&dup), Some("already_enrolled"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "a3",
        "halqas.addStudent",
        json!({ "halqaId": halqa_id, "studentId": s2 }),
    );
    let full = request(
        &mut stdin,
        &mut reader,
        "a4",
        "halqas.addStudent",
        json!({ "halqaId": halqa_id, "studentId": s3 }),
    );
    assert_eq!(error_code(&full), Some("halqa_full"));

    let after_remove = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "halqas.removeStudent",
        json!({ "halqaId": halqa_id, "studentId": s1 }),
    );
    assert_eq!(
        after_remove
            .get("studentIds")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    // Freed seat can be filled again.
    let refilled = request_ok(
        &mut stdin,
        &mut reader,
        "a5",
        "halqas.addStudent",
        json!({ "halqaId": halqa_id, "studentId": s3 }),
    );
    assert_eq!(
        refilled
            .get("studentIds")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(2)
    );
}

#[test]
fn halqa_requires_an_existing_teacher() {
    let workspace = temp_dir("halqad-roster-noteacher");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let missing = request(
        &mut stdin,
        &mut reader,
        "h1",
        "halqas.create",
        json!({ "name": "Orphan Halqa", "teacherId": "TCH-2020-0099" }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));
}

#[test]
fn halqa_list_reports_roster_counts() {
    let workspace = temp_dir("halqad-roster-list");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "t1",
        "teachers.create",
        json!({ "firstName": "Zayd", "lastName": "Musa", "gender": "male", "phone": "07" }),
    );
    let teacher_id = teacher
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();
    let halqa = request_ok(
        &mut stdin,
        &mut reader,
        "h1",
        "halqas.create",
        json!({ "name": "Evening Halqa", "teacherId": teacher_id }),
    );
    let halqa_id = halqa
        .get("halqaId")
        .and_then(|v| v.as_str())
        .expect("halqaId")
        .to_string();
    let s1 = create_student(&mut stdin, &mut reader, "s1", "Tariq");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "halqas.addStudent",
        json!({ "halqaId": halqa_id, "studentId": s1 }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "l1", "halqas.list", json!({}));
    let rows = listed
        .get("halqas")
        .and_then(|v| v.as_array())
        .expect("halqas array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("studentCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(rows[0].get("maxStudents").and_then(|v| v.as_i64()), Some(30));
}
