use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_trackitd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn trackitd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    principal: serde_json::Value,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
        "principal": principal,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn admin() -> serde_json::Value {
    json!({ "id": "admin-1", "name": "Administrator", "role": "admin" })
}

fn principal(id: &str, role: &str) -> serde_json::Value {
    json!({ "id": id, "name": id, "role": role })
}

fn register(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    email: &str,
    role: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        id,
        "users.register",
        json!(null),
        json!({ "name": name, "email": email, "password": "pw", "role": role }),
    );
    result
        .get("userId")
        .and_then(|v| v.as_str())
        .expect("userId")
        .to_string()
}

fn counts(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    class_code: &str,
) -> (u64, u64) {
    let result = request_ok(
        stdin,
        reader,
        id,
        "classes.counts",
        admin(),
        json!({ "classCode": class_code }),
    );
    (
        result
            .get("studentCount")
            .and_then(|v| v.as_u64())
            .expect("studentCount"),
        result
            .get("teacherCount")
            .and_then(|v| v.as_u64())
            .expect("teacherCount"),
    )
}

#[test]
fn counts_are_zero_for_empty_or_missing_classes() {
    let workspace = temp_dir("trackit-counts-zero");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!(null),
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        admin(),
        json!({ "classCode": "EMPTY10", "subjectName": "Nothing Yet" }),
    );

    assert_eq!(counts(&mut stdin, &mut reader, "3", "EMPTY10"), (0, 0));
    // A class nobody created reads the same way, never as an error.
    assert_eq!(counts(&mut stdin, &mut reader, "4", "NOPE999"), (0, 0));

    // The section list mirrors that tolerance.
    let sections = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sections.list",
        admin(),
        json!({ "classCode": "NOPE999" }),
    );
    assert_eq!(
        sections.get("sections").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn counts_sum_students_across_sections_and_assigned_teachers() {
    let workspace = temp_dir("trackit-counts-sum");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!(null),
        json!({ "path": workspace.to_string_lossy() }),
    );
    let teacher_id = register(&mut stdin, &mut reader, "2", "Grace", "grace@counts.test", "teacher");
    let s1 = register(&mut stdin, &mut reader, "3", "Ada", "ada@counts.test", "student");
    let s2 = register(&mut stdin, &mut reader, "4", "Alan", "alan@counts.test", "student");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.create",
        admin(),
        json!({ "classCode": "CSE402", "subjectName": "Networks", "sections": ["A", "B"] }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "classes.attach",
        principal(&teacher_id, "teacher"),
        json!({ "classCode": "CSE402", "section": "A" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "sections.join",
        principal(&s1, "student"),
        json!({ "classCode": "CSE402", "section": "A" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "sections.join",
        principal(&s2, "student"),
        json!({ "classCode": "CSE402", "section": "B" }),
    );

    // Two students over two sections, one section with a teacher.
    assert_eq!(counts(&mut stdin, &mut reader, "9", "CSE402"), (2, 1));

    let _ = std::fs::remove_dir_all(workspace);
}
