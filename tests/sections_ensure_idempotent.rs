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

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    principal: serde_json::Value,
    params: serde_json::Value,
) -> String {
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
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

fn admin() -> serde_json::Value {
    json!({ "id": "admin-1", "name": "Administrator", "role": "admin" })
}

fn section_names(result: &serde_json::Value) -> Vec<String> {
    result
        .get("sections")
        .and_then(|v| v.as_array())
        .expect("sections array")
        .iter()
        .map(|v| v.as_str().expect("section name").to_string())
        .collect()
}

#[test]
fn ensure_section_is_idempotent() {
    let workspace = temp_dir("trackit-ensure");
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
        json!({ "classCode": "PHY200", "subjectName": "Physics", "sections": ["A"] }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "sections.ensure",
        admin(),
        json!({ "classCode": "PHY200", "section": "B" }),
    );
    assert_eq!(first.get("created").and_then(|v| v.as_bool()), Some(true));

    let after_first = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "sections.list",
        admin(),
        json!({ "classCode": "PHY200" }),
    );

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "sections.ensure",
        admin(),
        json!({ "classCode": "PHY200", "section": "B" }),
    );
    assert_eq!(second.get("created").and_then(|v| v.as_bool()), Some(false));

    let after_second = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "sections.list",
        admin(),
        json!({ "classCode": "PHY200" }),
    );
    assert_eq!(section_names(&after_first), vec!["A", "B"]);
    assert_eq!(section_names(&after_first), section_names(&after_second));

    // The empty section carries no teacher, so counts stay zero.
    let counts = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classes.counts",
        admin(),
        json!({ "classCode": "PHY200" }),
    );
    assert_eq!(counts.get("studentCount").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(counts.get("teacherCount").and_then(|v| v.as_u64()), Some(0));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn ensure_section_on_missing_class_is_not_found() {
    let workspace = temp_dir("trackit-ensure-missing");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!(null),
        json!({ "path": workspace.to_string_lossy() }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "sections.ensure",
        admin(),
        json!({ "classCode": "GHOST1", "section": "A" }),
    );
    assert_eq!(code, "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
