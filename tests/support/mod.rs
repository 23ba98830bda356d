#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

/// A running `schoold` process driven over stdin/stdout.
pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_schoold");
        let mut child = Command::new(exe)
            .env_remove("SCHOOLD_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn schoold");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns a sidecar with a fresh workspace already selected.
    pub fn with_workspace(prefix: &str) -> (Self, PathBuf) {
        let workspace = temp_dir(prefix);
        let mut sidecar = Self::spawn();
        sidecar.call(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        (sidecar, workspace)
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    /// Sends one request and returns the whole response envelope.
    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        let resp = self.send_raw(&payload.to_string());
        assert_eq!(resp.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        resp
    }

    /// Sends one request and returns `result`, failing the test on an error.
    pub fn call(&mut self, method: &str, params: Value) -> Value {
        let resp = self.request(method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            resp
        );
        resp.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Sends one request that must fail and returns its error code.
    pub fn call_err(&mut self, method: &str, params: Value) -> String {
        let resp = self.request(method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            resp
        );
        resp.pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

/// One class with a subject and an exam period, ready for marks entry.
pub struct ClassFixture {
    pub class_id: String,
    pub subject_ids: Vec<String>,
    pub exam_id: String,
}

pub fn class_with_subjects(sidecar: &mut Sidecar, subjects: &[(&str, f64)]) -> ClassFixture {
    let class = sidecar.call("classes.create", json!({ "name": "Grade 8", "section": "A" }));
    let class_id = str_field(&class, "classId");
    let subject_ids = subjects
        .iter()
        .map(|(name, total)| {
            let s = sidecar.call(
                "subjects.create",
                json!({ "classId": class_id, "name": name, "totalMarks": total }),
            );
            str_field(&s, "subjectId")
        })
        .collect();
    let exam = sidecar.call(
        "exams.create",
        json!({ "classId": class_id, "name": "Midterm", "monthYear": "March 2025" }),
    );
    ClassFixture {
        class_id,
        subject_ids,
        exam_id: str_field(&exam, "examMonthId"),
    }
}

pub fn add_student(sidecar: &mut Sidecar, class_id: &str, name: &str, roll: &str) -> String {
    let s = sidecar.call(
        "students.create",
        json!({ "classId": class_id, "name": name, "rollNumber": roll }),
    );
    str_field(&s, "studentId")
}

pub fn save_marks(
    sidecar: &mut Sidecar,
    subject_id: &str,
    exam_id: &str,
    entries: Value,
) -> Value {
    sidecar.call(
        "marks.saveBatch",
        json!({ "subjectId": subject_id, "examMonthId": exam_id, "entries": entries }),
    )
}
