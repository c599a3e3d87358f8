use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_examd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn examd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "expected {} to fail, got: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error payload")
}

fn scenario_params() -> serde_json::Value {
    json!({
        "studentId": "stu-1",
        "studentCode": "K7Q2ZP",
        "studentName": "Dana Novak",
        "examAttempts": [
            { "examId": "mid", "examTitle": "Midterm", "finalScorePercentage": 65.0, "includeInPass": true, "passThreshold": 50.0 },
            { "examId": "fin", "examTitle": "Final", "finalScorePercentage": 85.0, "includeInPass": true, "passThreshold": 50.0 },
        ],
        "extraScores": { "homework": 75.0 },
        "extraFields": [
            { "key": "homework", "label": "Homework", "type": "number", "maxPoints": 100.0, "includeInPass": true, "passWeight": 0.3 },
        ],
        "settings": {
            "passCalcMode": "best",
            "overallPassThreshold": 70.0,
            "examWeight": 0.7,
            "examScoreSource": "final",
            "failOnAnyExam": false,
        },
    })
}

#[test]
fn best_mode_scenario_scores_eighty_two() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.studentScore",
        scenario_params(),
    );
    assert_eq!(result.get("studentId").and_then(|v| v.as_str()), Some("stu-1"));
    assert_eq!(
        result.get("studentName").and_then(|v| v.as_str()),
        Some("Dana Novak")
    );
    assert_eq!(
        result.pointer("/examComponent/score").and_then(|v| v.as_f64()),
        Some(85.0)
    );
    assert_eq!(
        result.pointer("/extraComponent/score").and_then(|v| v.as_f64()),
        Some(75.0)
    );
    assert_eq!(result.get("finalScore").and_then(|v| v.as_f64()), Some(82.0));
    assert_eq!(result.get("passed").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        result.get("failedDueToExam").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert_eq!(result.get("passThreshold").and_then(|v| v.as_f64()), Some(70.0));

    let exam_details = result
        .pointer("/examComponent/details")
        .and_then(|v| v.as_array())
        .expect("exam details");
    assert_eq!(exam_details.len(), 2);
    assert_eq!(
        exam_details[0].get("examId").and_then(|v| v.as_str()),
        Some("mid")
    );
    assert_eq!(
        exam_details[0].get("belowThreshold").and_then(|v| v.as_bool()),
        Some(false)
    );

    let extra_details = result
        .pointer("/extraComponent/details")
        .and_then(|v| v.as_array())
        .expect("extra details");
    assert_eq!(extra_details.len(), 1);
    assert_eq!(
        extra_details[0].get("normalizedScore").and_then(|v| v.as_f64()),
        Some(75.0)
    );
    assert_eq!(extra_details[0].get("weight").and_then(|v| v.as_f64()), Some(0.3));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn avg_mode_and_raw_source_change_the_exam_component() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let mut params = scenario_params();
    params["settings"]["passCalcMode"] = json!("avg");
    let result = request_ok(&mut stdin, &mut reader, "1", "calc.studentScore", params);
    assert_eq!(
        result.pointer("/examComponent/score").and_then(|v| v.as_f64()),
        Some(75.0)
    );

    let mut params = scenario_params();
    params["examAttempts"][0]["scorePercentage"] = json!(40.0);
    params["examAttempts"][1]["scorePercentage"] = json!(50.0);
    params["settings"]["examScoreSource"] = json!("raw");
    let result = request_ok(&mut stdin, &mut reader, "2", "calc.studentScore", params);
    assert_eq!(
        result.pointer("/examComponent/score").and_then(|v| v.as_f64()),
        Some(50.0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn fail_on_any_exam_reports_the_forced_fail() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let mut params = scenario_params();
    params["examAttempts"][0]["finalScorePercentage"] = json!(45.0);
    params["settings"]["failOnAnyExam"] = json!(true);
    let result = request_ok(&mut stdin, &mut reader, "1", "calc.studentScore", params);
    // Best score is still 85 and the blend still reported.
    assert_eq!(
        result.pointer("/examComponent/score").and_then(|v| v.as_f64()),
        Some(85.0)
    );
    assert_eq!(result.get("passed").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        result.get("failedDueToExam").and_then(|v| v.as_bool()),
        Some(true)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn boolean_and_text_fields_normalize_on_the_wire() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.studentScore",
        json!({
            "studentId": "stu-2",
            "extraScores": { "attendance": true, "project": "silver" },
            "extraFields": [
                { "key": "attendance", "type": "boolean", "boolTruePoints": 100.0, "boolFalsePoints": 0.0, "passWeight": 1.0 },
                { "key": "project", "type": "text", "textScoreMap": { "gold": 90.0, "silver": 70.0 }, "passWeight": 1.0 },
            ],
            "settings": { "overallPassThreshold": 80.0 },
        }),
    );
    // (100 + 70) / 2, and the exam component stays null.
    assert_eq!(
        result.pointer("/extraComponent/score").and_then(|v| v.as_f64()),
        Some(85.0)
    );
    assert!(result.pointer("/examComponent/score").expect("score").is_null());
    assert_eq!(result.get("finalScore").and_then(|v| v.as_f64()), Some(85.0));
    assert_eq!(result.get("passed").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn engine_failures_come_back_with_their_own_codes() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let mut params = scenario_params();
    params["settings"]["examWeight"] = json!(1.5);
    let error = request_err(&mut stdin, &mut reader, "1", "calc.studentScore", params);
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some("invalid_weight")
    );

    let mut params = scenario_params();
    params["extraFields"][0]["maxPoints"] = json!(0.0);
    let error = request_err(&mut stdin, &mut reader, "2", "calc.studentScore", params);
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some("invalid_field_config")
    );

    let mut params = scenario_params();
    params["examAttempts"][0]["finalScorePercentage"] = json!(130.0);
    let error = request_err(&mut stdin, &mut reader, "3", "calc.studentScore", params);
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some("invalid_score_range")
    );

    let error = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "calc.studentScore",
        json!({ "examAttempts": [] }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("bad_params"));
    assert!(error
        .get("message")
        .and_then(|v| v.as_str())
        .expect("message")
        .contains("studentId"));

    drop(stdin);
    let _ = child.wait();
}
