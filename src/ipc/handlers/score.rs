use crate::calc::{self, CalcError, CalcInput, ExtraField, ScoreSummary, Settings};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

/// Request settings overlay the session defaults, so a caller can flip a
/// single knob (say, passCalcMode) without restating the rest.
fn resolve_settings(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<Settings, CalcError> {
    match params.get("settings") {
        None => Ok(state.settings.clone()),
        Some(v) if v.is_null() => Ok(state.settings.clone()),
        Some(v) => calc::parse_settings(v, &state.settings),
    }
}

fn resolve_fields(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<Vec<ExtraField>, CalcError> {
    match params.get("extraFields") {
        None => Ok(state.extra_fields.clone()),
        Some(v) if v.is_null() => Ok(state.extra_fields.clone()),
        Some(v) => calc::parse_extra_fields(v),
    }
}

fn parse_student(
    raw: &serde_json::Value,
    ctx: &str,
    fields: &[ExtraField],
    settings: &Settings,
) -> Result<CalcInput, CalcError> {
    let Some(obj) = raw.as_object() else {
        return Err(CalcError::new(
            "bad_params",
            format!("{} must be an object", ctx),
        ));
    };
    let Some(student_id) = obj.get("studentId").and_then(|v| v.as_str()) else {
        return Err(CalcError::new(
            "bad_params",
            format!("{}.studentId is required", ctx),
        ));
    };

    let exam_attempts = match obj.get("examAttempts") {
        None => Vec::new(),
        Some(v) if v.is_null() => Vec::new(),
        Some(v) => calc::parse_exam_attempts(v)?,
    };
    let extra_scores = match obj.get("extraScores") {
        None => HashMap::new(),
        Some(v) if v.is_null() => HashMap::new(),
        Some(v) => calc::parse_extra_scores(v)?,
    };

    Ok(CalcInput {
        student_id: student_id.to_string(),
        student_code: obj
            .get("studentCode")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        student_name: obj
            .get("studentName")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        exam_attempts,
        extra_scores,
        extra_fields: fields.to_vec(),
        settings: settings.clone(),
    })
}

fn handle_student_score(state: &mut AppState, req: &Request) -> serde_json::Value {
    let summary = resolve_settings(state, &req.params).and_then(|settings| {
        let fields = resolve_fields(state, &req.params)?;
        let input = parse_student(&req.params, "params", &fields, &settings)?;
        calc::calculate_final_score(&input)
    });
    match summary {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => calc_err(&req.id, e),
    }
}

fn roster_summaries(
    state: &AppState,
    req: &Request,
    students_raw: &[serde_json::Value],
) -> Result<(Settings, Vec<ScoreSummary>), CalcError> {
    let settings = resolve_settings(state, &req.params)?;
    let fields = resolve_fields(state, &req.params)?;

    let mut summaries = Vec::with_capacity(students_raw.len());
    for (i, raw) in students_raw.iter().enumerate() {
        let ctx = format!("students[{}]", i);
        let input = parse_student(raw, &ctx, &fields, &settings)?;
        summaries.push(calc::calculate_final_score(&input)?);
    }
    Ok((settings, summaries))
}

/// The admin-summaries surface: one summary per roster entry under a
/// shared settings object. All-or-nothing; a single bad row fails the
/// request rather than producing a partially scored roster.
fn handle_roster_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(students_raw) = req.params.get("students").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing params.students", None);
    };

    match roster_summaries(state, req, students_raw) {
        Ok((settings, summaries)) => {
            let passed_count = summaries.iter().filter(|s| s.passed).count();
            ok(
                &req.id,
                json!({
                    "runId": Uuid::new_v4().to_string(),
                    "generatedAt": Utc::now().to_rfc3339(),
                    "settings": settings.to_json(),
                    "rosterSize": summaries.len(),
                    "passedCount": passed_count,
                    "students": summaries,
                }),
            )
        }
        Err(e) => calc_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.studentScore" => Some(handle_student_score(state, req)),
        "calc.rosterSummary" => Some(handle_roster_summary(state, req)),
        _ => None,
    }
}
