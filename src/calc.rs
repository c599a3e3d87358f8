use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// 2-decimal rounding used everywhere a score is reported:
/// `Floor(100*x + 0.5) / 100` (half rounds up). Scores are non-negative,
/// so this is the same as rounding half away from zero.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: &str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: Some(details),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassCalcMode {
    Best,
    Avg,
}

impl PassCalcMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PassCalcMode::Best => "best",
            PassCalcMode::Avg => "avg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    Raw,
    Final,
}

impl ScoreSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreSource::Raw => "raw",
            ScoreSource::Final => "final",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub pass_calc_mode: PassCalcMode,
    pub overall_pass_threshold: f64,
    pub exam_weight: f64,
    pub exam_score_source: ScoreSource,
    pub fail_on_any_exam: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pass_calc_mode: PassCalcMode::Best,
            overall_pass_threshold: 50.0,
            exam_weight: 1.0,
            exam_score_source: ScoreSource::Final,
            fail_on_any_exam: false,
        }
    }
}

impl Settings {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "passCalcMode": self.pass_calc_mode.as_str(),
            "overallPassThreshold": self.overall_pass_threshold,
            "examWeight": self.exam_weight,
            "examScoreSource": self.exam_score_source.as_str(),
            "failOnAnyExam": self.fail_on_any_exam,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExamAttempt {
    pub exam_id: String,
    pub exam_title: String,
    pub score_percentage: Option<f64>,
    pub final_score_percentage: Option<f64>,
    pub include_in_pass: bool,
    pub pass_threshold: f64,
}

/// How a raw extra-credit value maps onto the 0-100 scale.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraFieldKind {
    /// Numeric raw value, clamped to [0, max_points] then scaled.
    Points { max_points: f64 },
    /// Boolean raw value; the point values are already on the 0-100 scale.
    Flag { true_points: f64, false_points: f64 },
    /// Text raw value looked up in a score map; unmapped text scores 0.
    Mapped { score_map: HashMap<String, f64> },
}

impl ExtraFieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtraFieldKind::Points { .. } => "number",
            ExtraFieldKind::Flag { .. } => "boolean",
            ExtraFieldKind::Mapped { .. } => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtraField {
    pub key: String,
    pub label: String,
    pub kind: ExtraFieldKind,
    pub include_in_pass: bool,
    pub pass_weight: f64,
}

impl ExtraField {
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = json!({
            "key": self.key,
            "label": self.label,
            "type": self.kind.as_str(),
            "includeInPass": self.include_in_pass,
            "passWeight": self.pass_weight,
        });
        match &self.kind {
            ExtraFieldKind::Points { max_points } => {
                out["maxPoints"] = json!(max_points);
            }
            ExtraFieldKind::Flag {
                true_points,
                false_points,
            } => {
                out["boolTruePoints"] = json!(true_points);
                out["boolFalsePoints"] = json!(false_points);
            }
            ExtraFieldKind::Mapped { score_map } => {
                out["textScoreMap"] = json!(score_map);
            }
        }
        out
    }
}

/// A student's recorded raw value for one extra field.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalcInput {
    pub student_id: String,
    pub student_code: Option<String>,
    pub student_name: Option<String>,
    pub exam_attempts: Vec<ExamAttempt>,
    pub extra_scores: HashMap<String, ExtraValue>,
    pub extra_fields: Vec<ExtraField>,
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamDetail {
    pub exam_id: String,
    pub exam_title: String,
    pub score: Option<f64>,
    pub pass_threshold: f64,
    pub below_threshold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraDetail {
    pub key: String,
    pub normalized_score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamComponent {
    pub score: Option<f64>,
    pub details: Vec<ExamDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraComponent {
    pub score: Option<f64>,
    pub details: Vec<ExtraDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    pub exam_component: ExamComponent,
    pub extra_component: ExtraComponent,
    pub final_score: Option<f64>,
    pub pass_threshold: f64,
    pub passed: bool,
    pub failed_due_to_exam: bool,
}

fn in_percent_range(v: f64) -> bool {
    v.is_finite() && (0.0..=100.0).contains(&v)
}

pub fn validate_settings(settings: &Settings) -> Result<(), CalcError> {
    if !settings.exam_weight.is_finite() || !(0.0..=1.0).contains(&settings.exam_weight) {
        return Err(CalcError::with_details(
            "invalid_weight",
            "examWeight must be between 0 and 1",
            json!({ "examWeight": settings.exam_weight }),
        ));
    }
    if !in_percent_range(settings.overall_pass_threshold) {
        return Err(CalcError::with_details(
            "invalid_score_range",
            "overallPassThreshold must be between 0 and 100",
            json!({ "overallPassThreshold": settings.overall_pass_threshold }),
        ));
    }
    Ok(())
}

pub fn validate_extra_fields(fields: &[ExtraField]) -> Result<(), CalcError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for f in fields {
        if !seen.insert(f.key.as_str()) {
            return Err(CalcError::with_details(
                "invalid_field_config",
                format!("duplicate extra field key '{}'", f.key),
                json!({ "key": f.key }),
            ));
        }
        if !f.pass_weight.is_finite() || f.pass_weight < 0.0 {
            return Err(CalcError::with_details(
                "invalid_weight",
                format!("extra field '{}' passWeight must be >= 0", f.key),
                json!({ "key": f.key, "passWeight": f.pass_weight }),
            ));
        }
        match &f.kind {
            ExtraFieldKind::Points { max_points } => {
                if !max_points.is_finite() || *max_points <= 0.0 {
                    return Err(CalcError::with_details(
                        "invalid_field_config",
                        format!("extra field '{}' maxPoints must be > 0", f.key),
                        json!({ "key": f.key, "maxPoints": max_points }),
                    ));
                }
            }
            ExtraFieldKind::Flag {
                true_points,
                false_points,
            } => {
                if !true_points.is_finite() || !false_points.is_finite() {
                    return Err(CalcError::with_details(
                        "invalid_field_config",
                        format!("extra field '{}' bool points must be finite numbers", f.key),
                        json!({ "key": f.key }),
                    ));
                }
            }
            ExtraFieldKind::Mapped { score_map } => {
                for (text, points) in score_map {
                    if !points.is_finite() {
                        return Err(CalcError::with_details(
                            "invalid_field_config",
                            format!(
                                "extra field '{}' textScoreMap['{}'] must be a finite number",
                                f.key, text
                            ),
                            json!({ "key": f.key, "text": text }),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

fn validate_input(input: &CalcInput) -> Result<(), CalcError> {
    validate_settings(&input.settings)?;
    validate_extra_fields(&input.extra_fields)?;

    for a in &input.exam_attempts {
        for (name, value) in [
            ("scorePercentage", a.score_percentage),
            ("finalScorePercentage", a.final_score_percentage),
        ] {
            if let Some(v) = value {
                if !in_percent_range(v) {
                    return Err(CalcError::with_details(
                        "invalid_score_range",
                        format!("exam '{}' {} must be between 0 and 100", a.exam_id, name),
                        json!({ "examId": a.exam_id, "field": name, "value": v }),
                    ));
                }
            }
        }
        if !in_percent_range(a.pass_threshold) {
            return Err(CalcError::with_details(
                "invalid_score_range",
                format!("exam '{}' passThreshold must be between 0 and 100", a.exam_id),
                json!({ "examId": a.exam_id, "value": a.pass_threshold }),
            ));
        }
    }

    for (key, value) in &input.extra_scores {
        if let ExtraValue::Number(v) = value {
            if !v.is_finite() {
                return Err(CalcError::with_details(
                    "invalid_score_range",
                    format!("extra score '{}' must be a finite number", key),
                    json!({ "key": key }),
                ));
            }
        }
    }

    Ok(())
}

/// Raw value -> 0-100 by the field's declared kind. A missing value and a
/// value recorded under a different kind than the field declares both
/// contribute 0 rather than failing the calculation; upstream data entry
/// is untrusted.
fn normalize_extra_value(field: &ExtraField, raw: Option<&ExtraValue>) -> f64 {
    let Some(raw) = raw else {
        return 0.0;
    };
    match (&field.kind, raw) {
        (ExtraFieldKind::Points { max_points }, ExtraValue::Number(v)) => {
            100.0 * v.clamp(0.0, *max_points) / max_points
        }
        (
            ExtraFieldKind::Flag {
                true_points,
                false_points,
            },
            ExtraValue::Flag(b),
        ) => {
            let points = if *b { *true_points } else { *false_points };
            points.clamp(0.0, 100.0)
        }
        (ExtraFieldKind::Mapped { score_map }, ExtraValue::Text(text)) => score_map
            .get(text)
            .copied()
            .unwrap_or(0.0)
            .clamp(0.0, 100.0),
        _ => 0.0,
    }
}

/// Combine a student's exam attempts and extra-credit values into a final
/// score and pass decision. Pure: reads only `input`, allocates only the
/// returned summary. A null component or null final score is a valid
/// outcome, not an error; errors are reserved for configuration that
/// violates its documented range.
pub fn calculate_final_score(input: &CalcInput) -> Result<ScoreSummary, CalcError> {
    validate_input(input)?;

    let settings = &input.settings;

    let mut selected: Vec<f64> = Vec::new();
    let mut exam_details: Vec<ExamDetail> = Vec::new();
    let mut failed_due_to_exam = false;
    for a in input.exam_attempts.iter().filter(|a| a.include_in_pass) {
        let score = match settings.exam_score_source {
            ScoreSource::Raw => a.score_percentage,
            ScoreSource::Final => a.final_score_percentage,
        };
        let below_threshold = score.map(|s| s < a.pass_threshold).unwrap_or(false);
        if let Some(s) = score {
            selected.push(s);
        }
        if settings.fail_on_any_exam && below_threshold {
            failed_due_to_exam = true;
        }
        exam_details.push(ExamDetail {
            exam_id: a.exam_id.clone(),
            exam_title: a.exam_title.clone(),
            score: score.map(round_off_2_decimals),
            pass_threshold: a.pass_threshold,
            below_threshold,
        });
    }

    let exam_score = if selected.is_empty() {
        None
    } else {
        let combined = match settings.pass_calc_mode {
            PassCalcMode::Best => selected.iter().copied().fold(f64::MIN, f64::max),
            PassCalcMode::Avg => selected.iter().sum::<f64>() / selected.len() as f64,
        };
        Some(round_off_2_decimals(combined))
    };

    let mut extra_details: Vec<ExtraDetail> = Vec::new();
    let mut weighted_sum = 0.0_f64;
    let mut weight_denom = 0.0_f64;
    for f in input.extra_fields.iter().filter(|f| f.include_in_pass) {
        let normalized =
            round_off_2_decimals(normalize_extra_value(f, input.extra_scores.get(&f.key)));
        weighted_sum += normalized * f.pass_weight;
        weight_denom += f.pass_weight;
        extra_details.push(ExtraDetail {
            key: f.key.clone(),
            normalized_score: normalized,
            weight: f.pass_weight,
        });
    }
    let extra_score = if weight_denom > 0.0 {
        Some(round_off_2_decimals(weighted_sum / weight_denom))
    } else {
        None
    };

    // Blend the rounded components so the reported breakdown recombines
    // exactly to the reported final score. A null component hands its
    // weight to the other one.
    let final_score = match (exam_score, extra_score) {
        (Some(exam), Some(extra)) => Some(round_off_2_decimals(
            exam * settings.exam_weight + extra * (1.0 - settings.exam_weight),
        )),
        (Some(exam), None) => Some(exam),
        (None, Some(extra)) => Some(extra),
        (None, None) => None,
    };

    let passed = !failed_due_to_exam
        && final_score
            .map(|f| f >= settings.overall_pass_threshold)
            .unwrap_or(false);

    Ok(ScoreSummary {
        student_id: input.student_id.clone(),
        student_code: input.student_code.clone(),
        student_name: input.student_name.clone(),
        exam_component: ExamComponent {
            score: exam_score,
            details: exam_details,
        },
        extra_component: ExtraComponent {
            score: extra_score,
            details: extra_details,
        },
        final_score,
        pass_threshold: settings.overall_pass_threshold,
        passed,
        failed_due_to_exam,
    })
}

fn expect_object<'a>(
    raw: &'a serde_json::Value,
    ctx: &str,
) -> Result<&'a serde_json::Map<String, serde_json::Value>, CalcError> {
    raw.as_object()
        .ok_or_else(|| CalcError::new("bad_params", format!("{} must be an object", ctx)))
}

fn field_f64(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    ctx: &str,
) -> Result<Option<f64>, CalcError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            CalcError::new("bad_params", format!("{}.{} must be a number", ctx, key))
        }),
    }
}

fn field_bool(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    ctx: &str,
) -> Result<Option<bool>, CalcError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| {
            CalcError::new("bad_params", format!("{}.{} must be a boolean", ctx, key))
        }),
    }
}

fn field_str(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    ctx: &str,
) -> Result<Option<String>, CalcError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or_else(|| {
            CalcError::new("bad_params", format!("{}.{} must be a string", ctx, key))
        }),
    }
}

/// Overlay wire settings onto `base`. Keys not present keep the base
/// value, so the same parser serves full settings objects and partial
/// updates.
pub fn parse_settings(raw: &serde_json::Value, base: &Settings) -> Result<Settings, CalcError> {
    let obj = expect_object(raw, "settings")?;
    let mut out = base.clone();

    if let Some(mode) = field_str(obj, "passCalcMode", "settings")? {
        out.pass_calc_mode = match mode.as_str() {
            "best" => PassCalcMode::Best,
            "avg" => PassCalcMode::Avg,
            _ => {
                return Err(CalcError::with_details(
                    "bad_params",
                    "settings.passCalcMode must be 'best' or 'avg'",
                    json!({ "passCalcMode": mode }),
                ))
            }
        };
    }
    if let Some(threshold) = field_f64(obj, "overallPassThreshold", "settings")? {
        out.overall_pass_threshold = threshold;
    }
    if let Some(weight) = field_f64(obj, "examWeight", "settings")? {
        out.exam_weight = weight;
    }
    if let Some(source) = field_str(obj, "examScoreSource", "settings")? {
        out.exam_score_source = match source.as_str() {
            "raw" => ScoreSource::Raw,
            "final" => ScoreSource::Final,
            _ => {
                return Err(CalcError::with_details(
                    "bad_params",
                    "settings.examScoreSource must be 'raw' or 'final'",
                    json!({ "examScoreSource": source }),
                ))
            }
        };
    }
    if let Some(fail_on_any) = field_bool(obj, "failOnAnyExam", "settings")? {
        out.fail_on_any_exam = fail_on_any;
    }

    Ok(out)
}

pub fn parse_exam_attempts(raw: &serde_json::Value) -> Result<Vec<ExamAttempt>, CalcError> {
    let Some(arr) = raw.as_array() else {
        return Err(CalcError::new("bad_params", "examAttempts must be an array"));
    };
    let mut out = Vec::with_capacity(arr.len());
    for (i, item) in arr.iter().enumerate() {
        let ctx = format!("examAttempts[{}]", i);
        let obj = expect_object(item, &ctx)?;
        let Some(exam_id) = field_str(obj, "examId", &ctx)? else {
            return Err(CalcError::new(
                "bad_params",
                format!("{}.examId is required", ctx),
            ));
        };
        out.push(ExamAttempt {
            exam_title: field_str(obj, "examTitle", &ctx)?.unwrap_or_else(|| exam_id.clone()),
            exam_id,
            score_percentage: field_f64(obj, "scorePercentage", &ctx)?,
            final_score_percentage: field_f64(obj, "finalScorePercentage", &ctx)?,
            include_in_pass: field_bool(obj, "includeInPass", &ctx)?.unwrap_or(true),
            pass_threshold: field_f64(obj, "passThreshold", &ctx)?.unwrap_or(50.0),
        });
    }
    Ok(out)
}

pub fn parse_extra_fields(raw: &serde_json::Value) -> Result<Vec<ExtraField>, CalcError> {
    let Some(arr) = raw.as_array() else {
        return Err(CalcError::new("bad_params", "extraFields must be an array"));
    };
    let mut out = Vec::with_capacity(arr.len());
    for (i, item) in arr.iter().enumerate() {
        let ctx = format!("extraFields[{}]", i);
        let obj = expect_object(item, &ctx)?;
        let Some(key) = field_str(obj, "key", &ctx)? else {
            return Err(CalcError::new(
                "bad_params",
                format!("{}.key is required", ctx),
            ));
        };
        let Some(kind_name) = field_str(obj, "type", &ctx)? else {
            return Err(CalcError::new(
                "bad_params",
                format!("{}.type is required", ctx),
            ));
        };
        let kind = match kind_name.as_str() {
            "number" => ExtraFieldKind::Points {
                max_points: field_f64(obj, "maxPoints", &ctx)?.unwrap_or(100.0),
            },
            "boolean" => ExtraFieldKind::Flag {
                true_points: field_f64(obj, "boolTruePoints", &ctx)?.unwrap_or(100.0),
                false_points: field_f64(obj, "boolFalsePoints", &ctx)?.unwrap_or(0.0),
            },
            "text" => {
                let mut score_map = HashMap::new();
                match obj.get("textScoreMap") {
                    None => {}
                    Some(v) if v.is_null() => {}
                    Some(v) => {
                        let map_ctx = format!("{}.textScoreMap", ctx);
                        let map_obj = expect_object(v, &map_ctx)?;
                        for (text, points) in map_obj {
                            let Some(points) = points.as_f64() else {
                                return Err(CalcError::new(
                                    "bad_params",
                                    format!("{}['{}'] must be a number", map_ctx, text),
                                ));
                            };
                            score_map.insert(text.clone(), points);
                        }
                    }
                }
                ExtraFieldKind::Mapped { score_map }
            }
            _ => {
                return Err(CalcError::with_details(
                    "bad_params",
                    format!("{}.type must be one of: number, boolean, text", ctx),
                    json!({ "type": kind_name }),
                ))
            }
        };
        out.push(ExtraField {
            label: field_str(obj, "label", &ctx)?.unwrap_or_else(|| key.clone()),
            key,
            kind,
            include_in_pass: field_bool(obj, "includeInPass", &ctx)?.unwrap_or(true),
            pass_weight: field_f64(obj, "passWeight", &ctx)?.unwrap_or(1.0),
        });
    }
    Ok(out)
}

pub fn parse_extra_scores(
    raw: &serde_json::Value,
) -> Result<HashMap<String, ExtraValue>, CalcError> {
    let obj = expect_object(raw, "extraScores")?;
    let mut out = HashMap::with_capacity(obj.len());
    for (key, value) in obj {
        let parsed = if let Some(n) = value.as_f64() {
            ExtraValue::Number(n)
        } else if let Some(b) = value.as_bool() {
            ExtraValue::Flag(b)
        } else if let Some(s) = value.as_str() {
            ExtraValue::Text(s.to_string())
        } else if value.is_null() {
            continue;
        } else {
            return Err(CalcError::new(
                "bad_params",
                format!("extraScores['{}'] must be a number, boolean, or string", key),
            ));
        };
        out.insert(key.clone(), parsed);
    }
    Ok(out)
}
