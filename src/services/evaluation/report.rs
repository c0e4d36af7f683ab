//! Model output → `ScoreReport`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::db::models::AxisScores;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScoreReport {
    pub(crate) overall: u32,
    pub(crate) axes: AxisScores,
    pub(crate) feedback: String,
    pub(crate) proficiency_band: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ReportError {
    #[error("no JSON object in model output")]
    NoJson,
    #[error("model output is not valid JSON: {0}")]
    Malformed(String),
    #[error("model output is missing `{0}`")]
    MissingField(&'static str),
}

/// Strips code fences and keeps the text between the first `{` and the last `}`.
pub(crate) fn sanitize(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start < end).then(|| &trimmed[start..=end])
}

pub(crate) fn parse_report(raw: &str, language_code: &str) -> Result<ScoreReport, ReportError> {
    let json = sanitize(raw).ok_or(ReportError::NoJson)?;
    let value: Value =
        serde_json::from_str(json).map_err(|err| ReportError::Malformed(err.to_string()))?;

    let overall = value.get("overall").and_then(score).ok_or(ReportError::MissingField("overall"))?;
    let feedback = value
        .get("feedback")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(ReportError::MissingField("feedback"))?
        .to_string();

    let axes_source = value.get("scores").filter(|scores| scores.is_object()).unwrap_or(&value);
    let axis = |name: &str| axes_source.get(name).and_then(score);
    let axes = AxisScores {
        pronunciation: axis("pronunciation"),
        fluency: axis("fluency"),
        coherence: axis("coherence"),
        accuracy: axis("accuracy"),
        intonation: axis("intonation"),
        grammar: axis("grammar"),
        vocabulary: axis("vocabulary"),
    };

    Ok(ScoreReport {
        overall,
        axes,
        feedback,
        proficiency_band: proficiency_band(language_code, overall).to_string(),
    })
}

/// Numeric (or numeric-string) score clamped to 0..=100.
fn score(value: &Value) -> Option<u32> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then(|| number.round().clamp(0.0, 100.0) as u32)
}

/// Low, deterministic report used when no provider produced a usable result.
pub(crate) fn fallback_report(language_code: &str, fallback_score: u32) -> ScoreReport {
    let score = fallback_score.min(100);
    ScoreReport {
        overall: score,
        axes: AxisScores {
            pronunciation: Some(score),
            fluency: Some(score),
            coherence: Some(score),
            accuracy: Some(score),
            intonation: Some(score),
            grammar: Some(score),
            vocabulary: Some(score),
        },
        feedback: "We could not evaluate your recording in detail this time, so a provisional \
                   score was recorded. Please try again later."
            .to_string(),
        proficiency_band: proficiency_band(language_code, score).to_string(),
    }
}

pub(crate) fn proficiency_band(language_code: &str, overall: u32) -> &'static str {
    let family = language_code.split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase();
    let table: &[(u32, &'static str)] = match family.as_str() {
        "ja" => &[(90, "N1"), (75, "N2"), (60, "N3"), (45, "N4"), (0, "N5")],
        "zh" | "cmn" => {
            &[(90, "HSK6"), (80, "HSK5"), (65, "HSK4"), (50, "HSK3"), (35, "HSK2"), (0, "HSK1")]
        }
        _ => &[(90, "C2"), (80, "C1"), (65, "B2"), (50, "B1"), (35, "A2"), (0, "A1")],
    };
    table
        .iter()
        .find(|(threshold, _)| overall >= *threshold)
        .map(|(_, band)| *band)
        .unwrap_or("A1")
}
