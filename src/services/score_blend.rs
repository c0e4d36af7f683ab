//! Weighted split between the AI evaluation and the teacher's score.
//!
//! Everything here is pure: the same inputs always produce the same result,
//! which is what lets the pipeline recompute a blend at AI time and again
//! when the teacher score arrives.

use crate::db::models::Exercise;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum GradingMode {
    AiOnly,
    AiWithTeacher { ai_weight: f64, teacher_weight: f64 },
}

impl GradingMode {
    pub(crate) fn for_exercise(exercise: &Exercise) -> Self {
        if exercise.needs_teacher_review() {
            Self::AiWithTeacher {
                ai_weight: f64::from(exercise.ai_weight),
                teacher_weight: f64::from(exercise.teacher_weight),
            }
        } else {
            Self::AiOnly
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BlendOutcome {
    /// AI share only; the teacher has not scored yet.
    Interim { score: f64 },
    Final { score: f64, passed: bool },
}

impl BlendOutcome {
    pub(crate) fn score(self) -> f64 {
        match self {
            Self::Interim { score } | Self::Final { score, .. } => score,
        }
    }
}

pub(crate) fn blend(
    ai_score: f64,
    teacher_score: Option<f64>,
    mode: GradingMode,
    pass_score: f64,
) -> BlendOutcome {
    match (mode, teacher_score) {
        (GradingMode::AiOnly, _) => finalize(ai_score, pass_score),
        (GradingMode::AiWithTeacher { ai_weight, .. }, None) => {
            BlendOutcome::Interim { score: round2(ai_score * ai_weight / 100.0) }
        }
        (GradingMode::AiWithTeacher { ai_weight, teacher_weight }, Some(teacher)) => finalize(
            ai_score * ai_weight / 100.0 + teacher * teacher_weight / 100.0,
            pass_score,
        ),
    }
}

fn finalize(raw: f64, pass_score: f64) -> BlendOutcome {
    let score = round2(raw.clamp(0.0, 100.0));
    // Inclusive threshold.
    BlendOutcome::Final { score, passed: score >= pass_score }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rejects exercise configurations the blend cannot honour.
pub(crate) fn validate_exercise(exercise: &Exercise) -> Result<(), String> {
    if !(0.0..=100.0).contains(&exercise.pass_score) {
        return Err(format!("pass score {} is outside 0..=100", exercise.pass_score));
    }
    for (name, weight) in [("ai", exercise.ai_weight), ("teacher", exercise.teacher_weight)] {
        if !(0..=100).contains(&weight) {
            return Err(format!("{name} weight {weight} is outside 0..=100"));
        }
    }
    if exercise.teacher_weight > 0 && exercise.ai_weight + exercise.teacher_weight != 100 {
        return Err(format!(
            "ai weight {} and teacher weight {} must sum to 100",
            exercise.ai_weight, exercise.teacher_weight
        ));
    }
    Ok(())
}
