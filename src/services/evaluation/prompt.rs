use crate::db::models::Exercise;
use crate::db::types::ExerciseType;

const SYSTEM_PROMPT: &str = r#"You are an experienced examiner of spoken foreign-language production.
You receive the exercise, the learner's transcribed answer and sometimes the pictures the learner was asked to talk about.
Score the answer strictly on a 0-100 scale for every axis that applies, and give short, encouraging, concrete feedback addressed to the learner.

Return strict JSON only, with no markdown:
{
  "overall": <0-100>,
  "scores": {
    "pronunciation": <0-100 or null>,
    "fluency": <0-100 or null>,
    "coherence": <0-100 or null>,
    "accuracy": <0-100 or null>,
    "intonation": <0-100 or null>,
    "grammar": <0-100 or null>,
    "vocabulary": <0-100 or null>
  },
  "feedback": "<two to four sentences>"
}
"#;

/// Everything about the exercise the evaluator needs to judge an answer.
#[derive(Debug, Clone)]
pub(crate) struct PromptContext {
    pub(crate) exercise_type: ExerciseType,
    pub(crate) language_code: String,
    pub(crate) prompt: String,
    pub(crate) reference_text: Option<String>,
    pub(crate) expected_answer: Option<String>,
    pub(crate) image_urls: Vec<String>,
}

impl PromptContext {
    pub(crate) fn for_exercise(exercise: &Exercise) -> Self {
        Self {
            exercise_type: exercise.exercise_type,
            language_code: exercise.language_code.clone(),
            prompt: exercise.prompt.clone(),
            reference_text: exercise.reference_text.clone(),
            expected_answer: exercise.expected_answer.clone(),
            image_urls: exercise.image_urls.0.clone(),
        }
    }
}

/// The composite request every evaluator in the chain receives unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EvaluationPrompt {
    pub(crate) system: String,
    pub(crate) user: String,
    pub(crate) images: Vec<String>,
}

fn rubric(exercise_type: ExerciseType) -> &'static str {
    match exercise_type {
        ExerciseType::RepeatAfterMe => {
            "The learner repeats a model phrase. Weigh pronunciation and intonation most, \
             then accuracy against the reference phrase. Coherence and vocabulary do not apply."
        }
        ExerciseType::ReadAloud => {
            "The learner reads a text aloud. Weigh pronunciation, fluency and accuracy \
             against the reference text; grammar and vocabulary do not apply."
        }
        ExerciseType::PictureDescription => {
            "The learner describes the attached picture. Weigh accuracy of what is described, \
             vocabulary range and grammar; fluency counts less."
        }
        ExerciseType::StoryTelling => {
            "The learner tells a story prompted by the attached pictures. Weigh coherence of \
             the narrative, fluency and vocabulary, then grammar."
        }
        ExerciseType::QuestionAnswer => {
            "The learner answers a question. Weigh accuracy against the expected answer, \
             then grammar and fluency."
        }
        ExerciseType::Debate => {
            "The learner argues a position. Weigh coherence and strength of argumentation, \
             grammar and vocabulary; pronunciation counts less."
        }
    }
}

pub(crate) fn language_name(code: &str) -> &str {
    match code.split(['-', '_']).next().unwrap_or(code).to_ascii_lowercase().as_str() {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ko" => "Korean",
        "ja" => "Japanese",
        "zh" | "cmn" => "Chinese (Mandarin)",
        _ => code,
    }
}

pub(crate) fn build_prompt(
    context: &PromptContext,
    transcript: &str,
    max_images: usize,
) -> EvaluationPrompt {
    let mut user = format!(
        "Target language: {}\nExercise type: {}\nRubric: {}\n\nTask given to the learner:\n{}\n",
        language_name(&context.language_code),
        context.exercise_type.as_str(),
        rubric(context.exercise_type),
        context.prompt.trim(),
    );
    if let Some(reference) = context.reference_text.as_deref().filter(|text| !text.trim().is_empty())
    {
        user.push_str(&format!("\nReference text:\n{}\n", reference.trim()));
    }
    if let Some(expected) = context.expected_answer.as_deref().filter(|text| !text.trim().is_empty())
    {
        user.push_str(&format!("\nExpected answer:\n{}\n", expected.trim()));
    }
    user.push_str(&format!("\nLearner's transcribed answer:\n{}\n", transcript.trim()));

    let images = if context.exercise_type.uses_images() {
        context.image_urls.iter().take(max_images).cloned().collect()
    } else {
        Vec::new()
    };
    if !images.is_empty() {
        user.push_str(&format!("\n{} picture(s) from the task are attached.\n", images.len()));
    }

    EvaluationPrompt { system: SYSTEM_PROMPT.to_string(), user, images }
}

#[cfg(test)]
mod tests {
    use super::{build_prompt, language_name, PromptContext};
    use crate::db::types::ExerciseType;

    fn context(exercise_type: ExerciseType) -> PromptContext {
        PromptContext {
            exercise_type,
            language_code: "ja".to_string(),
            prompt: "Describe your morning.".to_string(),
            reference_text: Some("おはようございます".to_string()),
            expected_answer: None,
            image_urls: (1..=5).map(|n| format!("https://cdn.example/{n}.png")).collect(),
        }
    }

    #[test]
    fn image_exercises_attach_at_most_max_images() {
        let prompt = build_prompt(&context(ExerciseType::PictureDescription), "answer", 3);
        assert_eq!(prompt.images.len(), 3);
        assert_eq!(prompt.images[0], "https://cdn.example/1.png");
        assert!(prompt.user.contains("3 picture(s)"));
    }

    #[test]
    fn audio_only_exercises_never_attach_images() {
        let prompt = build_prompt(&context(ExerciseType::Debate), "answer", 3);
        assert!(prompt.images.is_empty());
        assert!(prompt.user.contains("argumentation"));
    }

    #[test]
    fn prompt_names_language_reference_and_transcript() {
        let prompt = build_prompt(&context(ExerciseType::RepeatAfterMe), "  ohayou  ", 3);
        assert!(prompt.user.contains("Target language: Japanese"));
        assert!(prompt.user.contains("Reference text:\nおはようございます"));
        assert!(prompt.user.contains("Learner's transcribed answer:\nohayou\n"));
        assert!(!prompt.user.contains("Expected answer"));
        assert!(prompt.system.contains("\"overall\""));
    }

    #[test]
    fn unknown_language_codes_pass_through() {
        assert_eq!(language_name("zh-TW"), "Chinese (Mandarin)");
        assert_eq!(language_name("sw"), "sw");
    }
}
