//! Evaluation result types
//!
//! The engine always emits a schema-valid result: numeric fields are
//! clamped into their declared ranges and text fields are bounded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound for stored free-form text fields, in characters
const TEXT_FIELD_MAX: usize = 4000;

/// Hire recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Hire,
    ConditionalHire,
    Reject,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Hire => "HIRE",
            Recommendation::ConditionalHire => "CONDITIONAL_HIRE",
            Recommendation::Reject => "REJECT",
        }
    }

    /// Normalize free-form model output by case-insensitive substring
    /// match. Anything unrecognized lands on the middle ground.
    pub fn normalize(text: &str) -> Recommendation {
        let upper = text.to_uppercase();
        if upper.contains("HIRE") && !upper.contains("CONDITIONAL") {
            Recommendation::Hire
        } else if upper.contains("CONDITIONAL") || upper.contains("MAYBE") {
            Recommendation::ConditionalHire
        } else if upper.contains("REJECT") || upper.contains("NO") {
            Recommendation::Reject
        } else {
            Recommendation::ConditionalHire
        }
    }
}

/// Per-dimension CV scores, each in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvBreakdown {
    pub technical_skills: f32,
    pub experience_level: f32,
    pub achievements: f32,
    pub cultural_fit: f32,
}

impl CvBreakdown {
    pub fn average(&self) -> f32 {
        (self.technical_skills + self.experience_level + self.achievements + self.cultural_fit)
            / 4.0
    }
}

/// Per-dimension project scores, each in [1, 5]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBreakdown {
    pub correctness: f32,
    pub code_quality: f32,
    pub resilience: f32,
    pub documentation: f32,
    pub creativity: f32,
}

/// How many context chunks each retrieval query contributed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSources {
    pub job_descriptions: usize,
    pub cv_rubrics: usize,
    pub similar_cvs: usize,
    pub case_studies: usize,
    pub project_rubrics: usize,
    pub tech_requirements: usize,
    pub similar_projects: usize,
}

impl ContextSources {
    pub fn total(&self) -> usize {
        self.job_descriptions
            + self.cv_rubrics
            + self.similar_cvs
            + self.case_studies
            + self.project_rubrics
            + self.tech_requirements
            + self.similar_projects
    }
}

/// Final evaluation emitted by the engine, embedded in the job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub cv_match_rate: f32,
    pub cv_breakdown: CvBreakdown,
    pub cv_feedback: String,
    pub project_score: f32,
    pub project_breakdown: ProjectBreakdown,
    pub overall_summary: String,
    pub recommendation: Recommendation,
    pub evaluated_at: DateTime<Utc>,
    pub context_sources: ContextSources,
}

impl EvaluationResult {
    /// Clamp every numeric field into its declared range and bound the
    /// text fields. Never trust numerics from the LLM unclamped.
    pub fn clamped(mut self) -> Self {
        self.cv_match_rate = clamp_unit(self.cv_match_rate);
        self.cv_breakdown.technical_skills = clamp_unit(self.cv_breakdown.technical_skills);
        self.cv_breakdown.experience_level = clamp_unit(self.cv_breakdown.experience_level);
        self.cv_breakdown.achievements = clamp_unit(self.cv_breakdown.achievements);
        self.cv_breakdown.cultural_fit = clamp_unit(self.cv_breakdown.cultural_fit);

        self.project_score = clamp_scale(self.project_score);
        self.project_breakdown.correctness = clamp_scale(self.project_breakdown.correctness);
        self.project_breakdown.code_quality = clamp_scale(self.project_breakdown.code_quality);
        self.project_breakdown.resilience = clamp_scale(self.project_breakdown.resilience);
        self.project_breakdown.documentation = clamp_scale(self.project_breakdown.documentation);
        self.project_breakdown.creativity = clamp_scale(self.project_breakdown.creativity);

        self.cv_feedback = bound_text(self.cv_feedback);
        self.overall_summary = bound_text(self.overall_summary);
        self
    }
}

/// Clamp into [0, 1]; non-finite input lands on the midpoint
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

/// Clamp into [1, 5]; non-finite input lands on the midpoint
pub fn clamp_scale(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(1.0, 5.0)
    } else {
        3.0
    }
}

fn bound_text(text: String) -> String {
    if text.chars().count() <= TEXT_FIELD_MAX {
        text
    } else {
        text.chars().take(TEXT_FIELD_MAX).collect()
    }
}

/// Weighted aggregate for consumers:
/// `0.4·cvScore + 0.35·(projectScore−1)/4 + 0.25·matchRate`
pub fn weighted_aggregate(cv_score: f32, project_score: f32, match_rate: f32) -> f32 {
    0.4 * clamp_unit(cv_score)
        + 0.35 * (clamp_scale(project_score) - 1.0) / 4.0
        + 0.25 * clamp_unit(match_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_normalization() {
        assert_eq!(Recommendation::normalize("HIRE"), Recommendation::Hire);
        assert_eq!(
            Recommendation::normalize("I would hire this candidate"),
            Recommendation::Hire
        );
        assert_eq!(
            Recommendation::normalize("CONDITIONAL_HIRE"),
            Recommendation::ConditionalHire
        );
        assert_eq!(
            Recommendation::normalize("maybe worth a second interview"),
            Recommendation::ConditionalHire
        );
        assert_eq!(Recommendation::normalize("Reject"), Recommendation::Reject);
        assert_eq!(Recommendation::normalize("no"), Recommendation::Reject);
        assert_eq!(
            Recommendation::normalize("unclear output"),
            Recommendation::ConditionalHire
        );
    }

    #[test]
    fn test_recommendation_serde_shape() {
        let json = serde_json::to_string(&Recommendation::ConditionalHire).unwrap();
        assert_eq!(json, r#""CONDITIONAL_HIRE""#);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(clamp_unit(1.3), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f32::NAN), 0.5);
        assert_eq!(clamp_scale(7.0), 5.0);
        assert_eq!(clamp_scale(0.0), 1.0);
        assert_eq!(clamp_scale(f32::INFINITY), 3.0);
    }

    #[test]
    fn test_result_clamped() {
        let result = EvaluationResult {
            cv_match_rate: 1.8,
            cv_breakdown: CvBreakdown {
                technical_skills: -0.5,
                experience_level: 0.4,
                achievements: 2.0,
                cultural_fit: f32::NAN,
            },
            cv_feedback: "ok".into(),
            project_score: 9.0,
            project_breakdown: ProjectBreakdown {
                correctness: 0.0,
                code_quality: 4.0,
                resilience: 6.0,
                documentation: 3.0,
                creativity: -2.0,
            },
            overall_summary: "x".repeat(10_000),
            recommendation: Recommendation::Hire,
            evaluated_at: Utc::now(),
            context_sources: ContextSources::default(),
        }
        .clamped();

        assert_eq!(result.cv_match_rate, 1.0);
        assert_eq!(result.cv_breakdown.technical_skills, 0.0);
        assert_eq!(result.cv_breakdown.cultural_fit, 0.5);
        assert_eq!(result.project_score, 5.0);
        assert_eq!(result.project_breakdown.correctness, 1.0);
        assert_eq!(result.project_breakdown.creativity, 1.0);
        assert_eq!(result.overall_summary.chars().count(), 4000);
    }

    #[test]
    fn test_weighted_aggregate() {
        // Perfect scores aggregate to 1.0
        let top = weighted_aggregate(1.0, 5.0, 1.0);
        assert!((top - 1.0).abs() < 1e-6);

        // Floor scores aggregate to 0.0
        let bottom = weighted_aggregate(0.0, 1.0, 0.0);
        assert!(bottom.abs() < 1e-6);

        let mid = weighted_aggregate(0.5, 3.0, 0.5);
        assert!((mid - (0.4 * 0.5 + 0.35 * 0.5 + 0.25 * 0.5)).abs() < 1e-6);
    }
}
