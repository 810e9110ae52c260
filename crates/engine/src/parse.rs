//! Stage-output parsing
//!
//! Converts the LLM's parsed JSON into typed stage scores, tolerating
//! the usual deviations (numbers as strings, percentages instead of
//! fractions, missing arrays). The final stage is plain text parsed by
//! regexes anchored on its three headers.

use regex_lite::Regex;
use serde_json::Value;

/// Output of the CV scoring stage
#[derive(Debug, Clone)]
pub struct CvStage {
    pub match_rate: f32,
    pub experience_match: f32,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub missing_skills: Vec<String>,
    pub overall_assessment: String,
}

/// Output of the project scoring stage
#[derive(Debug, Clone)]
pub struct ProjectStage {
    pub overall_score: f32,
    pub technical_quality: f32,
    pub complexity_level: f32,
    pub innovation_score: f32,
    pub documentation_quality: f32,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
}

/// Output of the final recommendation stage
#[derive(Debug, Clone)]
pub struct OverallStage {
    pub recommendation_text: String,
    pub detailed_feedback: String,
    pub specific_recommendations: String,
}

/// Read a numeric field that may arrive as a number or a string
fn number(value: &Value, key: &str) -> Option<f32> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f32>().ok(),
        _ => None,
    }
}

/// A rate in [0, 1] that models sometimes emit as a percentage
fn unit_rate(value: &Value, key: &str) -> Option<f32> {
    let raw = number(value, key)?;
    if raw > 1.0 && raw <= 100.0 {
        Some(raw / 100.0)
    } else {
        Some(raw)
    }
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Parse the CV stage JSON. `matchRate` is mandatory; everything else
/// degrades to defaults.
pub fn cv_stage(value: &Value) -> Option<CvStage> {
    let match_rate = unit_rate(value, "matchRate")?;
    Some(CvStage {
        match_rate,
        experience_match: unit_rate(value, "experienceMatch").unwrap_or(match_rate),
        strengths: string_list(value, "strengths"),
        weaknesses: string_list(value, "weaknesses"),
        missing_skills: string_list(value, "missingSkills"),
        overall_assessment: string_field(value, "overallAssessment"),
    })
}

/// Parse the project stage JSON. `overallScore` is mandatory.
pub fn project_stage(value: &Value) -> Option<ProjectStage> {
    let overall_score = number(value, "overallScore")?;
    Some(ProjectStage {
        overall_score,
        technical_quality: number(value, "technicalQuality").unwrap_or(overall_score),
        complexity_level: number(value, "complexityLevel").unwrap_or(overall_score),
        innovation_score: number(value, "innovationScore").unwrap_or(overall_score),
        documentation_quality: number(value, "documentationQuality").unwrap_or(overall_score),
        strengths: string_list(value, "strengths"),
        improvements: string_list(value, "improvements"),
    })
}

/// Parse the free-form final stage, anchored on its three headers.
/// Returns `None` when the recommendation header is absent.
pub fn overall_stage(text: &str) -> Option<OverallStage> {
    let recommendation = section(
        text,
        r"(?is)RECOMMENDATION:\s*(.*?)\s*(?:DETAILED FEEDBACK:|SPECIFIC RECOMMENDATIONS:|$)",
    )?;
    let detailed_feedback = section(
        text,
        r"(?is)DETAILED FEEDBACK:\s*(.*?)\s*(?:SPECIFIC RECOMMENDATIONS:|$)",
    )
    .unwrap_or_default();
    let specific_recommendations =
        section(text, r"(?is)SPECIFIC RECOMMENDATIONS:\s*(.*?)\s*$").unwrap_or_default();

    Some(OverallStage {
        recommendation_text: recommendation,
        detailed_feedback,
        specific_recommendations,
    })
}

fn section(text: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).expect("static pattern");
    let captured = re.captures(text)?.get(1)?.as_str().trim().to_string();
    if captured.is_empty() {
        None
    } else {
        Some(captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cv_stage_happy_path() {
        let value = json!({
            "matchRate": 0.85,
            "experienceMatch": 0.8,
            "strengths": ["Node.js", "AWS"],
            "weaknesses": ["No Kubernetes"],
            "missingSkills": ["Terraform"],
            "overallAssessment": "Strong backend candidate."
        });
        let stage = cv_stage(&value).unwrap();
        assert_eq!(stage.match_rate, 0.85);
        assert_eq!(stage.strengths.len(), 2);
        assert_eq!(stage.overall_assessment, "Strong backend candidate.");
    }

    #[test]
    fn test_cv_stage_percentage_and_string_numbers() {
        let value = json!({ "matchRate": "85%", "experienceMatch": 72.0 });
        let stage = cv_stage(&value).unwrap();
        assert!((stage.match_rate - 0.85).abs() < 1e-6);
        assert!((stage.experience_match - 0.72).abs() < 1e-6);
    }

    #[test]
    fn test_cv_stage_requires_match_rate() {
        assert!(cv_stage(&json!({ "strengths": [] })).is_none());
    }

    #[test]
    fn test_project_stage_fills_missing_scores() {
        let value = json!({ "overallScore": 4.2 });
        let stage = project_stage(&value).unwrap();
        assert_eq!(stage.technical_quality, 4.2);
        assert_eq!(stage.documentation_quality, 4.2);
        assert!(stage.strengths.is_empty());
    }

    #[test]
    fn test_overall_stage_parses_sections() {
        let text = "RECOMMENDATION: HIRE\n\
                    DETAILED FEEDBACK: Great CV and a solid project.\n\
                    More detail here.\n\
                    SPECIFIC RECOMMENDATIONS: 1. Onboard to the platform team.";
        let stage = overall_stage(text).unwrap();
        assert_eq!(stage.recommendation_text, "HIRE");
        assert!(stage.detailed_feedback.starts_with("Great CV"));
        assert!(stage.specific_recommendations.contains("platform team"));
    }

    #[test]
    fn test_overall_stage_case_insensitive() {
        let text = "recommendation: conditional_hire\ndetailed feedback: fine";
        let stage = overall_stage(text).unwrap();
        assert_eq!(stage.recommendation_text.to_uppercase(), "CONDITIONAL_HIRE");
    }

    #[test]
    fn test_overall_stage_missing_header() {
        assert!(overall_stage("the model rambled instead").is_none());
    }
}
