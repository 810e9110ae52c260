//! Deterministic, LLM-free fallback scorers
//!
//! Used whenever a scoring stage fails so the engine still returns a
//! schema-valid result. Keyword heuristics only; these signal system
//! liveness, not evaluation quality.

use crate::parse::{CvStage, ProjectStage};
use crate::result::{clamp_scale, clamp_unit};

const EXPERIENCE_KEYWORDS: [&str; 4] = ["experience", "years", "worked", "developed"];
const TECHNICAL_KEYWORDS: [&str; 7] = [
    "javascript",
    "python",
    "java",
    "react",
    "node",
    "sql",
    "database",
];
const ACHIEVEMENT_KEYWORDS: [&str; 6] = ["led", "managed", "built", "created", "achieved", "improved"];

const CODE_KEYWORDS: [&str; 6] = ["code", "api", "function", "repository", "implementation", "test"];
const DOCUMENTATION_KEYWORDS: [&str; 4] = ["readme", "documentation", "docs", "comment"];

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(str::to_string)
        .collect()
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

/// Modulate a sub-score around the match rate, staying within ±0.15
fn modulated(match_rate: f32, present: bool) -> f32 {
    let delta = if present { 0.1 } else { -0.1 };
    clamp_unit((match_rate + delta).clamp(match_rate - 0.15, match_rate + 0.15))
}

/// Keyword-overlap CV scoring.
///
/// The match rate is the fraction of job-title tokens contained in the
/// CV (substring containment), clamped to [0.3, 0.9]; keyword classes
/// shift the sub-scores around it.
pub fn cv_stage(cv_text: &str, job_title: &str) -> CvStage {
    let cv_lower = cv_text.to_lowercase();
    let job_tokens = tokenize(job_title);

    let match_rate = if job_tokens.is_empty() {
        0.5
    } else {
        let matched = job_tokens
            .iter()
            .filter(|token| cv_lower.contains(token.as_str()))
            .count();
        (matched as f32 / job_tokens.len() as f32).clamp(0.3, 0.9)
    };

    let has_experience = contains_any(&cv_lower, &EXPERIENCE_KEYWORDS);
    let has_technical = contains_any(&cv_lower, &TECHNICAL_KEYWORDS);
    let has_achievements = contains_any(&cv_lower, &ACHIEVEMENT_KEYWORDS);

    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    if has_technical {
        strengths.push("Mentions recognizable technical skills".to_string());
    } else {
        weaknesses.push("No recognizable technical skills mentioned".to_string());
    }
    if has_experience {
        strengths.push("Describes prior work experience".to_string());
    } else {
        weaknesses.push("Work experience is not clearly described".to_string());
    }
    if has_achievements {
        strengths.push("Lists concrete achievements".to_string());
    } else {
        weaknesses.push("No concrete achievements listed".to_string());
    }

    let missing_skills: Vec<String> = job_tokens
        .iter()
        .filter(|token| !cv_lower.contains(token.as_str()))
        .map(|token| token.clone())
        .collect();

    CvStage {
        match_rate,
        experience_match: modulated(match_rate, has_experience),
        strengths,
        weaknesses,
        missing_skills,
        overall_assessment: format!(
            "Automated keyword screening estimated a {:.0}% match against the role title. \
             A detailed model-based review was unavailable for this evaluation.",
            match_rate * 100.0
        ),
    }
}

/// Sub-scores the fallback derives alongside the keyword match rate
pub fn cv_breakdown_scores(cv_text: &str, match_rate: f32) -> (f32, f32, f32, f32) {
    let cv_lower = cv_text.to_lowercase();
    let technical = modulated(match_rate, contains_any(&cv_lower, &TECHNICAL_KEYWORDS));
    let experience = modulated(match_rate, contains_any(&cv_lower, &EXPERIENCE_KEYWORDS));
    let achievements = modulated(match_rate, contains_any(&cv_lower, &ACHIEVEMENT_KEYWORDS));
    let cultural = clamp_unit(match_rate);
    (technical, experience, achievements, cultural)
}

/// Length-and-keyword project scoring.
///
/// Base 3.0, plus a length bonus capped at 1.0, plus fixed bumps for
/// code and documentation keywords, clamped to 5.0.
pub fn project_stage(project_text: &str) -> ProjectStage {
    let lower = project_text.to_lowercase();
    let has_code = contains_any(&lower, &CODE_KEYWORDS);
    let has_docs = contains_any(&lower, &DOCUMENTATION_KEYWORDS);

    let length_bonus = ((project_text.chars().count() as f32 / 2000.0) * 0.5).min(1.0);
    let mut score = 3.0 + length_bonus;
    if has_code {
        score += 0.5;
    }
    if has_docs {
        score += 0.3;
    }
    let overall_score = clamp_scale(score);

    let documentation_quality = if has_docs { 4.0 } else { 3.0 };

    let mut strengths = Vec::new();
    let mut improvements = Vec::new();
    if has_code {
        strengths.push("Report discusses concrete implementation details".to_string());
    } else {
        improvements.push("Describe the implementation in more technical detail".to_string());
    }
    if has_docs {
        strengths.push("Report references documentation".to_string());
    } else {
        improvements.push("Add documentation for the project".to_string());
    }

    ProjectStage {
        overall_score,
        technical_quality: clamp_scale(overall_score - 0.2),
        complexity_level: clamp_scale(3.0 + length_bonus),
        innovation_score: 3.0,
        documentation_quality,
        strengths,
        improvements,
    }
}
