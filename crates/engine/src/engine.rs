//! Evaluation engine
//!
//! Drives the scoring chain for one job: parallel context retrieval,
//! CV scoring, project scoring, then the overall recommendation.
//! Stage failures fall back to the deterministic scorers; only a quota
//! error at the recommendation stage is fatal.

use crate::fallback;
use crate::parse::{self, CvStage, OverallStage, ProjectStage};
use crate::prompts;
use crate::result::{
    clamp_scale, clamp_unit, weighted_aggregate, ContextSources, CvBreakdown, EvaluationResult,
    ProjectBreakdown, Recommendation,
};
use chrono::Utc;
use hirelens_common::config::AppConfig;
use hirelens_common::db::models::DocType;
use hirelens_common::errors::AppError;
use hirelens_common::llm::{ChatMessage, ChatOptions, LlmClient, LlmError};
use hirelens_retrieval::{collections, RetrievalIndex, ScoredChunk, SearchFilter};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Leading slice of a document used as a similarity query
const QUERY_PREFIX_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("LLM quota exhausted during final recommendation")]
    Quota { retry_after_secs: Option<u64> },

    #[error("Evaluation failed: {0}")]
    Failed(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Quota { retry_after_secs } => AppError::LlmQuota { retry_after_secs },
            EngineError::Failed(message) => AppError::Engine { message },
        }
    }
}

/// Engine tuning derived from configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model for the evaluation stages (None = client default)
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_results: usize,
    pub similarity_threshold: f32,
}

impl EngineConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            model: config
                .llm
                .evaluation_model
                .clone()
                .or_else(|| config.llm.default_model.clone()),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            max_results: config.retrieval.max_results,
            similarity_threshold: config.retrieval.similarity_threshold,
        }
    }
}

/// Everything the engine needs to score one job
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub job_id: String,
    pub owner_id: Uuid,
    pub job_title: String,
    pub cv_text: String,
    pub project_text: String,
}

/// Retrieved context for both scoring sides
struct RetrievedContext {
    job_descriptions: Vec<ScoredChunk>,
    cv_rubrics: Vec<ScoredChunk>,
    similar_cvs: Vec<ScoredChunk>,
    case_studies: Vec<ScoredChunk>,
    project_rubrics: Vec<ScoredChunk>,
    tech_requirements: Vec<ScoredChunk>,
    similar_projects: Vec<ScoredChunk>,
}

impl RetrievedContext {
    fn sources(&self) -> ContextSources {
        ContextSources {
            job_descriptions: self.job_descriptions.len(),
            cv_rubrics: self.cv_rubrics.len(),
            similar_cvs: self.similar_cvs.len(),
            case_studies: self.case_studies.len(),
            project_rubrics: self.project_rubrics.len(),
            tech_requirements: self.tech_requirements.len(),
            similar_projects: self.similar_projects.len(),
        }
    }
}

pub struct EvaluationEngine {
    llm: Arc<dyn LlmClient>,
    retrieval: Arc<RetrievalIndex>,
    config: EngineConfig,
}

impl EvaluationEngine {
    pub fn new(llm: Arc<dyn LlmClient>, retrieval: Arc<RetrievalIndex>, config: EngineConfig) -> Self {
        Self {
            llm,
            retrieval,
            config,
        }
    }

    /// Execute the scoring chain and emit a schema-valid result
    pub async fn evaluate(&self, input: &EvaluationInput) -> Result<EvaluationResult, EngineError> {
        let context = self.retrieve_context(input).await;
        let sources = context.sources();
        info!(
            job_id = %input.job_id,
            context_chunks = sources.total(),
            "Context retrieval complete"
        );

        let cv = self.score_cv(input, &context).await;
        let project = self.score_project(input, &context).await;
        let overall = self.recommend(input, &cv, &project).await?;

        let (technical, experience, achievements, cultural) = self.cv_breakdown(&cv, &input.cv_text);
        let cv_breakdown = CvBreakdown {
            technical_skills: technical,
            experience_level: experience,
            achievements,
            cultural_fit: cultural,
        };

        let result = EvaluationResult {
            cv_match_rate: cv.match_rate,
            cv_breakdown,
            cv_feedback: cv_feedback_text(&cv),
            project_score: project.overall_score,
            project_breakdown: ProjectBreakdown {
                correctness: project.overall_score,
                code_quality: project.technical_quality,
                resilience: project.complexity_level,
                documentation: project.documentation_quality,
                creativity: project.innovation_score,
            },
            overall_summary: overall_summary_text(&overall),
            recommendation: Recommendation::normalize(&overall.recommendation_text),
            evaluated_at: Utc::now(),
            context_sources: sources,
        }
        .clamped();

        info!(
            job_id = %input.job_id,
            match_rate = result.cv_match_rate,
            project_score = result.project_score,
            recommendation = result.recommendation.as_str(),
            "Evaluation complete"
        );

        Ok(result)
    }

    /// All retrieval queries run concurrently; every failure is already
    /// swallowed to an empty list inside the index.
    async fn retrieve_context(&self, input: &EvaluationInput) -> RetrievedContext {
        let n = self.config.max_results;
        let threshold = self.config.similarity_threshold;
        let title = input.job_title.as_str();

        let cv_rubric_filter = SearchFilter {
            owner_id: None,
            doc_type: Some(DocType::CvRubric.as_str().to_string()),
        };
        let project_rubric_filter = SearchFilter {
            owner_id: None,
            doc_type: Some(DocType::ProjectRubric.as_str().to_string()),
        };

        let cv_rubric_query = format!("{} CV evaluation criteria", title);
        let project_rubric_query = format!("{} project evaluation criteria", title);
        let tech_requirements_query = format!("{} technical requirements", title);

        let (
            job_descriptions,
            cv_rubrics,
            similar_cvs,
            case_studies,
            project_rubrics,
            tech_requirements,
            similar_projects,
        ) = tokio::join!(
            self.retrieval.search(
                title,
                collections::JOB_DESCRIPTIONS,
                n,
                SearchFilter::default(),
                threshold,
            ),
            self.retrieval.search(
                &cv_rubric_query,
                collections::RUBRICS,
                n,
                cv_rubric_filter,
                threshold,
            ),
            self.retrieval.search(
                first_chars(&input.cv_text, QUERY_PREFIX_CHARS),
                collections::CV_DOCUMENTS,
                n,
                SearchFilter::default(),
                threshold,
            ),
            self.retrieval.search(
                title,
                collections::CASE_STUDIES,
                n,
                SearchFilter::default(),
                threshold,
            ),
            self.retrieval.search(
                &project_rubric_query,
                collections::RUBRICS,
                n,
                project_rubric_filter,
                threshold,
            ),
            self.retrieval.search(
                &tech_requirements_query,
                collections::JOB_DESCRIPTIONS,
                n,
                SearchFilter::default(),
                threshold,
            ),
            self.retrieval.search(
                first_chars(&input.project_text, QUERY_PREFIX_CHARS),
                collections::PROJECT_DOCUMENTS,
                n,
                SearchFilter::default(),
                threshold,
            ),
        );

        RetrievedContext {
            job_descriptions,
            cv_rubrics,
            similar_cvs,
            case_studies,
            project_rubrics,
            tech_requirements,
            similar_projects,
        }
    }

    fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            model: self.config.model.clone(),
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        }
    }

    /// CV stage: any call failure or unparseable payload falls back to
    /// the keyword scorer.
    async fn score_cv(&self, input: &EvaluationInput, context: &RetrievedContext) -> CvStage {
        let prompt = prompts::cv_prompt(
            &input.job_title,
            &join_chunks(&context.job_descriptions),
            &join_chunks(&context.cv_rubrics),
            &input.cv_text,
        );

        match self
            .llm
            .evaluate(prompts::CV_SYSTEM, &prompt, &self.chat_options())
            .await
        {
            Ok(evaluation) => match evaluation.parsed.as_ref().and_then(parse::cv_stage) {
                Some(stage) => stage,
                None => {
                    warn!(job_id = %input.job_id, "CV stage returned invalid JSON, using fallback scorer");
                    fallback::cv_stage(&input.cv_text, &input.job_title)
                }
            },
            Err(e) => {
                warn!(job_id = %input.job_id, error = %e, "CV stage failed, using fallback scorer");
                fallback::cv_stage(&input.cv_text, &input.job_title)
            }
        }
    }

    /// Project stage: same fallback policy as the CV stage.
    async fn score_project(
        &self,
        input: &EvaluationInput,
        context: &RetrievedContext,
    ) -> ProjectStage {
        let prompt = prompts::project_prompt(
            &input.job_title,
            &join_chunks(&context.tech_requirements),
            &join_chunks(&context.project_rubrics),
            &input.project_text,
        );

        match self
            .llm
            .evaluate(prompts::PROJECT_SYSTEM, &prompt, &self.chat_options())
            .await
        {
            Ok(evaluation) => match evaluation.parsed.as_ref().and_then(parse::project_stage) {
                Some(stage) => stage,
                None => {
                    warn!(job_id = %input.job_id, "Project stage returned invalid JSON, using fallback scorer");
                    fallback::project_stage(&input.project_text)
                }
            },
            Err(e) => {
                warn!(job_id = %input.job_id, error = %e, "Project stage failed, using fallback scorer");
                fallback::project_stage(&input.project_text)
            }
        }
    }

    /// Final stage. A quota error here is fatal for the job; any other
    /// failure synthesizes the overall block from the stage scores.
    async fn recommend(
        &self,
        input: &EvaluationInput,
        cv: &CvStage,
        project: &ProjectStage,
    ) -> Result<OverallStage, EngineError> {
        let prompt = prompts::overall_prompt(
            &input.job_title,
            &stage_summary_cv(cv),
            &stage_summary_project(project),
        );
        let messages = [
            ChatMessage::system(prompts::OVERALL_SYSTEM),
            ChatMessage::user(prompt),
        ];

        match self.llm.chat(&messages, &self.chat_options()).await {
            Ok(outcome) => match parse::overall_stage(&outcome.content) {
                Some(stage) => Ok(stage),
                None => {
                    warn!(
                        job_id = %input.job_id,
                        "Recommendation stage output missing headers, synthesizing"
                    );
                    Ok(synthesized_overall(cv, project))
                }
            },
            Err(LlmError::Quota {
                retry_after_secs, ..
            }) => Err(EngineError::Quota { retry_after_secs }),
            Err(e) => {
                warn!(
                    job_id = %input.job_id,
                    error = %e,
                    "Recommendation stage failed, synthesizing"
                );
                Ok(synthesized_overall(cv, project))
            }
        }
    }

    /// Derive the four CV sub-scores. The LLM path anchors them on the
    /// reported rates; the fallback path re-runs the keyword classes.
    fn cv_breakdown(&self, cv: &CvStage, cv_text: &str) -> (f32, f32, f32, f32) {
        let (technical, _, achievements, cultural) =
            fallback::cv_breakdown_scores(cv_text, cv.match_rate);
        (
            technical,
            clamp_unit(cv.experience_match),
            achievements,
            cultural,
        )
    }
}

fn first_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn join_chunks(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn cv_feedback_text(cv: &CvStage) -> String {
    let mut feedback = cv.overall_assessment.trim().to_string();
    if !cv.strengths.is_empty() {
        feedback.push_str(&format!("\n\nStrengths: {}.", cv.strengths.join("; ")));
    }
    if !cv.weaknesses.is_empty() {
        feedback.push_str(&format!("\nWeaknesses: {}.", cv.weaknesses.join("; ")));
    }
    if !cv.missing_skills.is_empty() {
        feedback.push_str(&format!("\nMissing skills: {}.", cv.missing_skills.join(", ")));
    }
    feedback
}

fn overall_summary_text(overall: &OverallStage) -> String {
    let mut summary = overall.detailed_feedback.trim().to_string();
    if !overall.specific_recommendations.trim().is_empty() {
        if !summary.is_empty() {
            summary.push_str("\n\n");
        }
        summary.push_str("Recommendations:\n");
        summary.push_str(overall.specific_recommendations.trim());
    }
    summary
}

fn stage_summary_cv(cv: &CvStage) -> String {
    format!(
        "Match rate {:.2}, experience match {:.2}. Strengths: {}. Weaknesses: {}. {}",
        clamp_unit(cv.match_rate),
        clamp_unit(cv.experience_match),
        cv.strengths.join("; "),
        cv.weaknesses.join("; "),
        cv.overall_assessment
    )
}

fn stage_summary_project(project: &ProjectStage) -> String {
    format!(
        "Overall score {:.1}/5 (technical {:.1}, complexity {:.1}, innovation {:.1}, \
         documentation {:.1}). Strengths: {}. Improvements: {}.",
        clamp_scale(project.overall_score),
        clamp_scale(project.technical_quality),
        clamp_scale(project.complexity_level),
        clamp_scale(project.innovation_score),
        clamp_scale(project.documentation_quality),
        project.strengths.join("; "),
        project.improvements.join("; ")
    )
}

/// Deterministic overall block used when the final chat call fails for
/// a non-quota reason: the weighted aggregate picks the recommendation.
fn synthesized_overall(cv: &CvStage, project: &ProjectStage) -> OverallStage {
    let cv_score = clamp_unit((cv.match_rate + cv.experience_match) / 2.0);
    let aggregate = weighted_aggregate(cv_score, project.overall_score, cv.match_rate);

    let recommendation = if aggregate >= 0.75 {
        Recommendation::Hire
    } else if aggregate >= 0.5 {
        Recommendation::ConditionalHire
    } else {
        Recommendation::Reject
    };

    OverallStage {
        recommendation_text: recommendation.as_str().to_string(),
        detailed_feedback: format!(
            "Combined assessment based on the individual stage scores: CV match rate {:.2}, \
             project score {:.1}/5, weighted aggregate {:.2}. {}",
            clamp_unit(cv.match_rate),
            clamp_scale(project.overall_score),
            aggregate,
            cv.overall_assessment
        ),
        specific_recommendations: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{CvStage, ProjectStage};

    fn cv(match_rate: f32) -> CvStage {
        CvStage {
            match_rate,
            experience_match: match_rate,
            strengths: vec!["Rust".into()],
            weaknesses: vec![],
            missing_skills: vec![],
            overall_assessment: "Fine candidate.".into(),
        }
    }

    fn project(score: f32) -> ProjectStage {
        ProjectStage {
            overall_score: score,
            technical_quality: score,
            complexity_level: score,
            innovation_score: score,
            documentation_quality: score,
            strengths: vec![],
            improvements: vec![],
        }
    }

    #[test]
    fn test_synthesized_overall_thresholds() {
        let strong = synthesized_overall(&cv(0.9), &project(4.8));
        assert_eq!(strong.recommendation_text, "HIRE");

        let middling = synthesized_overall(&cv(0.55), &project(3.2));
        assert_eq!(middling.recommendation_text, "CONDITIONAL_HIRE");

        let weak = synthesized_overall(&cv(0.2), &project(1.5));
        assert_eq!(weak.recommendation_text, "REJECT");
    }

    #[test]
    fn test_first_chars_respects_boundaries() {
        assert_eq!(first_chars("héllo", 2), "hé");
        assert_eq!(first_chars("ab", 10), "ab");
    }

    #[test]
    fn test_cv_feedback_composition() {
        let stage = CvStage {
            match_rate: 0.8,
            experience_match: 0.8,
            strengths: vec!["AWS".into()],
            weaknesses: vec!["No k8s".into()],
            missing_skills: vec!["Terraform".into()],
            overall_assessment: "Solid.".into(),
        };
        let feedback = cv_feedback_text(&stage);
        assert!(feedback.starts_with("Solid."));
        assert!(feedback.contains("Strengths: AWS."));
        assert!(feedback.contains("Missing skills: Terraform."));
    }
}
