//! End-to-end chain tests with a scripted LLM and in-memory retrieval

use async_trait::async_trait;
use chrono::Utc;
use hirelens_common::config::RetrievalConfig;
use hirelens_common::db::models::{DocType, Document};
use hirelens_common::errors::AppError;
use hirelens_common::llm::{
    hash_embedding, ChatMessage, ChatOptions, ChatOutcome, Embedder, LlmClient, LlmError,
};
use hirelens_engine::{
    EngineConfig, EngineError, EvaluationEngine, EvaluationInput, Recommendation,
};
use hirelens_retrieval::{
    collections, ChunkRecord, RetrievalIndex, ScoredChunk, SearchFilter, VectorStore,
};
use hirelens_retrieval::MemoryVectorStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const CV_TEXT: &str = "Senior backend engineer, 6 years Node.js, AWS, MongoDB. Led a team of \
                       four engineers and improved API latency by 40%.";
const PROJECT_TEXT: &str = "Built a microservice for order processing with retry logic, \
                            integration tests and a detailed README covering deployment.";

const CV_JSON: &str = r#"{
    "matchRate": 0.85,
    "experienceMatch": 0.8,
    "strengths": ["Node.js", "AWS"],
    "weaknesses": ["No Kubernetes exposure"],
    "missingSkills": ["Terraform"],
    "overallAssessment": "Strong backend candidate with relevant cloud experience."
}"#;

const PROJECT_JSON: &str = r#"{
    "overallScore": 4.2,
    "technicalQuality": 4.0,
    "complexityLevel": 3.8,
    "innovationScore": 3.5,
    "documentationQuality": 4.5,
    "strengths": ["Resilient design"],
    "improvements": ["Add load testing"]
}"#;

const OVERALL_TEXT: &str = "RECOMMENDATION: HIRE\n\
                            DETAILED FEEDBACK: The CV shows strong alignment and the project \
                            demonstrates production thinking.\n\
                            SPECIFIC RECOMMENDATIONS: 1. Proceed to the system design interview.";

/// LLM double that replays a scripted sequence of chat outcomes
struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(script: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _opts: &ChatOptions,
    ) -> Result<ChatOutcome, LlmError> {
        self.prompts.lock().unwrap().push(
            messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
        );

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Transient {
                    message: "script exhausted".into(),
                    status_code: None,
                })
            });

        next.map(|content| ChatOutcome {
            content,
            model: "scripted".into(),
            finish_reason: Some("stop".into()),
            usage: None,
        })
    }
}

struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(hash_embedding(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| hash_embedding(t)).collect())
    }
}

/// Store whose every operation fails
struct BrokenStore;

#[async_trait]
impl VectorStore for BrokenStore {
    async fn upsert(
        &self,
        _collection: &str,
        _chunks: Vec<ChunkRecord>,
    ) -> hirelens_common::Result<()> {
        Err(AppError::Persistence {
            message: "store unreachable".into(),
        })
    }

    async fn search(
        &self,
        _collection: &str,
        _embedding: &[f32],
        _limit: usize,
        _threshold: f32,
        _filter: &SearchFilter,
    ) -> hirelens_common::Result<Vec<ScoredChunk>> {
        Err(AppError::Persistence {
            message: "store unreachable".into(),
        })
    }

    async fn remove(&self, _collection: &str, _doc_id: Uuid) -> hirelens_common::Result<()> {
        Err(AppError::Persistence {
            message: "store unreachable".into(),
        })
    }
}

fn retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        chunk_size: 300,
        chunk_overlap: 50,
        min_chunk_size: 20,
        timeout_secs: 2,
        max_results: 3,
        similarity_threshold: 0.0,
    }
}

fn engine_config() -> EngineConfig {
    EngineConfig {
        model: None,
        temperature: 0.3,
        max_tokens: 2000,
        max_results: 3,
        // Hash embeddings of unrelated texts score near zero; accept
        // everything so seeded context is always visible to prompts.
        similarity_threshold: -1.0,
    }
}

fn input() -> EvaluationInput {
    EvaluationInput {
        job_id: "eval_test_1".into(),
        owner_id: Uuid::new_v4(),
        job_title: "Backend Engineer".into(),
        cv_text: CV_TEXT.into(),
        project_text: PROJECT_TEXT.into(),
    }
}

fn engine_with(
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn VectorStore>,
) -> (EvaluationEngine, Arc<RetrievalIndex>) {
    let retrieval = Arc::new(RetrievalIndex::new(
        store,
        Arc::new(HashEmbedder),
        &retrieval_config(),
    ));
    (
        EvaluationEngine::new(llm, retrieval.clone(), engine_config()),
        retrieval,
    )
}

fn reference_doc(doc_type: DocType, text: &str) -> Document {
    Document {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        doc_type: doc_type.as_str().to_string(),
        extracted_text: text.to_string(),
        vectorized: true,
        created_at: Utc::now().into(),
    }
}

#[tokio::test]
async fn happy_path_produces_llm_scores() {
    let llm = ScriptedLlm::new(vec![
        Ok(CV_JSON.into()),
        Ok(PROJECT_JSON.into()),
        Ok(OVERALL_TEXT.into()),
    ]);
    let (engine, _) = engine_with(llm.clone(), Arc::new(MemoryVectorStore::new()));

    let result = engine.evaluate(&input()).await.unwrap();

    assert_eq!(result.cv_match_rate, 0.85);
    assert_eq!(result.project_score, 4.2);
    assert_eq!(result.recommendation, Recommendation::Hire);
    assert!(result.cv_feedback.contains("Strong backend candidate"));
    assert!(result.overall_summary.contains("production thinking"));
    assert_eq!(result.project_breakdown.documentation, 4.5);
    assert_eq!(result.context_sources.total(), 0);

    // Score ranges hold for every completed evaluation
    assert!((0.0..=1.0).contains(&result.cv_match_rate));
    assert!((1.0..=5.0).contains(&result.project_score));
}

#[tokio::test]
async fn retrieved_context_is_embedded_in_prompts() {
    let store = Arc::new(MemoryVectorStore::new());
    let llm = ScriptedLlm::new(vec![
        Ok(CV_JSON.into()),
        Ok(PROJECT_JSON.into()),
        Ok(OVERALL_TEXT.into()),
    ]);
    let (engine, retrieval) = engine_with(llm.clone(), store);

    let rubric = reference_doc(
        DocType::CvRubric,
        "Weigh production experience at forty percent of the total CV score for this role.",
    );
    retrieval
        .index_document(&rubric, collections::RUBRICS)
        .await
        .unwrap();

    let result = engine.evaluate(&input()).await.unwrap();
    assert!(result.context_sources.cv_rubrics > 0);

    // First prompt is the CV stage; the rubric text must appear in it.
    let cv_prompt = llm.prompt(0);
    assert!(cv_prompt.contains("production experience at forty percent"));
}

#[tokio::test]
async fn invalid_cv_json_falls_back_deterministically() {
    let llm = ScriptedLlm::new(vec![
        Ok("I cannot produce JSON today, sorry.".into()),
        Ok(PROJECT_JSON.into()),
        Ok(OVERALL_TEXT.into()),
    ]);
    let (engine, _) = engine_with(llm, Arc::new(MemoryVectorStore::new()));

    let result = engine.evaluate(&input()).await.unwrap();

    // Fallback keyword scorer: CV contains both title tokens, capped at 0.9
    assert!((result.cv_match_rate - 0.9).abs() < 1e-6);
    assert_eq!(result.project_score, 4.2);
    assert_eq!(result.recommendation, Recommendation::Hire);
}

#[tokio::test]
async fn transient_failures_on_all_stages_still_complete() {
    let transient = || {
        Err(LlmError::Transient {
            message: "503 upstream".into(),
            status_code: Some(503),
        })
    };
    let llm = ScriptedLlm::new(vec![transient(), transient(), transient()]);
    let (engine, _) = engine_with(llm, Arc::new(MemoryVectorStore::new()));

    let result = engine.evaluate(&input()).await.unwrap();

    assert!((0.0..=1.0).contains(&result.cv_match_rate));
    assert!((1.0..=5.0).contains(&result.project_score));
    assert!(!result.overall_summary.is_empty());
}

#[tokio::test]
async fn quota_at_recommendation_stage_is_fatal() {
    let llm = ScriptedLlm::new(vec![
        Ok(CV_JSON.into()),
        Ok(PROJECT_JSON.into()),
        Err(LlmError::Quota {
            message: "insufficient_quota".into(),
            retry_after_secs: Some(60),
        }),
    ]);
    let (engine, _) = engine_with(llm, Arc::new(MemoryVectorStore::new()));

    let err = engine.evaluate(&input()).await.unwrap_err();
    match err {
        EngineError::Quota { retry_after_secs } => assert_eq!(retry_after_secs, Some(60)),
        other => panic!("expected quota error, got {other:?}"),
    }

    let app: AppError = EngineError::Quota {
        retry_after_secs: Some(60),
    }
    .into();
    assert!(app.to_string().contains("API usage limits"));
}

#[tokio::test]
async fn broken_retrieval_everywhere_still_completes() {
    let llm = ScriptedLlm::new(vec![
        Ok(CV_JSON.into()),
        Ok(PROJECT_JSON.into()),
        Ok(OVERALL_TEXT.into()),
    ]);
    let (engine, _) = engine_with(llm, Arc::new(BrokenStore));

    let result = engine.evaluate(&input()).await.unwrap();
    assert_eq!(result.context_sources.total(), 0);
    assert_eq!(result.recommendation, Recommendation::Hire);
}
