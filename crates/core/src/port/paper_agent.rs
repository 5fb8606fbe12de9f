// Paper Agent Port - the stage executor collaborator
// Abstraction over the LLM agents that extract, plan, research, write and evaluate

use crate::domain::paper::{ChapterKind, QualityReport};
use crate::domain::pipeline::{Drafted, PaperPlan, PreparedInput, TopicBrief};
use crate::domain::PaperRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Agent operations, used as the stage id when talking to an external agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStage {
    ExtractTopic,
    Plan,
    Research,
    Write,
    Evaluate,
    Bibliography,
    Review,
}

impl AgentStage {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStage::ExtractTopic => "extract_topic",
            AgentStage::Plan => "plan",
            AgentStage::Research => "research",
            AgentStage::Write => "write",
            AgentStage::Evaluate => "evaluate",
            AgentStage::Bibliography => "bibliography",
            AgentStage::Review => "review",
        }
    }
}

impl std::fmt::Display for AgentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of text that goes through the quality loop
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WritingUnit {
    Introduction,
    Section { chapter: ChapterKind, index: usize },
    Conclusion,
}

impl WritingUnit {
    /// Stable key used in logs and reports (`introduction`, `analysis/0`, ...)
    pub fn key(&self) -> String {
        match self {
            WritingUnit::Introduction => "introduction".to_string(),
            WritingUnit::Section { chapter, index } => format!("{}/{}", chapter, index),
            WritingUnit::Conclusion => "conclusion".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    pub language: String,
    pub keywords: Vec<String>,
    pub chapter_title: String,
    pub section_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritingRequest {
    pub unit: WritingUnit,
    pub title: String,
    pub topic: String,
    pub language: String,
    pub target_pages: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research: Option<String>,
    /// Surrounding structure (chapter titles, sibling sections)
    #[serde(default)]
    pub outline: Vec<String>,
    /// Evaluator feedback from the previous attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub attempt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub unit: WritingUnit,
    pub topic: String,
    pub language: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    /// Score in [0, 1]
    pub score: f64,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BibliographyRequest {
    pub topic: String,
    pub language: String,
    pub chapter_titles: Vec<String>,
    pub research_notes: Vec<String>,
}

/// Agent errors
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Agent timed out after {0}ms")]
    Timeout(u64),

    #[error("Agent failed: {0}")]
    Failed(String),

    #[error("Invalid agent response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Stage executor for paper generation
///
/// Implementations are slow (seconds to minutes per call) and may fail at any
/// call. The pipeline treats every method as an opaque async step.
#[async_trait]
pub trait PaperAgent: Send + Sync {
    /// Normalise the requested topic into a title, topic statement and keywords
    async fn extract_topic(&self, request: &PaperRequest) -> Result<TopicBrief, AgentError>;

    /// Plan the three chapters and their section titles
    async fn plan(&self, prepared: &PreparedInput) -> Result<PaperPlan, AgentError>;

    /// Gather research notes for one section
    async fn research(&self, request: &ResearchRequest) -> Result<String, AgentError>;

    /// Write one unit of text (introduction, section or conclusion)
    async fn write(&self, request: &WritingRequest) -> Result<String, AgentError>;

    /// Score one unit of text against the quality rubric
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationVerdict, AgentError>;

    async fn compile_bibliography(
        &self,
        request: &BibliographyRequest,
    ) -> Result<Vec<String>, AgentError>;

    /// Whole-paper review
    async fn review(&self, draft: &Drafted) -> Result<QualityReport, AgentError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::pipeline::ChapterPlan;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    /// Scripted agent
    ///
    /// Text is deterministic, evaluation scores can be scripted per unit key,
    /// and `extract_topic` can be held behind a gate so tests can observe
    /// jobs while they are `processing`.
    pub struct MockPaperAgent {
        sections_per_chapter: usize,
        words_per_unit: usize,
        scores: Mutex<HashMap<String, VecDeque<f64>>>,
        default_score: f64,
        failing_units: Mutex<HashSet<String>>,
        failing_stages: Mutex<HashSet<AgentStage>>,
        gate: Option<Arc<Semaphore>>,
        started_topics: Mutex<Vec<String>>,
        write_requests: Mutex<Vec<WritingRequest>>,
        evaluate_calls: AtomicUsize,
    }

    impl Default for MockPaperAgent {
        fn default() -> Self {
            Self {
                sections_per_chapter: 2,
                words_per_unit: 40,
                scores: Mutex::new(HashMap::new()),
                default_score: 0.9,
                failing_units: Mutex::new(HashSet::new()),
                failing_stages: Mutex::new(HashSet::new()),
                gate: None,
                started_topics: Mutex::new(Vec::new()),
                write_requests: Mutex::new(Vec::new()),
                evaluate_calls: AtomicUsize::new(0),
            }
        }
    }

    impl MockPaperAgent {
        pub fn new() -> Self {
            Self::default()
        }

        /// Hold every job at topic extraction until `release` is called
        pub fn gated() -> Self {
            Self {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Self::default()
            }
        }

        pub fn with_sections_per_chapter(mut self, sections: usize) -> Self {
            self.sections_per_chapter = sections;
            self
        }

        pub fn with_words_per_unit(mut self, words: usize) -> Self {
            self.words_per_unit = words;
            self
        }

        /// Scores returned for `unit_key`, in order; afterwards the default applies
        pub fn script_scores(&self, unit_key: &str, scores: &[f64]) {
            self.scores
                .lock()
                .unwrap()
                .insert(unit_key.to_string(), scores.iter().copied().collect());
        }

        /// Every write of `unit_key` fails
        pub fn fail_unit(&self, unit_key: &str) {
            self.failing_units
                .lock()
                .unwrap()
                .insert(unit_key.to_string());
        }

        pub fn fail_stage(&self, stage: AgentStage) {
            self.failing_stages.lock().unwrap().insert(stage);
        }

        /// Let `jobs` more jobs past the gate
        pub fn release(&self, jobs: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(jobs);
            }
        }

        /// Topics in the order their pipelines started
        pub fn started_topics(&self) -> Vec<String> {
            self.started_topics.lock().unwrap().clone()
        }

        pub fn write_requests(&self) -> Vec<WritingRequest> {
            self.write_requests.lock().unwrap().clone()
        }

        pub fn evaluate_calls(&self) -> usize {
            self.evaluate_calls.load(Ordering::SeqCst)
        }

        fn check_stage(&self, stage: AgentStage) -> Result<(), AgentError> {
            if self.failing_stages.lock().unwrap().contains(&stage) {
                return Err(AgentError::Failed(format!("{} unavailable", stage)));
            }
            Ok(())
        }

        fn filler(&self, seed: &str) -> String {
            vec![seed; self.words_per_unit].join(" ")
        }
    }

    #[async_trait]
    impl PaperAgent for MockPaperAgent {
        async fn extract_topic(&self, request: &PaperRequest) -> Result<TopicBrief, AgentError> {
            self.started_topics
                .lock()
                .unwrap()
                .push(request.topic.clone());
            if let Some(gate) = &self.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| AgentError::Failed(e.to_string()))?;
                permit.forget();
            }
            self.check_stage(AgentStage::ExtractTopic)?;
            Ok(TopicBrief {
                title: request.topic.clone(),
                topic: request.topic.clone(),
                keywords: vec!["economy".to_string()],
            })
        }

        async fn plan(&self, prepared: &PreparedInput) -> Result<PaperPlan, AgentError> {
            self.check_stage(AgentStage::Plan)?;
            let chapters = ChapterKind::ALL
                .iter()
                .map(|kind| ChapterPlan {
                    kind: *kind,
                    title: format!("{} of {}", kind, prepared.brief.topic),
                    sections: (0..self.sections_per_chapter)
                        .map(|i| format!("{}.{}", kind.numeral(), i + 1))
                        .collect(),
                })
                .collect();
            Ok(PaperPlan { chapters })
        }

        async fn research(&self, request: &ResearchRequest) -> Result<String, AgentError> {
            self.check_stage(AgentStage::Research)?;
            Ok(format!("notes on {}", request.section_title))
        }

        async fn write(&self, request: &WritingRequest) -> Result<String, AgentError> {
            self.write_requests.lock().unwrap().push(request.clone());
            self.check_stage(AgentStage::Write)?;
            let key = request.unit.key();
            if self.failing_units.lock().unwrap().contains(&key) {
                return Err(AgentError::Failed(format!("writer crashed on {}", key)));
            }
            tokio::task::yield_now().await;
            Ok(format!(
                "[{} attempt {}] {}",
                key,
                request.attempt,
                self.filler("word")
            ))
        }

        async fn evaluate(
            &self,
            request: &EvaluationRequest,
        ) -> Result<EvaluationVerdict, AgentError> {
            self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
            self.check_stage(AgentStage::Evaluate)?;
            let score = self
                .scores
                .lock()
                .unwrap()
                .get_mut(&request.unit.key())
                .and_then(|queue| queue.pop_front())
                .unwrap_or(self.default_score);
            Ok(EvaluationVerdict {
                score,
                details: format!("score {:.2} for {}", score, request.unit.key()),
            })
        }

        async fn compile_bibliography(
            &self,
            request: &BibliographyRequest,
        ) -> Result<Vec<String>, AgentError> {
            self.check_stage(AgentStage::Bibliography)?;
            Ok(request
                .chapter_titles
                .iter()
                .enumerate()
                .map(|(i, title)| format!("{}. Author. {}", i + 1, title))
                .collect())
        }

        async fn review(&self, _draft: &Drafted) -> Result<QualityReport, AgentError> {
            self.check_stage(AgentStage::Review)?;
            Ok(QualityReport {
                overall_score: 0.9,
                passed: true,
                issues: Vec::new(),
                units_below_threshold: Vec::new(),
            })
        }
    }
}
