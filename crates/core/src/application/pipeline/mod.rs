// Pipeline Executor - fixed stage chain for one paper
//
// Each stage consumes the accumulated document and returns the next one.
// WritingChapters fans out to one sub-pipeline per chapter and fans back in
// when all of them finish or any one fails.

pub mod pages;
pub mod progress;
pub mod quality;

use crate::application::constants::{
    CONCLUSION_MAX_ATTEMPTS, DEFAULT_QUALITY_THRESHOLD, DEFAULT_TARGET_PAGES,
    EVALUATOR_FALLBACK_SCORE, INTRODUCTION_MAX_ATTEMPTS, SECTION_MAX_ATTEMPTS,
};
use crate::domain::paper::{Chapter, ChapterKind, QualityReport, Section, WrittenText};
use crate::domain::pipeline::{
    ChapterPlan, ChaptersWritten, Concluded, Drafted, Evaluated, Introduced, Measured,
    PaperDocument, PaperPlan, Planned, PreparedInput, Rendered, Requested, Researched,
};
use crate::domain::{PaperRequest, PaperResult, PipelineStage};
use crate::error::AppError;
use crate::port::{
    AgentError, BibliographyRequest, DocumentRenderer, PaperAgent, ResearchRequest,
    WritingRequest, WritingUnit,
};
use futures::future::try_join_all;
use progress::ProgressSink;
use quality::{Accepted, QualityGate, RetryReport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Tunables for the quality loop
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub quality_threshold: f64,
    pub introduction_max_attempts: u32,
    pub section_max_attempts: u32,
    pub conclusion_max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            introduction_max_attempts: INTRODUCTION_MAX_ATTEMPTS,
            section_max_attempts: SECTION_MAX_ATTEMPTS,
            conclusion_max_attempts: CONCLUSION_MAX_ATTEMPTS,
        }
    }
}

/// Why a stage could not produce its document
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Progress could not be persisted
    #[error(transparent)]
    Progress(#[from] AppError),
}

/// Stage failure; the job fails with this message
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: PipelineStage,
    #[source]
    pub source: PipelineError,
}

pub struct PipelineExecutor {
    agent: Arc<dyn PaperAgent>,
    renderer: Arc<dyn DocumentRenderer>,
    gate: QualityGate,
    config: PipelineConfig,
}

impl PipelineExecutor {
    pub fn new(
        agent: Arc<dyn PaperAgent>,
        renderer: Arc<dyn DocumentRenderer>,
        config: PipelineConfig,
    ) -> Self {
        let gate = QualityGate::new(agent.clone(), config.quality_threshold);
        Self {
            agent,
            renderer,
            gate,
            config,
        }
    }

    /// Run every stage for one job
    ///
    /// # Errors
    /// The first failing stage aborts the run; nothing produced so far is kept.
    pub async fn run(
        &self,
        job_id: &str,
        request: &PaperRequest,
        sink: &dyn ProgressSink,
    ) -> Result<PaperResult, StageError> {
        let mut document = PaperDocument::Requested(Requested {
            job_id: job_id.to_string(),
            request: request.clone(),
        });

        loop {
            document = match document {
                PaperDocument::Rendered(rendered) => {
                    sink.report(
                        PipelineStage::Done.progress_floor(),
                        PipelineStage::Done.label(),
                    )
                    .await
                    .map_err(|e| StageError {
                        stage: PipelineStage::Done,
                        source: e.into(),
                    })?;
                    return Ok(rendered.into_result());
                }
                other => {
                    let stage = other.next_stage();
                    debug!(job_id = %job_id, stage = ?stage, "Entering stage");
                    self.advance(stage, other, sink)
                        .await
                        .map_err(|source| StageError { stage, source })?
                }
            };
        }
    }

    async fn advance(
        &self,
        stage: PipelineStage,
        document: PaperDocument,
        sink: &dyn ProgressSink,
    ) -> Result<PaperDocument, PipelineError> {
        sink.report(stage.progress_floor(), stage.label()).await?;

        let next = match document {
            PaperDocument::Requested(requested) => {
                PaperDocument::Prepared(self.prepare(requested).await?)
            }
            PaperDocument::Prepared(prepared) => {
                PaperDocument::Planned(self.plan(prepared).await?)
            }
            PaperDocument::Planned(planned) => {
                PaperDocument::Researched(self.research(planned, sink).await?)
            }
            PaperDocument::Researched(researched) => {
                PaperDocument::Introduced(self.write_introduction(researched, sink).await?)
            }
            PaperDocument::Introduced(introduced) => {
                PaperDocument::ChaptersWritten(self.write_chapters(introduced, sink).await?)
            }
            PaperDocument::ChaptersWritten(written) => {
                PaperDocument::Concluded(self.write_conclusion(written, sink).await?)
            }
            PaperDocument::Concluded(concluded) => {
                PaperDocument::Drafted(self.compile_bibliography(concluded).await?)
            }
            PaperDocument::Drafted(drafted) => {
                PaperDocument::Evaluated(self.check_quality(drafted).await)
            }
            PaperDocument::Evaluated(evaluated) => {
                let page_report = pages::measure(&evaluated.drafted);
                info!(
                    job_id = %evaluated.drafted.prepared.job_id,
                    words = page_report.word_count,
                    pages = page_report.estimated_pages,
                    target = page_report.target_pages,
                    within_tolerance = page_report.within_tolerance,
                    "Page count"
                );
                PaperDocument::Measured(Measured {
                    evaluated,
                    page_report,
                })
            }
            PaperDocument::Measured(measured) => {
                let document = self.renderer.render(&measured).await?;
                PaperDocument::Rendered(Rendered { measured, document })
            }
            PaperDocument::Rendered(rendered) => PaperDocument::Rendered(rendered),
        };

        Ok(next)
    }

    async fn prepare(&self, requested: Requested) -> Result<PreparedInput, PipelineError> {
        let brief = self.agent.extract_topic(&requested.request).await?;
        let target_pages = requested.request.page_count.unwrap_or(DEFAULT_TARGET_PAGES);

        Ok(PreparedInput {
            job_id: requested.job_id,
            request: requested.request,
            brief,
            target_pages,
        })
    }

    async fn plan(&self, prepared: PreparedInput) -> Result<Planned, PipelineError> {
        let plan = normalize_plan(self.agent.plan(&prepared).await?)?;
        Ok(Planned { prepared, plan })
    }

    async fn research(
        &self,
        planned: Planned,
        sink: &dyn ProgressSink,
    ) -> Result<Researched, PipelineError> {
        let Planned { prepared, plan } = planned;
        let stage = PipelineStage::Researching;
        let total: usize = plan.chapters.iter().map(|c| c.sections.len()).sum();
        let mut done = 0;

        let mut chapters = Vec::with_capacity(plan.chapters.len());
        for chapter_plan in plan.chapters {
            let mut sections = Vec::with_capacity(chapter_plan.sections.len());
            for section_title in chapter_plan.sections {
                let notes = self
                    .agent
                    .research(&ResearchRequest {
                        topic: prepared.brief.topic.clone(),
                        language: prepared.request.language.clone(),
                        keywords: prepared.brief.keywords.clone(),
                        chapter_title: chapter_plan.title.clone(),
                        section_title: section_title.clone(),
                    })
                    .await?;

                let mut section = Section::titled(section_title);
                section.researched_data = notes;
                sections.push(section);

                done += 1;
                sink.report(stage.progress_within(done, total), stage.label())
                    .await?;
            }
            chapters.push(Chapter {
                kind: chapter_plan.kind,
                chapter_title: chapter_plan.title,
                sections,
            });
        }

        Ok(Researched { prepared, chapters })
    }

    async fn write_introduction(
        &self,
        researched: Researched,
        sink: &dyn ProgressSink,
    ) -> Result<Introduced, PipelineError> {
        let stage = PipelineStage::WritingIntro;
        let request = WritingRequest {
            outline: outline(&researched.chapters),
            ..writing_request(&researched.prepared, WritingUnit::Introduction)
        };

        let accepted = self
            .gate
            .write_until_accepted(
                request,
                self.config.introduction_max_attempts,
                RetryReport {
                    sink,
                    progress: stage.progress_floor(),
                    label: stage.label(),
                },
            )
            .await?;

        Ok(Introduced {
            researched,
            introduction: written_text(accepted),
        })
    }

    async fn write_chapters(
        &self,
        introduced: Introduced,
        sink: &dyn ProgressSink,
    ) -> Result<ChaptersWritten, PipelineError> {
        let Introduced {
            researched,
            introduction,
        } = introduced;
        let Researched { prepared, chapters } = researched;

        let total: usize = chapters.iter().map(|c| c.sections.len()).sum();
        let done = AtomicUsize::new(0);

        // Chapters are independent; the first failure aborts the fan-in
        let chapters = try_join_all(
            chapters
                .into_iter()
                .map(|chapter| self.write_chapter(&prepared, chapter, sink, &done, total)),
        )
        .await?;

        Ok(ChaptersWritten {
            prepared,
            introduction,
            chapters,
        })
    }

    async fn write_chapter(
        &self,
        prepared: &PreparedInput,
        mut chapter: Chapter,
        sink: &dyn ProgressSink,
        done: &AtomicUsize,
        total: usize,
    ) -> Result<Chapter, PipelineError> {
        let stage = PipelineStage::WritingChapters;

        for (index, section) in chapter.sections.iter_mut().enumerate() {
            let request = WritingRequest {
                chapter_title: Some(chapter.chapter_title.clone()),
                section_title: Some(section.title.clone()),
                research: Some(section.researched_data.clone()),
                ..writing_request(
                    prepared,
                    WritingUnit::Section {
                        chapter: chapter.kind,
                        index,
                    },
                )
            };

            let accepted = self
                .gate
                .write_until_accepted(
                    request,
                    self.config.section_max_attempts,
                    RetryReport {
                        sink,
                        progress: stage.progress_within(done.load(Ordering::SeqCst), total),
                        label: stage.label(),
                    },
                )
                .await?;

            section.content = accepted.content;
            section.evaluation = Some(accepted.evaluation);

            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            sink.report(stage.progress_within(finished, total), stage.label())
                .await?;
        }

        debug!(
            job_id = %prepared.job_id,
            chapter = %chapter.kind,
            sections = chapter.sections.len(),
            "Chapter written"
        );
        Ok(chapter)
    }

    async fn write_conclusion(
        &self,
        written: ChaptersWritten,
        sink: &dyn ProgressSink,
    ) -> Result<Concluded, PipelineError> {
        let stage = PipelineStage::WritingConclusion;
        let request = WritingRequest {
            outline: outline(&written.chapters),
            ..writing_request(&written.prepared, WritingUnit::Conclusion)
        };

        let accepted = self
            .gate
            .write_until_accepted(
                request,
                self.config.conclusion_max_attempts,
                RetryReport {
                    sink,
                    progress: stage.progress_floor(),
                    label: stage.label(),
                },
            )
            .await?;

        Ok(Concluded {
            written,
            conclusion: written_text(accepted),
        })
    }

    async fn compile_bibliography(&self, concluded: Concluded) -> Result<Drafted, PipelineError> {
        let Concluded {
            written,
            conclusion,
        } = concluded;
        let ChaptersWritten {
            prepared,
            introduction,
            chapters,
        } = written;

        let request = BibliographyRequest {
            topic: prepared.brief.topic.clone(),
            language: prepared.request.language.clone(),
            chapter_titles: chapters.iter().map(|c| c.chapter_title.clone()).collect(),
            research_notes: chapters
                .iter()
                .flat_map(|c| c.sections.iter())
                .map(|s| s.researched_data.clone())
                .collect(),
        };
        let bibliography = self.agent.compile_bibliography(&request).await?;

        Ok(Drafted {
            prepared,
            introduction,
            chapters,
            conclusion,
            bibliography,
        })
    }

    /// Whole-paper review; never fails the job
    async fn check_quality(&self, drafted: Drafted) -> Evaluated {
        let below = units_below_threshold(&drafted);

        let mut quality_report = match self.agent.review(&drafted).await {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    job_id = %drafted.prepared.job_id,
                    error = %e,
                    "Quality review failed, using unit evaluations"
                );
                QualityReport {
                    overall_score: mean_score(&drafted).unwrap_or(EVALUATOR_FALLBACK_SCORE),
                    passed: below.is_empty(),
                    issues: vec![format!("quality review unavailable: {}", e)],
                    units_below_threshold: Vec::new(),
                }
            }
        };

        for unit in below {
            if !quality_report.units_below_threshold.contains(&unit) {
                quality_report.units_below_threshold.push(unit);
            }
        }

        Evaluated {
            drafted,
            quality_report,
        }
    }
}

/// Exactly one chapter of each kind, in canonical order, none empty
fn normalize_plan(plan: PaperPlan) -> Result<PaperPlan, AgentError> {
    let mut chapters: Vec<ChapterPlan> = Vec::with_capacity(ChapterKind::ALL.len());

    for kind in ChapterKind::ALL {
        let mut matching = plan.chapters.iter().filter(|c| c.kind == kind);
        let chapter = match (matching.next(), matching.next()) {
            (Some(chapter), None) => chapter,
            (None, _) => {
                return Err(AgentError::InvalidResponse(format!(
                    "plan is missing the {} chapter",
                    kind
                )))
            }
            (Some(_), Some(_)) => {
                return Err(AgentError::InvalidResponse(format!(
                    "plan has more than one {} chapter",
                    kind
                )))
            }
        };
        if chapter.sections.is_empty() {
            return Err(AgentError::InvalidResponse(format!(
                "{} chapter has no sections",
                kind
            )));
        }
        chapters.push(chapter.clone());
    }

    Ok(PaperPlan { chapters })
}

fn writing_request(prepared: &PreparedInput, unit: WritingUnit) -> WritingRequest {
    WritingRequest {
        unit,
        title: prepared.brief.title.clone(),
        topic: prepared.brief.topic.clone(),
        language: prepared.request.language.clone(),
        target_pages: prepared.target_pages,
        chapter_title: None,
        section_title: None,
        research: None,
        outline: Vec::new(),
        feedback: None,
        attempt: 0,
    }
}

fn outline(chapters: &[Chapter]) -> Vec<String> {
    chapters
        .iter()
        .flat_map(|chapter| {
            std::iter::once(format!("{}. {}", chapter.kind.numeral(), chapter.chapter_title)).chain(
                chapter
                    .sections
                    .iter()
                    .map(|section| format!("  {}", section.title)),
            )
        })
        .collect()
}

fn written_text(accepted: Accepted) -> WrittenText {
    WrittenText {
        content: accepted.content,
        evaluation: Some(accepted.evaluation),
    }
}

fn units_below_threshold(drafted: &Drafted) -> Vec<String> {
    let mut units = Vec::new();
    if drafted
        .introduction
        .evaluation
        .as_ref()
        .is_some_and(|e| !e.passed)
    {
        units.push(WritingUnit::Introduction.key());
    }
    for chapter in &drafted.chapters {
        for (index, section) in chapter.sections.iter().enumerate() {
            if section.evaluation.as_ref().is_some_and(|e| !e.passed) {
                units.push(
                    WritingUnit::Section {
                        chapter: chapter.kind,
                        index,
                    }
                    .key(),
                );
            }
        }
    }
    if drafted
        .conclusion
        .evaluation
        .as_ref()
        .is_some_and(|e| !e.passed)
    {
        units.push(WritingUnit::Conclusion.key());
    }
    units
}

fn mean_score(drafted: &Drafted) -> Option<f64> {
    let scores: Vec<f64> = std::iter::once(&drafted.introduction.evaluation)
        .chain(drafted.chapters.iter().flat_map(|c| c.sections.iter().map(|s| &s.evaluation)))
        .chain(std::iter::once(&drafted.conclusion.evaluation))
        .filter_map(|e| e.as_ref().map(|e| e.score))
        .collect();

    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::progress::mocks::RecordingSink;
    use super::*;
    use crate::port::paper_agent::mocks::MockPaperAgent;
    use crate::port::renderer::mocks::RecordingRenderer;
    use crate::port::AgentStage;

    fn executor(agent: Arc<MockPaperAgent>, renderer: Arc<RecordingRenderer>) -> PipelineExecutor {
        PipelineExecutor::new(agent, renderer, PipelineConfig::default())
    }

    fn request() -> PaperRequest {
        PaperRequest::new("Inflation in Kazakhstan", "english")
    }

    #[tokio::test]
    async fn test_full_run_produces_three_chapters() {
        let agent = Arc::new(MockPaperAgent::new());
        let renderer = Arc::new(RecordingRenderer::new());
        let sink = RecordingSink::new();

        let result = executor(agent, renderer.clone())
            .run("job-1", &request(), &sink)
            .await
            .unwrap();

        let kinds: Vec<ChapterKind> = result.chapters.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, ChapterKind::ALL.to_vec());
        assert!(result
            .chapters
            .iter()
            .all(|c| c.sections.len() == 2 && c.sections.iter().all(|s| !s.content.is_empty())));
        assert_eq!(result.chapters[1].sections[0].researched_data, "notes on II.1");
        assert_eq!(result.bibliography.len(), 3);
        assert_eq!(result.document.path, "/papers/job-1.md");
        assert_eq!(result.page_report.target_pages, DEFAULT_TARGET_PAGES);
        assert!(result.quality_report.units_below_threshold.is_empty());
        assert_eq!(renderer.rendered(), vec!["Inflation in Kazakhstan".to_string()]);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_stage_driven() {
        let agent = Arc::new(MockPaperAgent::new());
        let sink = RecordingSink::new();

        executor(agent, Arc::new(RecordingRenderer::new()))
            .run("job-1", &request(), &sink)
            .await
            .unwrap();

        let reports = sink.reports();
        assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(reports.first().map(|r| r.0), Some(0));
        assert_eq!(reports.last().map(|r| r.0), Some(100));

        let steps = sink.steps();
        for stage in PipelineStage::ORDER {
            assert!(steps.iter().any(|s| s == stage.label()), "missing {}", stage);
        }

        // one report per finished section during the fan-out
        let chapter_reports = reports
            .iter()
            .filter(|(_, step)| step == PipelineStage::WritingChapters.label())
            .count();
        assert_eq!(chapter_reports, 1 + 6);
    }

    #[tokio::test]
    async fn test_introduction_retries_until_threshold() {
        let agent = Arc::new(MockPaperAgent::new());
        agent.script_scores("introduction", &[0.5, 0.5, 0.85]);
        let sink = RecordingSink::new();

        let result = executor(agent, Arc::new(RecordingRenderer::new()))
            .run("job-1", &request(), &sink)
            .await
            .unwrap();

        let evaluation = result.introduction.evaluation.unwrap();
        assert_eq!(evaluation.attempts, 3);
        assert!(evaluation.passed);
        assert!(sink
            .steps()
            .iter()
            .any(|s| s == "Writing introduction (attempt 3/3)"));
    }

    #[tokio::test]
    async fn test_section_below_threshold_is_reported() {
        let agent = Arc::new(MockPaperAgent::new());
        agent.script_scores("improvement/1", &[0.3, 0.4]);
        let sink = RecordingSink::new();

        let result = executor(agent, Arc::new(RecordingRenderer::new()))
            .run("job-1", &request(), &sink)
            .await
            .unwrap();

        let section = &result.chapters[2].sections[1];
        let evaluation = section.evaluation.as_ref().unwrap();
        assert!(!evaluation.passed);
        assert_eq!(evaluation.attempts, 2);
        assert_eq!(
            result.quality_report.units_below_threshold,
            vec!["improvement/1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_chapter_failure_fails_the_run() {
        let agent = Arc::new(MockPaperAgent::new());
        agent.fail_unit("analysis/0");
        let renderer = Arc::new(RecordingRenderer::new());
        let sink = RecordingSink::new();

        let err = executor(agent, renderer.clone())
            .run("job-1", &request(), &sink)
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::WritingChapters);
        assert_eq!(
            err.to_string(),
            "Writing chapters failed: Agent failed: writer crashed on analysis/0"
        );
        assert!(renderer.rendered().is_empty());
        assert!(!sink
            .steps()
            .iter()
            .any(|s| s == PipelineStage::WritingConclusion.label()));
    }

    #[tokio::test]
    async fn test_review_failure_uses_fallback_report() {
        let agent = Arc::new(MockPaperAgent::new());
        agent.fail_stage(AgentStage::Review);
        let sink = RecordingSink::new();

        let result = executor(agent, Arc::new(RecordingRenderer::new()))
            .run("job-1", &request(), &sink)
            .await
            .unwrap();

        assert!(result.quality_report.passed);
        assert!((result.quality_report.overall_score - 0.9).abs() < 1e-9);
        assert!(result.quality_report.issues[0].starts_with("quality review unavailable"));
    }

    #[tokio::test]
    async fn test_render_failure_is_fatal() {
        let agent = Arc::new(MockPaperAgent::new());
        let sink = RecordingSink::new();

        let err = executor(agent, Arc::new(RecordingRenderer::failing()))
            .run("job-1", &request(), &sink)
            .await
            .unwrap_err();

        assert_eq!(err.stage, PipelineStage::RenderingDocument);
    }

    #[test]
    fn test_normalize_plan_orders_chapters() {
        let plan = PaperPlan {
            chapters: vec![
                ChapterPlan {
                    kind: ChapterKind::Improvement,
                    title: "C".to_string(),
                    sections: vec!["3.1".to_string()],
                },
                ChapterPlan {
                    kind: ChapterKind::Theory,
                    title: "A".to_string(),
                    sections: vec!["1.1".to_string()],
                },
                ChapterPlan {
                    kind: ChapterKind::Analysis,
                    title: "B".to_string(),
                    sections: vec!["2.1".to_string()],
                },
            ],
        };

        let normalized = normalize_plan(plan).unwrap();
        let titles: Vec<&str> = normalized.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_normalize_plan_rejects_missing_chapter() {
        let plan = PaperPlan {
            chapters: vec![ChapterPlan {
                kind: ChapterKind::Theory,
                title: "A".to_string(),
                sections: vec!["1.1".to_string()],
            }],
        };

        assert!(matches!(
            normalize_plan(plan),
            Err(AgentError::InvalidResponse(_))
        ));
    }
}
