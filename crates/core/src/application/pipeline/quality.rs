// Quality loop: write, evaluate, retry with feedback
use crate::application::constants::EVALUATOR_FALLBACK_SCORE;
use crate::application::pipeline::progress::ProgressSink;
use crate::application::pipeline::PipelineError;
use crate::domain::paper::Evaluation;
use crate::port::{AgentError, EvaluationRequest, EvaluationVerdict, PaperAgent, WritingRequest};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Accepted text for one unit
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub content: String,
    pub evaluation: Evaluation,
}

/// Quality gate for generated text
///
/// Every attempt is scored; the first attempt at or above the threshold is
/// accepted. When the attempt cap is reached the best-scoring attempt is
/// accepted anyway and marked as not passed, so quality can never block a
/// job. Evaluator failures count as a pass with `EVALUATOR_FALLBACK_SCORE`.
pub struct QualityGate {
    agent: Arc<dyn PaperAgent>,
    threshold: f64,
}

/// Where retry notifications go
pub struct RetryReport<'a> {
    pub sink: &'a dyn ProgressSink,
    pub progress: u8,
    pub label: &'a str,
}

impl QualityGate {
    pub fn new(agent: Arc<dyn PaperAgent>, threshold: f64) -> Self {
        Self { agent, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Run the write/evaluate loop for one unit
    ///
    /// # Errors
    /// Returns the last writer error when no attempt produced any text.
    pub async fn write_until_accepted(
        &self,
        base: WritingRequest,
        max_attempts: u32,
        retry: RetryReport<'_>,
    ) -> Result<Accepted, PipelineError> {
        let max_attempts = max_attempts.max(1);
        let unit_key = base.unit.key();

        let mut best: Option<(String, EvaluationVerdict)> = None;
        let mut feedback: Option<String> = None;
        let mut last_error: Option<AgentError> = None;

        for attempt in 1..=max_attempts {
            let mut request = base.clone();
            request.attempt = attempt;
            request.feedback = feedback.clone();

            match self.agent.write(&request).await {
                Ok(text) => {
                    let verdict = self.evaluate(&request, &text).await;

                    if verdict.score >= self.threshold {
                        debug!(
                            unit = %unit_key,
                            attempt = attempt,
                            score = verdict.score,
                            "Unit accepted"
                        );
                        return Ok(Accepted {
                            content: text,
                            evaluation: Evaluation {
                                passed: true,
                                score: verdict.score,
                                details: verdict.details,
                                attempts: attempt,
                            },
                        });
                    }

                    info!(
                        unit = %unit_key,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        score = verdict.score,
                        threshold = self.threshold,
                        "Unit below quality threshold"
                    );

                    feedback = Some(verdict.details.clone());
                    if best.as_ref().map_or(true, |(_, b)| verdict.score > b.score) {
                        best = Some((text, verdict));
                    }
                }
                Err(e) => {
                    warn!(
                        unit = %unit_key,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Writer failed"
                    );
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                let step = format!(
                    "{} (attempt {}/{})",
                    retry.label,
                    attempt + 1,
                    max_attempts
                );
                retry.sink.report(retry.progress, &step).await?;
            }
        }

        match best {
            Some((content, verdict)) => {
                warn!(
                    unit = %unit_key,
                    score = verdict.score,
                    attempts = max_attempts,
                    "Accepting best attempt below threshold"
                );
                Ok(Accepted {
                    content,
                    evaluation: Evaluation {
                        passed: false,
                        score: verdict.score,
                        details: verdict.details,
                        attempts: max_attempts,
                    },
                })
            }
            None => Err(PipelineError::Agent(last_error.unwrap_or_else(|| {
                AgentError::Failed(format!("no text produced for {}", unit_key))
            }))),
        }
    }

    async fn evaluate(&self, request: &WritingRequest, text: &str) -> EvaluationVerdict {
        let evaluation = EvaluationRequest {
            unit: request.unit.clone(),
            topic: request.topic.clone(),
            language: request.language.clone(),
            text: text.to_string(),
        };

        match self.agent.evaluate(&evaluation).await {
            Ok(verdict) => EvaluationVerdict {
                score: verdict.score.clamp(0.0, 1.0),
                details: verdict.details,
            },
            Err(e) => {
                warn!(
                    unit = %request.unit.key(),
                    error = %e,
                    "Evaluator failed, accepting with fallback score"
                );
                EvaluationVerdict {
                    score: EVALUATOR_FALLBACK_SCORE,
                    details: format!("evaluator unavailable: {}", e),
                }
            }
        }
    }
}
