// Subprocess agent: every stage call is one child process
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use coursework_core::domain::paper::QualityReport;
use coursework_core::domain::pipeline::{Drafted, PaperPlan, PreparedInput, TopicBrief};
use coursework_core::domain::PaperRequest;
use coursework_core::port::{
    AgentError, AgentStage, BibliographyRequest, EvaluationRequest, EvaluationVerdict,
    PaperAgent, ResearchRequest, WritingRequest,
};

/// How to launch the agent program
#[derive(Debug, Clone)]
pub struct AgentCommandConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Only these variables of the daemon's environment reach the child
    pub env_allowlist: Vec<String>,
    pub timeout: Duration,
}

/// Plain text answer (`research`, `write`)
#[derive(Debug, Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BibliographyResponse {
    entries: Vec<String>,
}

/// Runs `command args.. <stage>` with the request as JSON on stdin and
/// expects a single JSON document on stdout.
pub struct SubprocessAgent {
    config: AgentCommandConfig,
}

impl SubprocessAgent {
    pub fn new(config: AgentCommandConfig) -> Self {
        Self { config }
    }

    /// Filter environment variables to the allowlist
    fn filter_env<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter(|(k, _)| self.config.env_allowlist.contains(k))
            .collect()
    }

    async fn call<Req, Resp>(&self, stage: AgentStage, request: &Req) -> Result<Resp, AgentError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let input = serde_json::to_vec(request)
            .map_err(|e| AgentError::InvalidResponse(format!("cannot encode request: {}", e)))?;
        let stdout = self.run(stage, &input).await?;

        serde_json::from_slice(&stdout).map_err(|e| {
            AgentError::InvalidResponse(format!(
                "{}: {} (stdout: {})",
                stage,
                e,
                truncate(&String::from_utf8_lossy(&stdout))
            ))
        })
    }

    /// Spawn the child, feed stdin, wait for output
    async fn run(&self, stage: AgentStage, input: &[u8]) -> Result<Vec<u8>, AgentError> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .arg(stage.as_str())
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::SpawnFailed(format!("{}: {}", self.config.command, e)))?;

        debug!(stage = %stage, pid = ?child.id(), "Agent process started");

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .await
                .map_err(|e| AgentError::Io(e.to_string()))?;
            // Dropping stdin closes the pipe so the child sees EOF
        }

        let timeout_ms = u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX);
        let output = match timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(AgentError::Io(e.to_string())),
            Err(_) => {
                // kill_on_drop reaps the child
                warn!(stage = %stage, timeout_ms = timeout_ms, "Agent process timed out");
                return Err(AgentError::Timeout(timeout_ms));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Failed(format!(
                "{} exited with {}: {}",
                stage,
                output.status.code().map_or("signal".to_string(), |c| c.to_string()),
                truncate(stderr.trim())
            )));
        }

        Ok(output.stdout)
    }
}

const MAX_ERROR_OUTPUT: usize = 500;

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_ERROR_OUTPUT) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[async_trait]
impl PaperAgent for SubprocessAgent {
    async fn extract_topic(&self, request: &PaperRequest) -> Result<TopicBrief, AgentError> {
        self.call(AgentStage::ExtractTopic, request).await
    }

    async fn plan(&self, prepared: &PreparedInput) -> Result<PaperPlan, AgentError> {
        self.call(AgentStage::Plan, prepared).await
    }

    async fn research(&self, request: &ResearchRequest) -> Result<String, AgentError> {
        let response: TextResponse = self.call(AgentStage::Research, request).await?;
        Ok(response.text)
    }

    async fn write(&self, request: &WritingRequest) -> Result<String, AgentError> {
        let response: TextResponse = self.call(AgentStage::Write, request).await?;
        Ok(response.text)
    }

    async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationVerdict, AgentError> {
        self.call(AgentStage::Evaluate, request).await
    }

    async fn compile_bibliography(
        &self,
        request: &BibliographyRequest,
    ) -> Result<Vec<String>, AgentError> {
        let response: BibliographyResponse = self.call(AgentStage::Bibliography, request).await?;
        Ok(response.entries)
    }

    async fn review(&self, draft: &Drafted) -> Result<QualityReport, AgentError> {
        self.call(AgentStage::Review, draft).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn agent(script: &str, timeout_ms: u64) -> SubprocessAgent {
        SubprocessAgent::new(AgentCommandConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "agent".to_string()],
            env_allowlist: vec!["PATH".to_string()],
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    fn research_request() -> ResearchRequest {
        ResearchRequest {
            topic: "Inflation".to_string(),
            language: "english".to_string(),
            keywords: vec![],
            chapter_title: "Theory".to_string(),
            section_title: "1.1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stage_is_passed_as_last_argument() {
        let agent = agent(r#"cat >/dev/null; printf '{"text":"%s"}' "$1""#, 5_000);

        let text = agent.research(&research_request()).await.unwrap();

        assert_eq!(text, "research");
    }

    #[tokio::test]
    async fn test_request_is_written_to_stdin() {
        let agent = agent(
            r#"if grep -q '"section_title":"1.1"'; then echo '{"text":"seen"}'; else echo '{"text":"missing"}'; fi"#,
            5_000,
        );

        let text = agent.research(&research_request()).await.unwrap();

        assert_eq!(text, "seen");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let agent = agent("cat >/dev/null; echo 'model overloaded' >&2; exit 3", 5_000);

        let err = agent.research(&research_request()).await.unwrap_err();

        match err {
            AgentError::Failed(message) => {
                assert!(message.contains("exited with 3"));
                assert!(message.contains("model overloaded"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_output_is_invalid_response() {
        let agent = agent("cat >/dev/null; echo 'not json'", 5_000);

        let err = agent.research(&research_request()).await.unwrap_err();

        assert!(matches!(err, AgentError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_slow_agent_times_out() {
        let agent = agent("sleep 10", 100);

        let err = agent.research(&research_request()).await.unwrap_err();

        assert!(matches!(err, AgentError::Timeout(100)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let agent = SubprocessAgent::new(AgentCommandConfig {
            command: "/nonexistent/coursework-agent".to_string(),
            args: vec![],
            env_allowlist: vec![],
            timeout: Duration::from_secs(1),
        });

        let err = agent.research(&research_request()).await.unwrap_err();

        assert!(matches!(err, AgentError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn test_structured_response() {
        let agent = agent(
            r#"cat >/dev/null; echo '{"score":0.42,"details":"too short"}'"#,
            5_000,
        );
        let request = EvaluationRequest {
            unit: coursework_core::port::WritingUnit::Introduction,
            topic: "Inflation".to_string(),
            language: "english".to_string(),
            text: "short".to_string(),
        };

        let verdict = agent.evaluate(&request).await.unwrap();

        assert_eq!(verdict.score, 0.42);
        assert_eq!(verdict.details, "too short");
    }

    #[test]
    fn test_env_filtering() {
        let agent = SubprocessAgent::new(AgentCommandConfig {
            command: "true".to_string(),
            args: vec![],
            env_allowlist: vec!["ALLOWED_VAR".to_string()],
            timeout: Duration::from_secs(1),
        });

        let filtered = agent.filter_env(vec![
            ("ALLOWED_VAR".to_string(), "value1".to_string()),
            ("BLOCKED_VAR".to_string(), "value2".to_string()),
        ]);

        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("ALLOWED_VAR"));
        assert!(!filtered.contains_key("BLOCKED_VAR"));
    }

    #[test]
    fn test_truncate_long_output() {
        let long = "x".repeat(MAX_ERROR_OUTPUT + 10);
        assert_eq!(truncate(&long).len(), MAX_ERROR_OUTPUT + 3);
        assert_eq!(truncate("short"), "short");
    }
}
