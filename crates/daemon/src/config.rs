//! Daemon configuration
//!
//! Layered: built-in defaults, then `coursework.toml` (or the file named by
//! `COURSEWORK_CONFIG`), then `COURSEWORK_*` environment variables.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use coursework_core::application::constants::{
    DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_QUALITY_THRESHOLD,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "COURSEWORK";
const CONFIG_PATH_VAR: &str = "COURSEWORK_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "coursework.toml";

const DEFAULT_DB_PATH: &str = "~/.coursework/jobs.db";
const DEFAULT_OUTPUT_DIR: &str = "~/.coursework/papers";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: i64 = 9630;
const DEFAULT_AGENT_COMMAND: &str = "coursework-agent";
const DEFAULT_AGENT_TIMEOUT_SECS: i64 = 900;
const DEFAULT_WEBHOOK_TIMEOUT_SECS: i64 = 10;
const DEFAULT_RETENTION_HOURS: i64 = 24;
const DEFAULT_SWEEP_INTERVAL_SECS: i64 = 3600;
const DEFAULT_RATE_LIMIT_BURST: i64 = 20;
const DEFAULT_RATE_LIMIT_PER_SEC: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub max_concurrent_jobs: usize,
    pub quality_threshold: f64,
    pub retention_hours: u64,
    pub sweep_interval_secs: u64,
    pub agent_command: String,
    #[serde(default)]
    pub agent_args: Vec<String>,
    pub agent_timeout_secs: u64,
    pub agent_env_allowlist: Vec<String>,
    pub output_dir: String,
    pub webhook_timeout_secs: u64,
    pub rate_limit_burst: u32,
    pub rate_limit_per_sec: u32,
    pub log_format: LogFormat,
    /// Daily rolling log files go here instead of stdout
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl DaemonConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_PATH_VAR)
            .map(|path| (PathBuf::from(expand(&path)), true))
            .unwrap_or_else(|_| (PathBuf::from(DEFAULT_CONFIG_FILE), false));
        Self::from_sources(Some(file), environment())
    }

    fn from_sources(file: Option<(PathBuf, bool)>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("rpc_host", DEFAULT_RPC_HOST)?
            .set_default("rpc_port", DEFAULT_RPC_PORT)?
            .set_default("max_concurrent_jobs", DEFAULT_MAX_CONCURRENT_JOBS as i64)?
            .set_default("quality_threshold", DEFAULT_QUALITY_THRESHOLD)?
            .set_default("retention_hours", DEFAULT_RETENTION_HOURS)?
            .set_default("sweep_interval_secs", DEFAULT_SWEEP_INTERVAL_SECS)?
            .set_default("agent_command", DEFAULT_AGENT_COMMAND)?
            .set_default("agent_timeout_secs", DEFAULT_AGENT_TIMEOUT_SECS)?
            .set_default("agent_env_allowlist", vec!["PATH", "HOME", "USER", "LANG"])?
            .set_default("output_dir", DEFAULT_OUTPUT_DIR)?
            .set_default("webhook_timeout_secs", DEFAULT_WEBHOOK_TIMEOUT_SECS)?
            .set_default("rate_limit_burst", DEFAULT_RATE_LIMIT_BURST)?
            .set_default("rate_limit_per_sec", DEFAULT_RATE_LIMIT_PER_SEC)?
            .set_default("log_format", "pretty")?;

        if let Some((path, required)) = file {
            builder = builder.add_source(File::from(path).required(required));
        }

        let config: DaemonConfig = builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            bail!("max_concurrent_jobs must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            bail!(
                "quality_threshold must be within 0..=1, got {}",
                self.quality_threshold
            );
        }
        if self.agent_command.trim().is_empty() {
            bail!("agent_command must not be empty");
        }
        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(expand(&self.db_path))
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(expand(&self.output_dir))
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir.as_deref().map(|dir| PathBuf::from(expand(dir)))
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 60 * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("agent_args")
        .with_list_parse_key("agent_env_allowlist")
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(vars: &[(&str, &str)]) -> Environment {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(vars))
    }

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::from_sources(None, env_of(&[])).unwrap();

        assert_eq!(config.rpc_port, 9630);
        assert_eq!(config.max_concurrent_jobs, 3);
        assert_eq!(config.quality_threshold, 0.80);
        assert_eq!(config.retention(), Duration::from_secs(24 * 3600));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.agent_args.is_empty());
        assert!(!config.db_path().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_file_then_env_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "max_concurrent_jobs = 2\nagent_command = \"/usr/bin/agent\"\nlog_format = \"json\""
        )
        .unwrap();

        let config = DaemonConfig::from_sources(
            Some((file.path().to_path_buf(), true)),
            env_of(&[
                ("COURSEWORK_MAX_CONCURRENT_JOBS", "5"),
                ("COURSEWORK_AGENT_ARGS", "--model,fast"),
            ]),
        )
        .unwrap();

        assert_eq!(config.max_concurrent_jobs, 5);
        assert_eq!(config.agent_command, "/usr/bin/agent");
        assert_eq!(config.agent_args, vec!["--model", "fast"]);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_optional_file_is_ignored() {
        let config = DaemonConfig::from_sources(
            Some((PathBuf::from("/nonexistent/coursework.toml"), false)),
            env_of(&[]),
        );
        assert!(config.is_ok());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let result = DaemonConfig::from_sources(
            None,
            env_of(&[("COURSEWORK_MAX_CONCURRENT_JOBS", "0")]),
        );
        assert!(result.is_err());
    }
}
