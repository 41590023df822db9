//! Subprocess collaborators
//!
//! Channel listing and the anime catalogues are driven through Python helper
//! scripts that print JSON (or a bare URL) on stdout.

use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::error::ResolveError;

/// Script execution errors
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("exited with {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("invalid output: {0}")]
    Parse(String),
}

/// Runs one helper script through the configured interpreter
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    program: String,
    script: PathBuf,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(program: &str, script: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            script: script.into(),
            timeout,
        }
    }

    pub fn script_name(&self) -> String {
        self.script
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Run the script and return trimmed stdout
    pub async fn run(&self, args: &[String]) -> Result<String, ScriptError> {
        self.run_with_timeout(args, self.timeout).await
    }

    pub async fn run_with_timeout(
        &self,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, ScriptError> {
        debug!(script = %self.script_name(), ?args, "Running helper script");

        let child = Command::new(&self.program)
            .arg(&self.script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| ScriptError::Timeout(timeout))?
            .map_err(|source| ScriptError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScriptError::Exit {
                code: output.status.code(),
                stderr: stderr.chars().take(500).collect(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run the script and parse stdout as JSON
    pub async fn run_json<T: DeserializeOwned>(&self, args: &[String]) -> Result<T, ScriptError> {
        let stdout = self.run(args).await?;
        parse_json_output(&stdout)
    }
}

/// Parse JSON from script output, tolerating log lines before the payload
pub fn parse_json_output<T: DeserializeOwned>(stdout: &str) -> Result<T, ScriptError> {
    if let Ok(value) = serde_json::from_str(stdout) {
        return Ok(value);
    }

    let start = stdout
        .find(|c| c == '[' || c == '{')
        .ok_or_else(|| ScriptError::Parse("no JSON payload".to_string()))?;
    serde_json::from_str(&stdout[start..]).map_err(|e| ScriptError::Parse(e.to_string()))
}

/// Build an owned argument list
pub fn args<const N: usize>(values: [&str; N]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl ScriptError {
    pub fn into_resolve_error(self, upstream: &str) -> ResolveError {
        ResolveError::upstream(upstream, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_output_skips_log_lines() {
        let stdout = "loading session...\n[{\"name\":\"Rai 1\",\"url\":\"https://x\"}]";
        let parsed: Vec<serde_json::Value> = parse_json_output(stdout).unwrap();
        assert_eq!(parsed[0]["name"], "Rai 1");
    }

    #[test]
    fn test_parse_json_output_rejects_plain_text() {
        let parsed: Result<Vec<serde_json::Value>, _> = parse_json_output("nothing here");
        assert!(matches!(parsed, Err(ScriptError::Parse(_))));
    }

    #[test]
    fn test_args_helper() {
        assert_eq!(
            args(["search", "--query", "Bleach"]),
            vec!["search".to_string(), "--query".into(), "Bleach".into()]
        );
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_error() {
        let runner = ScriptRunner::new(
            "/nonexistent/interpreter",
            "helper.py",
            Duration::from_secs(1),
        );
        let result = runner.run(&[]).await;
        assert!(matches!(result, Err(ScriptError::Spawn { .. })));
    }
}
