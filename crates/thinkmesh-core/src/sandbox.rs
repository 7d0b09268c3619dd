//! Sandboxed code execution
//!
//! Generated programs run as a separate, resource-capped, time-boxed
//! process so a runaway script cannot stall the orchestrator. The script is
//! written to a temporary file that is removed on every exit path.

use crate::analysis::TaskAnalysis;
use crate::config::SandboxConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thinkmesh_vision::{CapabilityError, CapabilityResult};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Outcome of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRun {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_secs: f64,
    pub dry_run: bool,
}

impl CodeRun {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs source code in isolation.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Run `source`; a run exceeding `timeout` is `CapabilityError::Timeout`.
    async fn run(&self, source: &str, timeout: Duration, memory_limit_mb: u64) -> CapabilityResult<CodeRun>;
}

/// Produces a program for a task.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, analysis: &TaskAnalysis) -> CapabilityResult<String>;
}

/// Renders a small Python script that reports the task's steps as JSON.
#[derive(Debug, Default, Clone)]
pub struct TemplateCodeGenerator;

impl TemplateCodeGenerator {
    fn steps(task: &str) -> Vec<String> {
        task.split([',', ';'])
            .flat_map(|part| part.split(" then "))
            .map(|s| s.trim().trim_start_matches("and ").trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl CodeGenerator for TemplateCodeGenerator {
    async fn generate(&self, analysis: &TaskAnalysis) -> CapabilityResult<String> {
        let task = serde_json::to_string(&analysis.task)
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;
        let steps = serde_json::to_string(&Self::steps(&analysis.task))
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;

        Ok(format!(
            r#"import json
import sys

TASK = {task}
STEPS = {steps}


def main():
    result = {{"task": TASK, "category": "{category}", "steps": STEPS, "status": "completed"}}
    print(json.dumps(result))
    return 0


if __name__ == "__main__":
    sys.exit(main())
"#,
            task = task,
            steps = steps,
            category = analysis.task_category,
        ))
    }
}

/// Temporary script file, removed on drop.
struct TempScript {
    path: PathBuf,
}

impl TempScript {
    async fn create(dir: &Path, source: &str) -> std::io::Result<Self> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = dir.join(format!("thinkmesh-{}.script", &id[..12]));
        tokio::fs::write(&path, source).await?;
        Ok(Self { path })
    }
}

impl Drop for TempScript {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Could not remove temp script {:?}: {}", self.path, e);
        }
    }
}

/// Subprocess executor using the configured interpreter.
pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn command(&self, script: &Path, memory_limit_mb: u64) -> Command {
        if cfg!(unix) && memory_limit_mb > 0 {
            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(format!("ulimit -v {}; exec \"$0\" \"$1\"", memory_limit_mb * 1024))
                .arg(&self.config.interpreter)
                .arg(script);
            cmd
        } else {
            let mut cmd = Command::new(&self.config.interpreter);
            cmd.arg(script);
            cmd
        }
    }
}

#[async_trait]
impl CodeExecutor for ProcessSandbox {
    async fn run(&self, source: &str, timeout: Duration, memory_limit_mb: u64) -> CapabilityResult<CodeRun> {
        if self.config.dry_run {
            info!("Dry-run: would execute {} bytes with {}", source.len(), self.config.interpreter);
            return Ok(CodeRun {
                exit_code: Some(0),
                stdout: "[dry-run]".to_string(),
                stderr: String::new(),
                elapsed_secs: 0.0,
                dry_run: true,
            });
        }

        let dir = self.config.work_dir.clone().unwrap_or_else(std::env::temp_dir);
        let script = TempScript::create(&dir, source)
            .await
            .map_err(|e| CapabilityError::Failed(format!("Failed to write script: {}", e)))?;

        let mut cmd = self.command(&script.path, memory_limit_mb);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so a timeout also takes down anything the script forked
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let child = cmd.spawn().map_err(|e| {
            CapabilityError::Unavailable(format!("Cannot start {}: {}", self.config.interpreter, e))
        })?;
        let pid = child.id();

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let run = CodeRun {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    elapsed_secs: start.elapsed().as_secs_f64(),
                    dry_run: false,
                };
                debug!(exit_code = ?run.exit_code, elapsed = run.elapsed_secs, "Sandbox run finished");
                Ok(run)
            }
            Ok(Err(e)) => Err(CapabilityError::Failed(format!("Sandbox wait failed: {}", e))),
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid).await;
                }
                warn!(timeout = ?timeout, "Sandbox run timed out, process killed");
                Err(CapabilityError::Timeout(timeout))
            }
        }
    }
}

#[cfg(unix)]
async fn kill_process_group(pgid: u32) {
    match Command::new("kill")
        .args(["-KILL", "--", &format!("-{}", pgid)])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) if status.success() => debug!(pgid, "Process group killed"),
        Ok(_) => debug!(pgid, "Process group already gone"),
        Err(e) => warn!(pgid, "Could not kill process group: {}", e),
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pgid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell_sandbox(dir: &TempDir) -> ProcessSandbox {
        ProcessSandbox::new(SandboxConfig {
            interpreter: "sh".to_string(),
            work_dir: Some(dir.path().to_path_buf()),
            ..SandboxConfig::default()
        })
    }

    fn leftover_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn test_template_steps() {
        assert_eq!(
            TemplateCodeGenerator::steps("Download the report, then parse it and sum; email totals"),
            vec!["Download the report", "parse it and sum", "email totals"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_spawns_nothing() {
        let sandbox = ProcessSandbox::new(SandboxConfig {
            dry_run: true,
            interpreter: "definitely-not-installed".to_string(),
            ..SandboxConfig::default()
        });
        let run = sandbox.run("print(1)", Duration::from_secs(1), 100).await.unwrap();
        assert!(run.succeeded());
        assert!(run.dry_run);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_cleans_up() {
        let dir = TempDir::new().unwrap();
        let sandbox = shell_sandbox(&dir);
        let run = sandbox.run("echo hello", Duration::from_secs(10), 100).await.unwrap();

        assert!(run.succeeded());
        assert_eq!(run.stdout.trim(), "hello");
        assert_eq!(leftover_files(&dir), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let dir = TempDir::new().unwrap();
        let run = shell_sandbox(&dir)
            .run("echo oops >&2; exit 3", Duration::from_secs(10), 0)
            .await
            .unwrap();

        assert!(!run.succeeded());
        assert_eq!(run.exit_code, Some(3));
        assert_eq!(run.stderr.trim(), "oops");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let err = shell_sandbox(&dir)
            .run("sleep 5", Duration::from_millis(200), 100)
            .await
            .unwrap_err();

        assert_eq!(err, CapabilityError::Timeout(Duration::from_millis(200)));
        assert_eq!(leftover_files(&dir), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_forked_children() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("survivor");
        let script = format!("(sleep 1; touch '{}') & sleep 5", marker.display());

        let err = shell_sandbox(&dir)
            .run(&script, Duration::from_millis(200), 0)
            .await
            .unwrap_err();
        assert_eq!(err, CapabilityError::Timeout(Duration::from_millis(200)));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    #[ignore = "needs python3 on PATH"]
    async fn test_template_script_runs_under_python() {
        use crate::types::ExecutionMethod;
        use std::collections::HashMap;

        let analysis = TaskAnalysis {
            task: "Download \"Q3\" report, then parse it".into(),
            optimal_method: ExecutionMethod::PureCode,
            code_complexity: 0.4,
            gui_complexity: 0.0,
            confidence_score: 0.8,
            complexity_level: crate::types::ComplexityLevel::Medium,
            task_category: "general".into(),
            complexity_factors: HashMap::new(),
            historical_success_rate: 0.6,
            platform_compatibility: 0.7,
            estimated_execution_time_secs: 2.0,
            risk_factors: vec![],
            fallback_methods: vec![],
            data_processing_required: true,
            visual_interaction_required: false,
            reasoning: None,
            reranked_from: None,
            completion_probability: 0.5,
            completion_factors: HashMap::new(),
        };
        let source = TemplateCodeGenerator.generate(&analysis).await.unwrap();
        let run = ProcessSandbox::new(SandboxConfig::default())
            .run(&source, Duration::from_secs(30), 0)
            .await
            .unwrap();

        assert!(run.succeeded(), "stderr: {}", run.stderr);
        let json: serde_json::Value = serde_json::from_str(run.stdout.trim()).unwrap();
        assert_eq!(json["steps"].as_array().unwrap().len(), 2);
    }
}
