//! Local command adapter.
//!
//! Spawns a completion CLI (e.g. `fabric -p raw_query` or `llm`), pipes the
//! prompt to stdin and collects stdout as the completion.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::{Adapter, AdapterOutput};
use crate::config::AssistSettings;

/// Completion via a local subprocess
pub struct CommandAdapter {
    program: String,
    args: Vec<String>,
}

impl CommandAdapter {
    /// Create an adapter for `program` with fixed arguments
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Create from assist settings (`command` is program followed by args)
    pub fn from_settings(settings: &AssistSettings) -> Result<Self> {
        let (program, args) = settings
            .command
            .split_first()
            .context("assist.command must name a program")?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }

    async fn run(&self, prompt: &str, limit: Duration) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn completion command '{}'", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to stdin")?;
            // Drop stdin to signal EOF
        }

        let output = timeout(limit, child.wait_with_output())
            .await
            .with_context(|| format!("'{}' timed out after {:?}", self.program, limit))?
            .with_context(|| format!("Failed to wait for '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "'{}' failed with exit code {}: {}",
                self.program,
                exit_code,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout).context("Completion output is not valid UTF-8")
    }
}

#[async_trait]
impl Adapter for CommandAdapter {
    fn name(&self) -> &str {
        "command"
    }

    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<AdapterOutput> {
        let content = self.run(prompt, timeout).await?;
        Ok(AdapterOutput::new(content))
    }

    async fn health_check(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("Failed to run '{}'", self.program))?;

        if !status.success() {
            anyhow::bail!("'{} --help' exited with {}", self.program, status);
        }

        Ok(())
    }
}
