use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};

/// The command line for one subprocess, built by the caller from a
/// task briefing (spec §6: worker and utility invocation shapes).
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// The worker invocation command line of spec §6:
    /// `claude -p "<prompt>" --output-format stream-json --model <id>
    /// --mcp-config <path> --allowedTools <list> --max-turns 50 --verbose`
    pub fn claude_worker(
        prompt: &str,
        model: &str,
        mcp_config_path: &str,
        allowed_tools: &[String],
    ) -> Self {
        Self::new("claude")
            .arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--model")
            .arg(model)
            .arg("--mcp-config")
            .arg(mcp_config_path)
            .arg("--allowedTools")
            .arg(allowed_tools.join(","))
            .arg("--max-turns")
            .arg("50")
            .arg("--verbose")
    }

    /// The utility invocation command line of spec §6:
    /// `python <tool-script> --task-id <tid> --briefing-key <k> --lmdb-path <p>`
    pub fn utility(tool_script: &str, task_id: &str, briefing_key: &str, store_path: &str) -> Self {
        Self::new("python")
            .arg(tool_script)
            .arg("--task-id")
            .arg(task_id)
            .arg("--briefing-key")
            .arg(briefing_key)
            .arg("--lmdb-path")
            .arg(store_path)
    }
}

/// Abstraction over how a subprocess actually gets spawned, so tests
/// can substitute a scripted fake process instead of a real `claude`
/// or `python` binary — the same seam this corpus uses to swap a real
/// LSP server launcher for an in-process fake during tests.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn spawn(&self, spec: &CommandSpec) -> std::io::Result<Child>;
}

/// Production launcher: spawns a real OS process via `tokio::process`.
#[derive(Debug, Default)]
pub struct RealLauncher;

#[async_trait]
impl Launcher for RealLauncher {
    async fn spawn(&self, spec: &CommandSpec) -> std::io::Result<Child> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}
