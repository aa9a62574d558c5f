//! A scripted [`Launcher`] for tests: real, short-lived `sh -c`
//! children whose behaviour is picked by the first argument of the
//! [`CommandSpec`], instead of a real `claude`/`python` binary.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::command::{CommandSpec, Launcher};

#[derive(Debug, Clone)]
pub enum FakeBehavior {
    ExitImmediately(i32),
    SleepThenExit(Duration, i32),
    EmitLinesThenExit(Vec<String>, i32),
}

/// Launcher backed by real `sh -c` children so [`ProcessManager`](crate::manager::ProcessManager)
/// exercises its actual wait/timeout/kill paths against something the
/// OS really schedules, without depending on `claude` or `python`
/// being installed.
#[derive(Debug)]
pub struct FakeLauncher {
    behaviors: Mutex<HashMap<String, FakeBehavior>>,
    default: FakeBehavior,
}

impl FakeLauncher {
    pub fn new() -> Self {
        let mut behaviors = HashMap::new();
        behaviors.insert("exit-ok".to_string(), FakeBehavior::ExitImmediately(0));
        behaviors.insert("exit-fail".to_string(), FakeBehavior::ExitImmediately(1));
        behaviors.insert(
            "sleep-long".to_string(),
            FakeBehavior::SleepThenExit(Duration::from_secs(30), 0),
        );
        Self {
            behaviors: Mutex::new(behaviors),
            default: FakeBehavior::ExitImmediately(0),
        }
    }

    pub fn with_behavior(self, key: impl Into<String>, behavior: FakeBehavior) -> Self {
        self.behaviors.lock().unwrap().insert(key.into(), behavior);
        self
    }

    fn behavior_for(&self, spec: &CommandSpec) -> FakeBehavior {
        let key = spec.args.first().cloned().unwrap_or_default();
        self.behaviors
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

fn shell_script(behavior: &FakeBehavior) -> String {
    match behavior {
        FakeBehavior::ExitImmediately(code) => format!("exit {code}"),
        FakeBehavior::SleepThenExit(duration, code) => {
            format!("sleep {} ; exit {}", duration.as_secs_f64(), code)
        }
        FakeBehavior::EmitLinesThenExit(lines, code) => {
            let mut script = String::new();
            for line in lines {
                script.push_str(&format!("echo '{}'\n", line.replace('\'', "'\\''")));
            }
            script.push_str(&format!("exit {code}"));
            script
        }
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn spawn(&self, spec: &CommandSpec) -> std::io::Result<Child> {
        let script = shell_script(&self.behavior_for(spec));
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}
