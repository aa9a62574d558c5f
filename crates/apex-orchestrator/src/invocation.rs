//! Builds worker/utility command lines from a briefing (spec §6).

use apex_briefing::Role;
use apex_process::CommandSpec;

const BASE_TOOLS: &[&str] = &["read", "write", "list", "delete", "scan"];

fn role_extra_tools(role: Role) -> &'static [&'static str] {
    match role {
        Role::Coder => &["Edit", "Write", "Bash"],
        Role::Adversary => &["Read", "Grep", "Glob", "Bash"],
        Role::Supervisor => &["Bash", "LS"],
    }
}

/// The worker-invocation parameters this deployment is configured
/// with: everything the briefing itself doesn't carry (spec §6).
#[derive(Debug, Clone)]
pub struct WorkerInvocation {
    pub model: String,
    pub mcp_config_path: String,
}

impl WorkerInvocation {
    pub fn allowed_tools(&self, role: Role) -> Vec<String> {
        BASE_TOOLS
            .iter()
            .chain(role_extra_tools(role))
            .map(|s| s.to_string())
            .collect()
    }

    /// Builds the `claude -p "<prompt carrying only the briefing
    /// key>" ...` command line (spec §6).
    pub fn command_for(&self, briefing_key: &str, role: Role) -> CommandSpec {
        let prompt = format!("Read your task briefing at key: {briefing_key}");
        let allowed_tools = self.allowed_tools(role);
        CommandSpec::claude_worker(&prompt, &self.model, &self.mcp_config_path, &allowed_tools)
    }
}

/// Where a named utility's tool script lives, so the Dispatcher's
/// capability catalog (which only knows names and keywords) can be
/// turned into a runnable command line (spec §6, §4.J).
#[derive(Debug, Clone, Default)]
pub struct UtilityScripts {
    pub scripts: std::collections::HashMap<String, String>,
}

impl UtilityScripts {
    pub fn command_for(
        &self,
        utility_name: &str,
        task_id: &str,
        briefing_key: &str,
        store_path: &str,
    ) -> Option<CommandSpec> {
        let script = self.scripts.get(utility_name)?;
        Some(CommandSpec::utility(script, task_id, briefing_key, store_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coder_gets_edit_write_bash_in_addition_to_base_tools() {
        let invocation = WorkerInvocation {
            model: "claude-opus".into(),
            mcp_config_path: "/tmp/.mcp.json".into(),
        };
        let tools = invocation.allowed_tools(Role::Coder);
        assert!(tools.contains(&"read".to_string()));
        assert!(tools.contains(&"Edit".to_string()));
    }

    #[test]
    fn unknown_utility_name_yields_no_command() {
        let scripts = UtilityScripts::default();
        assert!(scripts.command_for("linter", "t1", "k1", "/tmp/db").is_none());
    }
}
