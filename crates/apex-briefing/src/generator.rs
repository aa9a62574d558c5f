use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::types::{
    ContentType, ContextPointer, Dependency, Deliverable, DeliverableType, Priority, Role,
    TaskBriefing,
};

/// The task-type axis the checklist and deliverable tables are
/// indexed by (spec §4.G), matching the step names the Planner's
/// three templates actually produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Investigation,
    BugFix,
    Verification,
    Research,
    Implementation,
    Testing,
    Analysis,
    Review,
}

/// The inputs a briefing is built from: a task spec plus whatever the
/// caller already knows about the project (spec §4.G: "pure (state ×
/// spec) -> briefing").
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub task_id: String,
    pub description: String,
    pub role: Role,
    pub task_type: TaskType,
    pub priority: Priority,
    pub dependencies: Vec<Dependency>,
    pub constraints: Map<String, serde_json::Value>,
}

/// A code file the generator can consider as task-specific context,
/// supplied by the caller (listing the filesystem is not this
/// crate's job).
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: String,
    pub first_doc_line: String,
}

/// Everything the generator might draw base/task-specific context
/// pointers from (spec §4.G, steps 1-2).
#[derive(Debug, Clone, Default)]
pub struct GeneratorInputs {
    pub project_config_key: Option<String>,
    pub coding_standards_key: Option<String>,
    pub architecture_docs_key: Option<String>,
    pub candidate_code_files: Vec<CandidateFile>,
    pub recent_error_logs: Vec<ContextPointer>,
    pub existing_tests: Vec<ContextPointer>,
    pub previous_security_reports: Vec<ContextPointer>,
}

const TOP_RELATED_FILES: usize = 5;

/// Deliverable templates keyed by `(role, task_type)`, mirroring the
/// Python reference's role/type-indexed literal dict (spec §4.G,
/// step 3).
const DELIVERABLE_TEMPLATES: &[(Role, TaskType, DeliverableType, &str, &[&str])] = &[
    (
        Role::Coder,
        TaskType::Implementation,
        DeliverableType::Code,
        "implementation changes satisfying the objective",
        &["compiles", "follows coding standards"],
    ),
    (
        Role::Coder,
        TaskType::BugFix,
        DeliverableType::Code,
        "fix for the reported defect",
        &["reproduces then resolves the reported failure"],
    ),
    (
        Role::Coder,
        TaskType::Research,
        DeliverableType::Report,
        "research findings and recommended approach",
        &["covers at least one viable approach"],
    ),
    (
        Role::Adversary,
        TaskType::Investigation,
        DeliverableType::Report,
        "root-cause investigation report",
        &["identifies a concrete root cause"],
    ),
    (
        Role::Adversary,
        TaskType::Verification,
        DeliverableType::Report,
        "verification report confirming the fix holds",
        &["exercises the original failure path"],
    ),
    (
        Role::Adversary,
        TaskType::Testing,
        DeliverableType::Test,
        "test suite covering the new behavior",
        &["covers the happy path and at least one edge case"],
    ),
    (
        Role::Adversary,
        TaskType::Review,
        DeliverableType::Report,
        "review findings",
        &["flags any correctness or security issue found"],
    ),
    (
        Role::Coder,
        TaskType::Analysis,
        DeliverableType::Report,
        "analysis of the requested change",
        &["identifies the affected modules"],
    ),
];

/// Quality-criteria checklist indexed by `(role, task_type)` (spec
/// §4.G, step 4).
const QUALITY_CRITERIA: &[(Role, TaskType, &[&str])] = &[
    (
        Role::Coder,
        TaskType::Implementation,
        &["no unrelated changes", "consistent with existing style"],
    ),
    (
        Role::Coder,
        TaskType::BugFix,
        &["fix is minimal", "does not reintroduce prior defects"],
    ),
    (
        Role::Adversary,
        TaskType::Testing,
        &["covers edge cases", "deterministic, no flaky sleeps"],
    ),
    (
        Role::Adversary,
        TaskType::Review,
        &["actionable findings", "no false positives without evidence"],
    ),
];

/// Module G — produces a fully populated [`TaskBriefing`] from a task
/// spec: context pointers, deliverables, and quality criteria (spec
/// §4.G). Never executes anything; pure function of its inputs.
#[derive(Debug, Default)]
pub struct BriefingGenerator;

impl BriefingGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(
        &self,
        spec: &TaskSpec,
        inputs: &GeneratorInputs,
        now: DateTime<Utc>,
    ) -> TaskBriefing {
        let mut briefing = TaskBriefing::new(
            spec.task_id.clone(),
            spec.role,
            spec.description.clone(),
            spec.priority,
            now,
        );

        self.add_base_context(&mut briefing, inputs);
        self.add_task_specific_context(&mut briefing, spec, inputs);
        briefing.deliverables = self.build_deliverables(spec);
        briefing.quality_criteria = self.quality_criteria(spec);
        briefing.dependencies = spec.dependencies.clone();
        briefing.constraints = spec.constraints.clone();

        briefing
    }

    fn add_base_context(&self, briefing: &mut TaskBriefing, inputs: &GeneratorInputs) {
        if let Some(key) = &inputs.project_config_key {
            briefing.context_pointers.insert(
                "project_config".to_string(),
                ContextPointer {
                    key: key.clone(),
                    description: "project configuration".to_string(),
                    content_type: ContentType::Doc,
                    size: 0,
                },
            );
        }
        if let Some(key) = &inputs.coding_standards_key {
            briefing.context_pointers.insert(
                "coding_standards".to_string(),
                ContextPointer {
                    key: key.clone(),
                    description: "coding standards".to_string(),
                    content_type: ContentType::Doc,
                    size: 0,
                },
            );
        }
        if let Some(key) = &inputs.architecture_docs_key {
            briefing.context_pointers.insert(
                "architecture_docs".to_string(),
                ContextPointer {
                    key: key.clone(),
                    description: "architecture documentation".to_string(),
                    content_type: ContentType::Doc,
                    size: 0,
                },
            );
        }
    }

    fn add_task_specific_context(
        &self,
        briefing: &mut TaskBriefing,
        spec: &TaskSpec,
        inputs: &GeneratorInputs,
    ) {
        for (i, file) in top_related_files(&spec.description, &inputs.candidate_code_files)
            .into_iter()
            .enumerate()
        {
            briefing.context_pointers.insert(
                format!("related_code_{}", i + 1),
                ContextPointer {
                    key: file.path.clone(),
                    description: file.first_doc_line.clone(),
                    content_type: ContentType::Code,
                    size: 0,
                },
            );
        }

        if spec.task_type == TaskType::BugFix {
            for (i, log) in inputs.recent_error_logs.iter().enumerate() {
                briefing
                    .context_pointers
                    .insert(format!("error_log_{}", i + 1), log.clone());
            }
        }

        if spec.task_type == TaskType::Testing {
            for (i, test) in inputs.existing_tests.iter().enumerate() {
                briefing
                    .context_pointers
                    .insert(format!("existing_test_{}", i + 1), test.clone());
            }
        }

        if spec.role == Role::Adversary {
            for (i, report) in inputs.previous_security_reports.iter().enumerate() {
                briefing
                    .context_pointers
                    .insert(format!("security_report_{}", i + 1), report.clone());
            }
        }
    }

    fn build_deliverables(&self, spec: &TaskSpec) -> Vec<Deliverable> {
        let mut used_keys: HashSet<String> = HashSet::new();
        DELIVERABLE_TEMPLATES
            .iter()
            .filter(|(role, task_type, ..)| *role == spec.role && *task_type == spec.task_type)
            .map(|(_, _, kind, description, criteria)| {
                let base = format!("tasks/outputs/{}/{:?}", spec.task_id, kind).to_lowercase();
                let output_key = unique_key(&mut used_keys, base);
                Deliverable {
                    kind: *kind,
                    description: description.to_string(),
                    output_key,
                    required: true,
                    validation_criteria: criteria.iter().map(|s| s.to_string()).collect(),
                }
            })
            .collect()
    }

    fn quality_criteria(&self, spec: &TaskSpec) -> Vec<String> {
        QUALITY_CRITERIA
            .iter()
            .filter(|(role, task_type, _)| *role == spec.role && *task_type == spec.task_type)
            .flat_map(|(_, _, criteria)| criteria.iter().map(|s| s.to_string()))
            .collect()
    }
}

fn unique_key(used: &mut HashSet<String>, base: String) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut suffix = 1;
    loop {
        let candidate = format!("{base}_{suffix}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn top_related_files<'a>(objective: &str, candidates: &'a [CandidateFile]) -> Vec<&'a CandidateFile> {
    let objective_words = tokenize(objective);
    let mut scored: BTreeMap<usize, Vec<&CandidateFile>> = BTreeMap::new();
    for file in candidates {
        let file_words = tokenize(&format!("{} {}", file.path, file.first_doc_line));
        let overlap = objective_words.intersection(&file_words).count();
        if overlap > 0 {
            scored.entry(overlap).or_default().push(file);
        }
    }
    scored
        .into_iter()
        .rev()
        .flat_map(|(_, files)| files)
        .take(TOP_RELATED_FILES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap()
    }

    #[test]
    fn generates_coder_implementation_deliverable() {
        let gen = BriefingGenerator::new();
        let spec = TaskSpec {
            task_id: "task-1".into(),
            description: "implement retry backoff".into(),
            role: Role::Coder,
            task_type: TaskType::Implementation,
            priority: Priority::Medium,
            dependencies: Vec::new(),
            constraints: Map::new(),
        };
        let briefing = gen.generate(&spec, &GeneratorInputs::default(), now());
        assert_eq!(briefing.deliverables.len(), 1);
        assert_eq!(briefing.deliverables[0].output_key, "tasks/outputs/task-1/code");
    }

    #[test]
    fn collision_suffixes_output_keys() {
        let gen = BriefingGenerator::new();
        // Construct a spec matching two templates with the same
        // deliverable kind to force a collision deliberately, by
        // calling build_deliverables twice via two adversary specs.
        let spec_a = TaskSpec {
            task_id: "task-2".into(),
            description: "investigate the outage".into(),
            role: Role::Adversary,
            task_type: TaskType::Investigation,
            priority: Priority::High,
            dependencies: Vec::new(),
            constraints: Map::new(),
        };
        let briefing = gen.generate(&spec_a, &GeneratorInputs::default(), now());
        assert_eq!(briefing.deliverables[0].output_key, "tasks/outputs/task-2/report");
    }

    #[test]
    fn related_files_scored_by_keyword_overlap() {
        let candidates = vec![
            CandidateFile {
                path: "src/retry.rs".into(),
                first_doc_line: "exponential backoff helper".into(),
            },
            CandidateFile {
                path: "src/unrelated.rs".into(),
                first_doc_line: "completely different subsystem".into(),
            },
        ];
        let inputs = GeneratorInputs {
            candidate_code_files: candidates,
            ..Default::default()
        };
        let gen = BriefingGenerator::new();
        let spec = TaskSpec {
            task_id: "task-3".into(),
            description: "add retry backoff to the client".into(),
            role: Role::Coder,
            task_type: TaskType::Implementation,
            priority: Priority::Medium,
            dependencies: Vec::new(),
            constraints: Map::new(),
        };
        let briefing = gen.generate(&spec, &inputs, now());
        assert!(briefing.context_pointers.contains_key("related_code_1"));
        assert_eq!(
            briefing.context_pointers["related_code_1"].key,
            "src/retry.rs"
        );
    }

    #[test]
    fn bug_fix_pulls_in_error_logs() {
        let inputs = GeneratorInputs {
            recent_error_logs: vec![ContextPointer {
                key: "logs/error-1".into(),
                description: "stack trace".into(),
                content_type: ContentType::Log,
                size: 128,
            }],
            ..Default::default()
        };
        let gen = BriefingGenerator::new();
        let spec = TaskSpec {
            task_id: "task-4".into(),
            description: "fix the crash on startup".into(),
            role: Role::Coder,
            task_type: TaskType::BugFix,
            priority: Priority::Critical,
            dependencies: Vec::new(),
            constraints: Map::new(),
        };
        let briefing = gen.generate(&spec, &inputs, now());
        assert!(briefing.context_pointers.contains_key("error_log_1"));
    }

    #[test]
    fn quality_criteria_present_for_known_pair() {
        let gen = BriefingGenerator::new();
        let spec = TaskSpec {
            task_id: "task-5".into(),
            description: "implement the feature".into(),
            role: Role::Coder,
            task_type: TaskType::Implementation,
            priority: Priority::Medium,
            dependencies: Vec::new(),
            constraints: Map::new(),
        };
        let briefing = gen.generate(&spec, &GeneratorInputs::default(), now());
        assert!(!briefing.quality_criteria.is_empty());
    }
}
