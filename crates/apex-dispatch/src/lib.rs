//! Module J — decides worker-vs-utility for each task via a small
//! weighted rules engine, gates on declared utility capability, and
//! records every decision for later analysis (spec §4.J).

use apex_shared::error::{ApexError, ApexResult};
use apex_store::StoreHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side a rule favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Executor {
    Worker,
    Utility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// The features a dispatch decision is made from (spec §4.J:
/// `{keywords, type, complexity}`).
#[derive(Debug, Clone)]
pub struct TaskFeatures {
    pub keywords: Vec<String>,
    pub task_type: String,
    pub complexity: Complexity,
}

const MECHANICAL_KEYWORDS: &[&str] = &["lint", "format", "build", "doc", "docs", "git", "test"];

fn favors_mechanical_keyword(features: &TaskFeatures) -> bool {
    features
        .keywords
        .iter()
        .any(|kw| MECHANICAL_KEYWORDS.contains(&kw.to_lowercase().as_str()))
}

fn favors_high_complexity_worker(features: &TaskFeatures) -> bool {
    features.complexity == Complexity::High
}

fn favors_low_complexity_mechanical_type(features: &TaskFeatures) -> bool {
    features.complexity == Complexity::Low
        && MECHANICAL_KEYWORDS.contains(&features.task_type.to_lowercase().as_str())
}

fn always_true(_features: &TaskFeatures) -> bool {
    true
}

/// One scoring rule: contributes `confidence` to its favored side's
/// running score whenever `predicate` matches (spec §4.J).
#[derive(Clone)]
pub struct Rule {
    pub name: &'static str,
    pub favors: Executor,
    pub confidence: f64,
    pub priority: u32,
    pub predicate: fn(&TaskFeatures) -> bool,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("favors", &self.favors)
            .field("confidence", &self.confidence)
            .field("priority", &self.priority)
            .finish()
    }
}

fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "high_complexity_needs_judgment",
            favors: Executor::Worker,
            confidence: 0.7,
            priority: 20,
            predicate: favors_high_complexity_worker,
        },
        Rule {
            name: "mechanical_keyword",
            favors: Executor::Utility,
            confidence: 0.6,
            priority: 10,
            predicate: favors_mechanical_keyword,
        },
        Rule {
            name: "low_complexity_mechanical_type",
            favors: Executor::Utility,
            confidence: 0.5,
            priority: 5,
            predicate: favors_low_complexity_mechanical_type,
        },
        Rule {
            name: "default_worker_bias",
            favors: Executor::Worker,
            confidence: 0.3,
            priority: 1,
            predicate: always_true,
        },
    ]
}

/// One registered utility's name and the keywords it declares
/// capability for (spec §4.J).
#[derive(Debug, Clone)]
pub struct UtilityCapability {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Utilities available for dispatch, supplied by the caller — the
/// dispatcher never constructs this itself (spec §4.J, "out of scope:
/// utility implementations").
#[derive(Debug, Clone, Default)]
pub struct UtilityCatalog {
    pub utilities: Vec<UtilityCapability>,
}

impl UtilityCatalog {
    pub fn matching(&self, keywords: &[String]) -> Option<&UtilityCapability> {
        self.utilities.iter().find(|u| {
            u.keywords
                .iter()
                .any(|cap| keywords.iter().any(|kw| kw.eq_ignore_ascii_case(cap)))
        })
    }
}

/// A persisted dispatch decision, at
/// `projects/{pid}/decisions/{task_id}/{ts}` (spec §4.J).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchDecision {
    pub task_id: String,
    pub executor: Executor,
    pub confidence: f64,
    pub utility_name: Option<String>,
    pub worker_score: f64,
    pub utility_score: f64,
    pub primary_rule: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Module J — the worker-vs-utility rules engine.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: StoreHandle,
    project_id: String,
    rules: Vec<Rule>,
}

impl Dispatcher {
    pub fn new(store: StoreHandle, project_id: impl Into<String>) -> Self {
        Self {
            store,
            project_id: project_id.into(),
            rules: default_rules(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    fn decision_key(&self, task_id: &str, now: DateTime<Utc>) -> String {
        format!(
            "projects/{}/decisions/{}/{}",
            self.project_id,
            task_id,
            now.timestamp_millis()
        )
    }

    /// Scores `features` against the rule set, applies the capability
    /// gate, and persists the resulting decision.
    pub fn decide(
        &self,
        task_id: &str,
        features: &TaskFeatures,
        catalog: &UtilityCatalog,
        now: DateTime<Utc>,
    ) -> ApexResult<DispatchDecision> {
        let mut worker_score = 0.0;
        let mut utility_score = 0.0;
        let mut triggered: Vec<&Rule> = Vec::new();

        for rule in &self.rules {
            if (rule.predicate)(features) {
                match rule.favors {
                    Executor::Worker => worker_score += rule.confidence,
                    Executor::Utility => utility_score += rule.confidence,
                }
                triggered.push(rule);
            }
        }

        let total = worker_score + utility_score;
        let utility_preferred = utility_score > worker_score;

        let (executor, utility_name) = if utility_preferred {
            match catalog.matching(&features.keywords) {
                Some(utility) => (Executor::Utility, Some(utility.name.clone())),
                None => (Executor::Worker, None),
            }
        } else {
            (Executor::Worker, None)
        };

        let confidence = if total == 0.0 {
            0.0
        } else if executor == Executor::Utility {
            utility_score / total
        } else {
            worker_score / total
        };

        let primary_rule = triggered
            .iter()
            .filter(|r| r.favors == executor)
            .max_by_key(|r| r.priority)
            .map(|r| r.name.to_string());

        let decision = DispatchDecision {
            task_id: task_id.to_string(),
            executor,
            confidence,
            utility_name,
            worker_score,
            utility_score,
            primary_rule,
            decided_at: now,
        };

        let bytes = serde_json::to_vec(&decision).map_err(|e| ApexError::InvalidInput(e.to_string()))?;
        self.store.write(&self.decision_key(task_id, now), &bytes)?;

        Ok(decision)
    }
}
