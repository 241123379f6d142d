//! Agent and task configuration files.
//!
//! Configuration lives in a directory holding two YAML files, keyed the same
//! way as CrewAI project configs:
//!
//! ```yaml
//! # agents.yaml
//! word_extractor:
//!   role: Polish vocabulary extractor
//!   goal: Pick out the words a learner should study
//!   backstory: You are an experienced teacher of Polish as a foreign language.
//!   model: gpt-4o-mini        # optional
//!   temperature: 0.2          # optional
//!
//! # tasks.yaml
//! word_extraction_task:
//!   description: |
//!     Extract vocabulary for a {language_level} learner from: {text}
//!   expected_output: A JSON object with words, total_words, language_level, analysis
//!   agent: word_extractor     # optional binding
//!   default_level: B1         # optional
//!   allowed_levels: [A1, A2, B1, B2, C1, C2]   # optional
//!   enforce_word_count: false # optional
//!   max_input_words: 100      # optional
//! ```
//!
//! Unknown keys are ignored so files shared with other tooling still load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use pipeline::{AgentDescriptor, CefrLevel, ExtractionError, ModelName, TaskDescriptor};

pub const AGENTS_FILE: &str = "agents.yaml";
pub const TASKS_FILE: &str = "tasks.yaml";

/// Model used when neither the agent entry nor the command line names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("agent '{key}' is not defined (available: {available})")]
    UnknownAgent { key: String, available: String },

    #[error("task '{key}' is not defined (available: {available})")]
    UnknownTask { key: String, available: String },

    #[error("task '{task}' is bound to agent '{bound}', not '{requested}'")]
    AgentMismatch {
        task: String,
        bound: String,
        requested: String,
    },

    #[error(transparent)]
    Invalid(#[from] ExtractionError),
}

/// One entry of `agents.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    #[serde(default, alias = "llm")]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// One entry of `tasks.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEntry {
    pub description: String,
    pub expected_output: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub default_level: Option<String>,
    #[serde(default)]
    pub allowed_levels: Option<Vec<String>>,
    #[serde(default)]
    pub enforce_word_count: bool,
    #[serde(default)]
    pub max_input_words: Option<usize>,
}

/// Both configuration files, parsed but not yet validated.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub agents: BTreeMap<String, AgentEntry>,
    pub tasks: BTreeMap<String, TaskEntry>,
}

impl ExtractionConfig {
    /// Reads `agents.yaml` and `tasks.yaml` from `dir`.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            agents: read_yaml(&dir.join(AGENTS_FILE))?,
            tasks: read_yaml(&dir.join(TASKS_FILE))?,
        })
    }

    /// Parses both files from in-memory YAML.
    pub fn from_yaml(agents: &str, tasks: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            agents: parse_yaml(Path::new(AGENTS_FILE), agents)?,
            tasks: parse_yaml(Path::new(TASKS_FILE), tasks)?,
        })
    }

    /// Builds validated descriptors for `task_key` run by `agent_key`.
    ///
    /// `model_override` replaces the agent's configured model.
    pub fn descriptors(
        &self,
        agent_key: &str,
        task_key: &str,
        model_override: Option<&str>,
    ) -> Result<(AgentDescriptor, TaskDescriptor), ConfigError> {
        let agent_entry = self
            .agents
            .get(agent_key)
            .ok_or_else(|| ConfigError::UnknownAgent {
                key: agent_key.to_string(),
                available: keys(&self.agents),
            })?;
        let task_entry = self
            .tasks
            .get(task_key)
            .ok_or_else(|| ConfigError::UnknownTask {
                key: task_key.to_string(),
                available: keys(&self.tasks),
            })?;

        if let Some(bound) = &task_entry.agent {
            if bound != agent_key {
                return Err(ConfigError::AgentMismatch {
                    task: task_key.to_string(),
                    bound: bound.clone(),
                    requested: agent_key.to_string(),
                });
            }
        }

        Ok((
            agent_descriptor(agent_entry, model_override)?,
            task_descriptor(task_key, task_entry)?,
        ))
    }
}

fn agent_descriptor(
    entry: &AgentEntry,
    model_override: Option<&str>,
) -> Result<AgentDescriptor, ExtractionError> {
    let model = entry.model.as_deref().unwrap_or(DEFAULT_MODEL);
    let mut agent = AgentDescriptor::new(&entry.role, &entry.goal, &entry.backstory, model)?;
    if let Some(temperature) = entry.temperature {
        agent = agent.with_temperature(temperature)?;
    }
    if let Some(model) = model_override {
        let model = ModelName::new(model)
            .ok_or_else(|| ExtractionError::configuration("--model must not be empty"))?;
        agent = agent.with_model(model);
    }
    Ok(agent)
}

fn task_descriptor(key: &str, entry: &TaskEntry) -> Result<TaskDescriptor, ExtractionError> {
    let mut task = TaskDescriptor::new(key, &entry.description, &entry.expected_output)?
        .with_word_count_enforced(entry.enforce_word_count);

    if let Some(level) = &entry.default_level {
        let level: CefrLevel = level
            .parse()
            .map_err(|e| ExtractionError::configuration(format!("task '{key}': {e}")))?;
        task = task.with_default_level(level);
    }
    if let Some(levels) = &entry.allowed_levels {
        task = task.with_allowed_levels(levels.iter().cloned())?;
    }
    if let Some(max) = entry.max_input_words {
        task = task.with_max_input_words(max)?;
    }
    Ok(task)
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_yaml(path, &content)
}

fn parse_yaml<T: for<'de> Deserialize<'de>>(path: &Path, content: &str) -> Result<T, ConfigError> {
    serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn keys<V>(map: &BTreeMap<String, V>) -> String {
    if map.is_empty() {
        "none".to_string()
    } else {
        map.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
