//! Agent and task descriptors.
//!
//! A descriptor is the validated, immutable form of one entry in the agent or
//! task configuration. Construction is the only place configuration errors can
//! occur; once a descriptor exists, it is known to be usable.

use std::collections::HashMap;

use crate::{
    AgentRole, CefrLevel, ExtractionError, ModelName, PromptTemplate, SchemaRules, SourceText,
    TaskName, TemplateError, DEFAULT_MAX_INPUT_WORDS,
};

/// Template variable holding the caller's source text.
pub const TEXT_VARIABLE: &str = "text";

/// Template variable holding the requested CEFR level.
pub const LEVEL_VARIABLE: &str = "language_level";

const KNOWN_VARIABLES: [&str; 2] = [TEXT_VARIABLE, LEVEL_VARIABLE];

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// The persona an LLM adopts for the extraction task.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDescriptor {
    role: AgentRole,
    goal: String,
    backstory: String,
    model: ModelName,
    temperature: Option<f32>,
}

impl AgentDescriptor {
    /// Creates a descriptor; every text field must be non-blank.
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ExtractionError> {
        let role = AgentRole::new(role)
            .ok_or_else(|| ExtractionError::configuration("agent role must not be empty"))?;
        let goal = non_blank(goal.into(), "agent goal")?;
        let backstory = non_blank(backstory.into(), "agent backstory")?;
        let model = ModelName::new(model)
            .ok_or_else(|| ExtractionError::configuration("agent model must not be empty"))?;
        Ok(Self {
            role,
            goal,
            backstory,
            model,
            temperature: None,
        })
    }

    /// Sets the sampling temperature; must be finite and within `[0.0, 2.0]`.
    pub fn with_temperature(mut self, temperature: f32) -> Result<Self, ExtractionError> {
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            return Err(ExtractionError::configuration(format!(
                "agent temperature {temperature} is outside [0.0, 2.0]"
            )));
        }
        self.temperature = Some(temperature);
        Ok(self)
    }

    /// Replaces the model (e.g. from a command-line override).
    pub fn with_model(mut self, model: ModelName) -> Self {
        self.model = model;
        self
    }

    pub fn role(&self) -> &AgentRole {
        &self.role
    }

    pub fn model(&self) -> &ModelName {
        &self.model
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    /// The system prompt that establishes the persona.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are {}. {}\nYour personal goal is: {}",
            self.role,
            self.backstory.trim(),
            self.goal.trim()
        )
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// The unit of work bound to the agent: a prompt template plus the rules its
/// output is validated against.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    name: TaskName,
    description: PromptTemplate,
    expected_output: PromptTemplate,
    default_level: Option<CefrLevel>,
    rules: SchemaRules,
    max_input_words: usize,
}

impl TaskDescriptor {
    /// Creates a descriptor from its two templates.
    ///
    /// Both templates must parse, may only reference `{text}` and
    /// `{language_level}`, and the description must reference `{text}`.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Result<Self, ExtractionError> {
        let name = TaskName::new(name)
            .ok_or_else(|| ExtractionError::configuration("task name must not be empty"))?;
        let description = parse_template(&name, "description", description.into())?;
        let expected_output = parse_template(&name, "expected_output", expected_output.into())?;

        if !description.references(TEXT_VARIABLE) {
            return Err(ExtractionError::configuration(format!(
                "task '{name}': description must contain the {{{TEXT_VARIABLE}}} placeholder"
            )));
        }

        Ok(Self {
            name,
            description,
            expected_output,
            default_level: None,
            rules: SchemaRules::default(),
            max_input_words: DEFAULT_MAX_INPUT_WORDS,
        })
    }

    /// Level substituted for `{language_level}` when the caller gives none.
    pub fn with_default_level(mut self, level: CefrLevel) -> Self {
        self.default_level = Some(level);
        self
    }

    /// Restricts the `language_level` the model may report.
    pub fn with_allowed_levels<I, S>(mut self, levels: I) -> Result<Self, ExtractionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let levels: Vec<String> = levels
            .into_iter()
            .map(Into::into)
            .filter(|l| !l.trim().is_empty())
            .collect();
        if levels.is_empty() {
            return Err(ExtractionError::configuration(format!(
                "task '{}': allowed_levels must list at least one level",
                self.name
            )));
        }
        self.rules.allowed_levels = Some(levels);
        Ok(self)
    }

    /// Requires `total_words` to equal the number of extracted words.
    pub fn with_word_count_enforced(mut self, enforce: bool) -> Self {
        self.rules.enforce_word_count = enforce;
        self
    }

    /// Sets the maximum number of input words; must be at least 1.
    pub fn with_max_input_words(mut self, max: usize) -> Result<Self, ExtractionError> {
        if max == 0 {
            return Err(ExtractionError::configuration(format!(
                "task '{}': max_input_words must be at least 1",
                self.name
            )));
        }
        self.max_input_words = max;
        Ok(self)
    }

    pub fn name(&self) -> &TaskName {
        &self.name
    }

    pub fn default_level(&self) -> Option<CefrLevel> {
        self.default_level
    }

    pub fn rules(&self) -> &SchemaRules {
        &self.rules
    }

    pub fn max_input_words(&self) -> usize {
        self.max_input_words
    }

    /// Validates raw input against this task's word limit.
    pub fn accept_input(&self, text: impl Into<String>) -> Result<SourceText, ExtractionError> {
        Ok(SourceText::new(text, self.max_input_words)?)
    }

    /// Renders the user prompt for `text`.
    ///
    /// `{language_level}` resolves to `level`, falling back to the task's
    /// default level; if neither is set and the template needs it, rendering
    /// fails with [`TemplateError::UndefinedVariable`].
    pub fn render_prompt(
        &self,
        text: &SourceText,
        level: Option<CefrLevel>,
    ) -> Result<String, TemplateError> {
        let mut variables = HashMap::from([(TEXT_VARIABLE, text.as_str())]);
        if let Some(level) = level.or(self.default_level) {
            variables.insert(LEVEL_VARIABLE, level.as_str());
        }

        let description = self.description.render(&variables)?;
        let expected = self.expected_output.render(&variables)?;
        Ok(format!(
            "{}\n\nThis is the expected criteria for your final answer: {}\n\n\
             Respond with a single JSON object with the fields \"words\", \"total_words\", \
             \"language_level\" and \"analysis\", and nothing else.",
            description.trim_end(),
            expected.trim()
        ))
    }
}

fn non_blank(value: String, what: &str) -> Result<String, ExtractionError> {
    if value.trim().is_empty() {
        Err(ExtractionError::configuration(format!("{what} must not be empty")))
    } else {
        Ok(value)
    }
}

fn parse_template(
    task: &TaskName,
    field: &str,
    source: String,
) -> Result<PromptTemplate, ExtractionError> {
    if source.trim().is_empty() {
        return Err(ExtractionError::configuration(format!(
            "task '{task}': {field} must not be empty"
        )));
    }
    let template = PromptTemplate::parse(source).map_err(|e| {
        ExtractionError::configuration(format!("task '{task}': invalid {field} template: {e}"))
    })?;
    if let Some(unknown) = template.variables().find(|v| !KNOWN_VARIABLES.contains(v)) {
        return Err(ExtractionError::configuration(format!(
            "task '{task}': {field} references unknown placeholder {{{unknown}}}"
        )));
    }
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentDescriptor {
        AgentDescriptor::new(
            "Polish vocabulary extractor",
            "Pick out words worth learning",
            "You teach Polish to adults.",
            "gpt-4o-mini",
        )
        .unwrap()
    }

    fn task() -> TaskDescriptor {
        TaskDescriptor::new(
            "word_extraction_task",
            "Extract {language_level} words from: {text}",
            "A JSON object",
        )
        .unwrap()
    }

    fn text(s: &str) -> SourceText {
        SourceText::new(s, 100).unwrap()
    }

    #[test]
    fn test_agent_rejects_blank_fields() {
        assert!(AgentDescriptor::new("", "g", "b", "m").is_err());
        assert!(AgentDescriptor::new("r", " ", "b", "m").is_err());
        assert!(AgentDescriptor::new("r", "g", "", "m").is_err());
        let err = AgentDescriptor::new("r", "g", "b", "").unwrap_err();
        assert!(matches!(err, ExtractionError::Configuration { .. }));
    }

    #[test]
    fn test_agent_temperature_range() {
        assert_eq!(agent().with_temperature(0.2).unwrap().temperature(), Some(0.2));
        assert!(agent().with_temperature(2.5).is_err());
        assert!(agent().with_temperature(f32::NAN).is_err());
    }

    #[test]
    fn test_system_prompt_contains_persona() {
        let prompt = agent().system_prompt();
        assert!(prompt.starts_with("You are Polish vocabulary extractor."));
        assert!(prompt.contains("You teach Polish to adults."));
        assert!(prompt.ends_with("Your personal goal is: Pick out words worth learning"));
    }

    #[test]
    fn test_task_requires_text_placeholder() {
        let err = TaskDescriptor::new("t", "Extract words", "JSON").unwrap_err();
        assert!(err.to_string().contains("{text}"), "{err}");
    }

    #[test]
    fn test_task_rejects_unknown_placeholder_and_bad_syntax() {
        let err = TaskDescriptor::new("t", "{text} {topic}", "JSON").unwrap_err();
        assert!(err.to_string().contains("{topic}"), "{err}");

        let err = TaskDescriptor::new("t", "{text", "JSON").unwrap_err();
        assert!(err.to_string().contains("invalid description template"), "{err}");

        assert!(TaskDescriptor::new("t", "{text}", "").is_err());
    }

    #[test]
    fn test_render_uses_explicit_then_default_level() {
        let t = task().with_default_level(CefrLevel::A2);
        let prompt = t.render_prompt(&text("Ala ma kota"), Some(CefrLevel::C1)).unwrap();
        assert!(prompt.starts_with("Extract C1 words from: Ala ma kota"));

        let prompt = t.render_prompt(&text("Ala ma kota"), None).unwrap();
        assert!(prompt.starts_with("Extract A2 words from: Ala ma kota"));
        assert!(prompt.contains("expected criteria for your final answer: A JSON object"));
    }

    #[test]
    fn test_render_without_any_level_fails() {
        let err = task().render_prompt(&text("Ala ma kota"), None).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UndefinedVariable { ref name, .. } if name == LEVEL_VARIABLE
        ));
    }

    #[test]
    fn test_render_keeps_placeholder_tokens_in_input_literal() {
        let prompt = task()
            .render_prompt(&text("show {text} and {language_level} literally"), Some(CefrLevel::B1))
            .unwrap();
        assert!(prompt.starts_with("Extract B1 words from: show {text} and {language_level} literally"));
    }

    #[test]
    fn test_task_limits() {
        assert!(task().with_max_input_words(0).is_err());
        let t = task().with_max_input_words(2).unwrap();
        assert!(t.accept_input("jeden dwa").is_ok());
        assert!(matches!(
            t.accept_input("jeden dwa trzy"),
            Err(ExtractionError::InvalidInput(_))
        ));

        assert!(task().with_allowed_levels(Vec::<String>::new()).is_err());
        let t = task().with_allowed_levels(["A1", "A2"]).unwrap().with_word_count_enforced(true);
        assert_eq!(t.rules().allowed_levels.as_deref(), Some(&["A1".to_string(), "A2".to_string()][..]));
        assert!(t.rules().enforce_word_count);
    }
}
