//! Prompt templates with `{name}` placeholders.
//!
//! # Syntax
//!
//! - `{name}`: replaced by the value of variable `name` (surrounding
//!   whitespace inside the braces is ignored).
//! - `{{` / `}}`: literal `{` / `}`.
//! - A lone `}` is kept as-is.
//!
//! Templates are parsed once into segments. Rendering is a single pass over
//! those segments: variable values are copied verbatim and never re-scanned,
//! so a value containing `{text}` renders as that literal string.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing or rendering a [`PromptTemplate`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TemplateError {
    /// A variable was referenced but no value was supplied.
    #[error("undefined variable '{name}' at position {position} in template")]
    UndefinedVariable {
        /// The name of the undefined variable.
        name: String,
        /// Byte offset of the opening brace.
        position: usize,
    },

    /// A `{` was found without a matching `}`.
    #[error("unmatched '{{' at position {position} in template")]
    UnmatchedBrace {
        /// Byte offset of the unmatched brace.
        position: usize,
    },

    /// `{}` with nothing (or only whitespace) between the braces.
    #[error("empty variable name '{{}}' at position {position} in template")]
    EmptyVariableName {
        /// Byte offset of the opening brace.
        position: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable { name: String, position: usize },
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parses `source`, failing on malformed placeholders.
    pub fn parse(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, c)) => name.push(c),
                            None => return Err(TemplateError::UnmatchedBrace { position: pos }),
                        }
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(TemplateError::EmptyVariableName { position: pos });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable {
                        name: name.to_string(),
                        position: pos,
                    });
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                    }
                    literal.push('}');
                }
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { source, segments })
    }

    /// The template text as written in configuration.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the template references `name` at least once.
    pub fn references(&self, name: &str) -> bool {
        self.variables().any(|v| v == name)
    }

    /// Iterates over referenced variable names in order of appearance
    /// (duplicates included).
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Renders the template with `variables`.
    pub fn render(&self, variables: &HashMap<&str, &str>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable { name, position } => match variables.get(name.as_str()) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(TemplateError::UndefinedVariable {
                            name: name.clone(),
                            position: *position,
                        })
                    }
                },
            }
        }
        Ok(out)
    }
}
