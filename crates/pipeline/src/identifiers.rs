//! Newtype domain identifiers.
//!
//! Every configured name in the extraction pipeline is a distinct newtype
//! wrapping a primitive. This prevents accidentally passing, for example, a
//! [`TaskName`] where a [`ModelName`] is expected even though both are strings
//! under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is blank.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.trim().is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| {
                    format!("{} must not be empty", stringify!($name))
                })
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single extraction run (one call to
/// [`crate::ExtractionPipeline::run`]).
///
/// Generated fresh for every invocation; recorded on the `extraction` tracing
/// span and in the [`crate::RunRecord`] so all activity from one run can be
/// correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractionRunId(Uuid);

impl ExtractionRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an [`ExtractionRunId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ExtractionRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed (configuration names)
// ---------------------------------------------------------------------------

string_id! {
    /// The role an agent plays, e.g. `"Polish vocabulary extractor"`.
    ///
    /// Rendered into the agent's system prompt.
    AgentRole
}

string_id! {
    /// Names a task as keyed in `tasks.yaml` (e.g. `"word_extraction_task"`).
    TaskName
}

string_id! {
    /// The provider-specific model identifier (e.g. `"gpt-4o-mini"`).
    ModelName
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_id_rejects_blank() {
        assert!(TaskName::new("").is_none());
        assert!(TaskName::new("   ").is_none());
        assert_eq!(TaskName::new("extract").unwrap().as_str(), "extract");
    }

    #[test]
    fn test_string_id_deserialize_rejects_empty() {
        let ok: ModelName = serde_json::from_str("\"gpt-4o\"").unwrap();
        assert_eq!(ok.to_string(), "gpt-4o");

        let err = serde_json::from_str::<ModelName>("\"\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(ExtractionRunId::new_random(), ExtractionRunId::new_random());
    }
}
