use thiserror::Error;

pub type ParameterResult<T> = Result<T, ParameterError>;

/// Failure of a single `name=value` pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("unknown parameter `{name}`")]
    UnknownParameter { name: String },

    #[error("parameter `{name}` requires functional richness {required} (configured: {configured})")]
    NotAvailable {
        name: String,
        required: u8,
        configured: u8,
    },

    #[error("invalid value for `{name}`: {value:?}")]
    Validation { name: String, value: String },

    #[error("parameter `{name}` requires the `{capability}` capability")]
    Authorization { name: String, capability: String },

    #[error("malformed parameter input: {message}")]
    Structural { message: String },
}

impl ParameterError {
    pub fn validation(name: &str, value: &str) -> Self {
        Self::Validation {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    /// Fatal errors abort the whole directive; the rest only reject one pair.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authorization { .. } | Self::Structural { .. })
    }

    pub fn parameter_name(&self) -> Option<&str> {
        match self {
            Self::UnknownParameter { name }
            | Self::NotAvailable { name, .. }
            | Self::Validation { name, .. }
            | Self::Authorization { name, .. } => Some(name),
            Self::Structural { .. } => None,
        }
    }
}

/// Failure of a directive as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("unknown parameter `{name}` (unknown parameters are configured to abort)")]
    UnknownParameterAborted { name: String },

    #[error("no selection criteria found: give at least a category, namespace, title or link filter")]
    NoSelectionCriteria,

    #[error("`openreferences` cannot be combined with category, title or ordering parameters")]
    OpenReferencesConflict,

    #[error("too many categories: {count} given, at most {max} allowed")]
    TooManyCategories { count: usize, max: usize },

    #[error("too few categories: {count} given, at least {min} required")]
    TooFewCategories { count: usize, min: usize },
}
