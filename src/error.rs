//! Error types for the metadata core

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::loader::Phase;

/// Result type for metadata operations
pub type Result<T> = std::result::Result<T, MetaDataError>;

/// Metadata core errors
#[derive(Error, Debug)]
pub enum MetaDataError {
    #[error("Type not found: {type_id}{}", suggestion_suffix(.suggestions))]
    TypeNotFound {
        type_id: String,
        suggestions: Vec<String>,
    },

    #[error("Cyclic inheritance: {type_id} is its own ancestor ({chain})")]
    CyclicInheritance { type_id: String, chain: String },

    #[error("Constraint violation [{constraint_id}] at {path}: {description}")]
    ConstraintViolation {
        constraint_id: String,
        description: String,
        /// Hierarchical path of the offending node
        path: String,
        /// Qualified type of the offending node
        node_type: String,
    },

    #[error("Duplicate child at {path}: {existing} already exists")]
    DuplicateChild { path: String, existing: String },

    #[error("Constraint already registered: {0}")]
    DuplicateConstraint(String),

    #[error("Loader already registered under name: {0}")]
    DuplicateLoader(String),

    #[error("Type provider already added under id: {0}")]
    DuplicateProvider(String),

    #[error("Circular provider dependency involving: {0}")]
    ProviderCycle(String),

    #[error("Loader [{loader}] failed during {phase} after {}ms: {message}", .elapsed.as_millis())]
    Loading {
        loader: String,
        phase: Phase,
        elapsed: Duration,
        message: String,
        #[source]
        cause: Option<Arc<MetaDataError>>,
    },

    #[error("Loader initialization timeout after {}ms: {loader_key}", .timeout.as_millis())]
    LoadingTimeout { loader_key: String, timeout: Duration },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Illegal transition for [{subject}]: expected {expected} but was {current}, requested {requested}")]
    IllegalTransition {
        subject: String,
        expected: Phase,
        current: Phase,
        requested: Phase,
    },

    #[error("MetaData not found: {name} in {scope}")]
    NotFound { name: String, scope: String },

    #[error("Invalid type id: {0}")]
    InvalidTypeId(String),

    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MetaDataError {
    /// Build a constraint violation for a node path
    pub fn violation(
        constraint_id: impl Into<String>,
        description: impl Into<String>,
        path: impl Into<String>,
        node_type: impl Into<String>,
    ) -> Self {
        MetaDataError::ConstraintViolation {
            constraint_id: constraint_id.into(),
            description: description.into(),
            path: path.into(),
            node_type: node_type.into(),
        }
    }

    /// Constraint id carried by a violation
    pub fn constraint_id(&self) -> Option<&str> {
        match self {
            MetaDataError::ConstraintViolation { constraint_id, .. } => Some(constraint_id),
            _ => None,
        }
    }

    /// Whether `init_with_retry` may try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MetaDataError::Loading { .. } | MetaDataError::LoadingTimeout { .. }
        )
    }

    /// Whether this is a lifecycle programming error
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            MetaDataError::IllegalState(_) | MetaDataError::IllegalTransition { .. }
        )
    }

    /// Innermost recorded cause of a loading failure
    pub fn root_cause(&self) -> &MetaDataError {
        match self {
            MetaDataError::Loading { cause: Some(cause), .. } => cause.root_cause(),
            other => other,
        }
    }
}

fn suggestion_suffix(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {})", suggestions.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_not_found_renders_suggestions() {
        let err = MetaDataError::TypeNotFound {
            type_id: "field.strng".to_string(),
            suggestions: vec!["field.string".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Type not found: field.strng (did you mean: field.string)"
        );
    }

    #[test]
    fn test_root_cause_unwraps_loading_chain() {
        let inner = MetaDataError::violation("x.id", "bad", "acme::User.name", "field.string");
        let err = MetaDataError::Loading {
            loader: "test".to_string(),
            phase: Phase::Initializing,
            elapsed: Duration::from_millis(5),
            message: "failed".to_string(),
            cause: Some(Arc::new(inner)),
        };
        assert!(err.is_retryable());
        assert_eq!(err.root_cause().constraint_id(), Some("x.id"));
    }
}
