//! Error types for kiln
//!
//! Per-target failures are [`BuildError`]s: they are stored on the failing
//! node and reported, never thrown across sibling builds.

use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{target}: no rule matched")]
    NoRule { target: String },

    #[error("{target}: cannot stat: {source}")]
    Stat {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{target}: dependency {dependency} failed")]
    DependencyFailed { target: String, dependency: String },

    #[error("{target}: reported done with {outstanding} dependencies still building")]
    PendingDependencies { target: String, outstanding: usize },

    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("{target}: command `{command}` failed{}", exit_suffix(.code))]
    CommandFailed {
        target: String,
        command: String,
        code: Option<i32>,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template `{template}`: {reason}")]
    Template { template: String, reason: String },

    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),
}

impl BuildError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// True when this node failed only because something it waited on failed.
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::DependencyFailed { .. })
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {}", code),
        None => " (terminated by signal)".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("invalid rule pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Why a finished run is not a success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("{count} target(s) failed")]
    Failed { count: usize },

    #[error("uncompleted builds: {in_flight} target(s) never finished")]
    Incomplete { in_flight: usize },

    #[error("{target}: builder panicked: {message}")]
    Fatal { target: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BuildError::NoRule {
            target: "main.o".to_string(),
        };
        assert_eq!(err.to_string(), "main.o: no rule matched");

        let err = BuildError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }

    #[test]
    fn test_command_failed_display() {
        let err = BuildError::CommandFailed {
            target: "app".into(),
            command: "cc -o app".into(),
            code: Some(2),
        };
        assert_eq!(
            err.to_string(),
            "app: command `cc -o app` failed with exit code 2"
        );
    }

    #[test]
    fn test_blocked() {
        let err = BuildError::DependencyFailed {
            target: "app".into(),
            dependency: "main.o".into(),
        };
        assert!(err.is_blocked());
        assert!(!BuildError::msg("boom").is_blocked());
    }
}
