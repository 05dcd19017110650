use crate::platform::Platform;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Artifact paths and failures collected from concurrently running workers.
///
/// Each list has its own lock, held only for a single push. The lists are
/// read once, by value, after every worker has finished.
#[derive(Debug, Default)]
pub struct BuildResults {
    artifacts: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl BuildResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_artifact(&self, path: String) {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path);
    }

    /// Records a failure as `<platform>: <error>`.
    pub fn push_error(&self, platform: &Platform, error: impl fmt::Display) {
        let message = format!("{platform}: {error}");
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// Returns `(artifacts, errors)` in the order they were pushed.
    pub fn into_parts(self) -> (Vec<String>, Vec<String>) {
        let artifacts = self
            .artifacts
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let errors = self
            .errors
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        (artifacts, errors)
    }
}

/// Every failure of a run, one `<platform>: <error>` line each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateError {
    errors: Vec<String>,
}

impl AggregateError {
    /// `None` when there is nothing to report.
    pub fn from_errors(errors: Vec<String>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(AggregateError { errors })
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.errors.len() == 1 { "error" } else { "errors" };
        write!(f, "{} {noun} occurred:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n--> {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
