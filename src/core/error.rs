//! Error types for pension calculations

use std::fmt;

use thiserror::Error;

/// Human-readable input problems collected before any computation runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CalcError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("Invalid input: {0}")]
    Validation(ValidationErrors),

    #[error("Not eligible for a pension: {0}")]
    Ineligible(String),

    #[error("No eligible claiming scenario: {0}")]
    NoScenarios(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CalcError {
    pub fn validation_messages(&self) -> Vec<String> {
        match self {
            CalcError::Validation(errors) => errors.messages().to_vec(),
            other => vec![other.to_string()],
        }
    }
}

/// Result type for pension calculations
pub type Result<T> = std::result::Result<T, CalcError>;
