//! Error tracing extensions
//!
//! Logs errors with their code, severity and source chain before they are
//! handed to the editor layer.

use crate::types::{NotebookError, Severity};
use std::error::Error as StdError;

/// Extension trait for adding tracing context to errors
pub trait ErrorTraceExt {
    /// Log the error with code, severity and source chain
    fn trace_error(&self) -> &Self;
}

impl ErrorTraceExt for NotebookError {
    fn trace_error(&self) -> &Self {
        let error_code = self.error_code();

        let mut error_chain = Vec::new();
        let mut current_source = self.source();
        while let Some(source) = current_source {
            error_chain.push(source.to_string());
            current_source = source.source();
        }

        // Lock conditions and missing sessions are expected user mistakes
        match self.severity() {
            Severity::Warning => tracing::warn!(
                error = %self,
                error_code = error_code.code(),
                error_code_name = ?error_code,
                "Command rejected"
            ),
            Severity::Error => tracing::error!(
                error = %self,
                error_code = error_code.code(),
                error_code_name = ?error_code,
                is_retryable = self.is_retryable(),
                error_chain = ?error_chain,
                "Command failed"
            ),
        }

        self
    }
}

/// Extension trait for Result types
pub trait ResultTraceExt<T>: Sized {
    /// Convert the error to `NotebookError` and log it
    fn trace_context(self) -> Result<T, NotebookError>;
}

impl<T, E> ResultTraceExt<T> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
    NotebookError: From<E>,
{
    fn trace_context(self) -> Result<T, NotebookError> {
        self.map_err(|e| {
            let error = NotebookError::from(e);
            error.trace_error();
            error
        })
    }
}
