//! Confirmation collaborator
//!
//! Asked before a running scene is replaced by a new one.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

#[async_trait]
pub trait ConfirmPrompt: Send + Sync + fmt::Debug {
    /// `true` to go ahead
    async fn confirm(&self, message: &str) -> bool;
}

/// Answers every question the same way
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Default for AutoConfirm {
    fn default() -> Self {
        Self(true)
    }
}

#[async_trait]
impl ConfirmPrompt for AutoConfirm {
    async fn confirm(&self, message: &str) -> bool {
        tracing::debug!(answer = self.0, "Auto-answering: {}", message);
        self.0
    }
}

pub fn auto_confirm() -> Arc<dyn ConfirmPrompt> {
    Arc::new(AutoConfirm::default())
}
