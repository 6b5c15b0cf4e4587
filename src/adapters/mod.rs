//! Adapter interfaces for text-completion services.
//!
//! Assist operations treat the completion service as a pure
//! `prompt -> text` function. Adapters hide how that call is made.

pub mod command;
pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{AssistBackendKind, AssistSettings};

pub use command::CommandAdapter;
pub use gemini::GeminiAdapter;

/// Output from an adapter execution
#[derive(Debug, Clone)]
pub struct AdapterOutput {
    /// The text returned by the service
    pub content: String,

    /// Tokens used (if reported)
    pub tokens_used: Option<u64>,
}

impl AdapterOutput {
    /// Create a new adapter output with just content
    pub fn new(content: String) -> Self {
        Self {
            content,
            tokens_used: None,
        }
    }
}

/// Trait for text-completion adapters
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Run a single, stateless completion
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<AdapterOutput>;

    /// Check the service is reachable and configured
    async fn health_check(&self) -> Result<()>;
}

/// Build the adapter selected by the assist settings
pub fn from_settings(settings: &AssistSettings) -> Result<Arc<dyn Adapter>> {
    match settings.backend {
        AssistBackendKind::Gemini => Ok(Arc::new(GeminiAdapter::from_settings(settings)?)),
        AssistBackendKind::Command => Ok(Arc::new(CommandAdapter::from_settings(settings)?)),
    }
}
