//! Generation Adapter
//!
//! The chat model runtime is reached only through two capabilities:
//! - [`ChatBackend`]: model catalog + engine construction (with progress)
//! - [`ChatEngine`]: chat completion + optional explicit reload
//!
//! [`Generator`] layers the lifecycle on top: candidate fallback at load
//! time, the ready/busy gate, and a single reload-and-retry when the
//! runtime reports that its model was unloaded.

mod engine;

#[cfg(test)]
mod tests;

pub use engine::{BusyGuard, EngineState, Gate, Generator};

use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::error::GenerationError;
use crate::prompt::ChatMessage;

/// Answer text used when the runtime returns no content
pub const NO_RESPONSE: &str = "(no response)";

/// Fixed sampling parameters for every completion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
        }
    }
}

/// Model download / initialization progress reported by the runtime
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadProgress {
    /// 0.0..=1.0 when the runtime reports it
    #[serde(default, alias = "progress")]
    pub fraction: Option<f32>,
    #[serde(default)]
    pub text: String,
}

/// Shared progress callback; cloned into every engine the backend creates
pub type ProgressFn = Rc<dyn Fn(LoadProgress)>;

/// A loaded chat model
#[allow(async_fn_in_trait)]
pub trait ChatEngine {
    /// Run one chat completion. `Ok(None)` means the runtime produced no content.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> Result<Option<String>, GenerationError>;

    /// Reload `model_id` in place
    async fn reload(&self, _model_id: &str) -> Result<(), GenerationError> {
        Err(GenerationError::ReloadUnsupported)
    }
}

/// Factory for chat engines
#[allow(async_fn_in_trait)]
pub trait ChatBackend {
    type Engine: ChatEngine;

    /// Model identifiers the runtime knows about; empty when it cannot say
    async fn available_models(&self) -> Vec<String> {
        Vec::new()
    }

    async fn create(
        &self,
        model_id: &str,
        progress: ProgressFn,
    ) -> Result<Self::Engine, GenerationError>;
}

/// Order in which models are tried at load time.
///
/// Configured candidates keep their order but are narrowed to the runtime
/// catalog when one is reported. If that leaves nothing, the catalog itself
/// is used.
pub fn select_candidates(configured: &[String], available: &[String]) -> Vec<String> {
    if available.is_empty() {
        return configured.to_vec();
    }

    let narrowed: Vec<String> = configured
        .iter()
        .filter(|id| available.contains(id))
        .cloned()
        .collect();

    if narrowed.is_empty() {
        available.to_vec()
    } else {
        narrowed
    }
}

/// Replace missing or blank output with [`NO_RESPONSE`]
pub(crate) fn text_or_placeholder(text: Option<String>) -> String {
    match text {
        Some(t) if !t.trim().is_empty() => t,
        _ => NO_RESPONSE.to_string(),
    }
}
