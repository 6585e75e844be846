//! `gridagent-chat`: agent orchestration over pluggable AI backends.
//!
//! Runs the bounded multi-turn loop: feed the model sheet metadata and
//! the tool schema, execute returned tool calls serially through the
//! dispatcher, persist exactly one assistant message per completed turn.
//! Provider variance (wire formats, iteration ceilings, malformed-call
//! signalling) is isolated behind the `Backend` adapter trait.

pub mod anthropic;
pub mod keys;
pub mod openai;
pub mod orchestrator;
pub mod provider;
pub mod settings;

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;
pub use orchestrator::{Orchestrator, TurnOutcome};
pub use provider::{Backend, ModelTurn, ToolInvocation, TurnMessage};
pub use settings::{Provider, Settings};

use gridagent_core::EngineError;

/// Build the configured backend, looking up its API key.
pub fn backend_from_settings(settings: &Settings) -> Result<Box<dyn Backend>, EngineError> {
    match settings.provider {
        Provider::None => Err(EngineError::validation(
            "AI features are disabled. Set a provider in settings.toml",
        )),
        Provider::OpenAi => Ok(Box::new(OpenAiBackend::new(
            require_key(Provider::OpenAi)?,
            settings.effective_model().to_string(),
            settings.api_base.clone(),
        ))),
        Provider::Anthropic => Ok(Box::new(AnthropicBackend::new(
            require_key(Provider::Anthropic)?,
            settings.effective_model().to_string(),
            settings.api_base.clone(),
        ))),
    }
}

fn require_key(provider: Provider) -> Result<String, EngineError> {
    keys::lookup(provider)
        .map(|k| k.secret)
        .ok_or_else(|| EngineError::validation(format!("no {} API key configured", provider.name())))
}
