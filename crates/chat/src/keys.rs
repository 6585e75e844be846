// Provider credentials.
//
// Resolution order: system keychain (the default-on `keychain`
// feature), then the GRIDAGENT_<PROVIDER>_KEY environment variable for
// CI and headless machines. settings.toml never holds secrets.

use std::env;

use gridagent_core::EngineError;

use crate::settings::Provider;

const KEYCHAIN_SERVICE: &str = "gridagent";

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Keychain,
    Environment,
}

impl KeySource {
    pub fn label(&self) -> &'static str {
        match self {
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
        }
    }
}

/// A resolved provider credential.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub secret: String,
    pub source: KeySource,
}

/// The environment variable consulted when the keychain has no entry
/// for `provider`.
pub fn env_var(provider: Provider) -> String {
    format!("GRIDAGENT_{}_KEY", provider.name().to_uppercase())
}

fn account(provider: Provider) -> String {
    format!("ai/{}", provider.name())
}

/// Resolve the API key for `provider`, keychain first.
pub fn lookup(provider: Provider) -> Option<ApiKey> {
    #[cfg(feature = "keychain")]
    if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, &account(provider)) {
        if let Ok(secret) = entry.get_password() {
            return Some(ApiKey {
                secret,
                source: KeySource::Keychain,
            });
        }
    }
    match env::var(env_var(provider)) {
        Ok(secret) if !secret.is_empty() => Some(ApiKey {
            secret,
            source: KeySource::Environment,
        }),
        _ => None,
    }
}

/// Store a key in the system keychain.
#[cfg(feature = "keychain")]
pub fn store(provider: Provider, secret: &str) -> Result<(), EngineError> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &account(provider))
        .map_err(|e| EngineError::validation(format!("keychain unavailable: {e}")))?;
    entry
        .set_password(secret)
        .map_err(|e| EngineError::validation(format!("could not store key: {e}")))
}

#[cfg(not(feature = "keychain"))]
pub fn store(provider: Provider, _secret: &str) -> Result<(), EngineError> {
    Err(EngineError::validation(format!(
        "built without keychain support; set {} instead",
        env_var(provider)
    )))
}

/// Remove a key from the system keychain.
#[cfg(feature = "keychain")]
pub fn forget(provider: Provider) -> Result<(), EngineError> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, &account(provider))
        .map_err(|e| EngineError::validation(format!("keychain unavailable: {e}")))?;
    entry
        .delete_credential()
        .map_err(|e| EngineError::validation(format!("could not delete key: {e}")))
}

#[cfg(not(feature = "keychain"))]
pub fn forget(_provider: Provider) -> Result<(), EngineError> {
    Err(EngineError::validation("built without keychain support"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_follows_provider_name() {
        assert_eq!(env_var(Provider::OpenAi), "GRIDAGENT_OPENAI_KEY");
        assert_eq!(env_var(Provider::Anthropic), "GRIDAGENT_ANTHROPIC_KEY");
    }

    #[test]
    fn keychain_account_follows_provider_name() {
        assert_eq!(account(Provider::OpenAi), "ai/openai");
        assert_eq!(account(Provider::Anthropic), "ai/anthropic");
    }

    #[test]
    fn env_fallback_supplies_a_key() {
        env::set_var("GRIDAGENT_ANTHROPIC_KEY", "sk-test");
        let key = lookup(Provider::Anthropic).expect("key from environment");
        assert!(!key.secret.is_empty());
        env::remove_var("GRIDAGENT_ANTHROPIC_KEY");
    }

    #[test]
    fn empty_env_value_is_no_key() {
        env::set_var("GRIDAGENT_OPENAI_KEY", "");
        assert!(lookup(Provider::OpenAi).is_none());
        env::remove_var("GRIDAGENT_OPENAI_KEY");
    }
}
