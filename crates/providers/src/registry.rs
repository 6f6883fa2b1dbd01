//! Provider registry.
//!
//! Constructs and holds all configured adapters. At startup the registry
//! reads the [`LlmConfig`], resolves authentication (CLI presence for OAuth,
//! keys for REST), and instantiates the appropriate adapter per provider.
//! Providers that fail to initialize are recorded and skipped rather than
//! aborting startup, so a hub with only one healthy provider still boots.

use std::collections::HashMap;
use std::sync::Arc;

use ah_domain::config::{LlmConfig, ProviderKind};
use ah_domain::error::{Error, Result};

use crate::claude::ClaudeCliAdapter;
use crate::gemini::GeminiAdapter;
use crate::traits::ProviderAdapter;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds all instantiated adapters plus any initialization failures.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
    default_provider: String,
    init_errors: Vec<ProviderInitError>,
}

/// Records a provider that failed to initialize.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub kind: String,
    /// Error message with potential secrets masked.
    pub error: String,
}

/// Mask substrings that look like API keys in an error message so raw
/// secrets never land in logs or doctor output.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..]);
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        let mut init_errors: Vec<ProviderInitError> = Vec::new();

        for pc in &config.providers {
            let result: Result<Arc<dyn ProviderAdapter>> = match pc.kind {
                ProviderKind::ClaudeCli => ClaudeCliAdapter::from_config(pc)
                    .map(|p| Arc::new(p) as Arc<dyn ProviderAdapter>),
                ProviderKind::Gemini => GeminiAdapter::from_config(pc)
                    .map(|p| Arc::new(p) as Arc<dyn ProviderAdapter>),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider_id = %pc.id, kind = ?pc.kind, "registered provider");
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %safe_error,
                        "failed to initialize provider, skipping"
                    );
                    init_errors.push(ProviderInitError {
                        provider_id: pc.id.clone(),
                        kind: format!("{:?}", pc.kind),
                        error: safe_error,
                    });
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            return Err(Error::Config(
                "all configured LLM providers failed to initialize".into(),
            ));
        }

        Ok(Self {
            providers,
            default_provider: config.default_provider.clone(),
            init_errors,
        })
    }

    /// Build a registry from pre-constructed adapters (embedding, tests).
    pub fn from_adapters(
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        default_provider: &str,
    ) -> Self {
        let providers = adapters
            .into_iter()
            .map(|a| (a.name().to_string(), a))
            .collect();
        Self {
            providers,
            default_provider: default_provider.to_string(),
            init_errors: Vec::new(),
        }
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(provider_id).cloned()
    }

    /// The configured default provider, or any registered one as fallback.
    pub fn default_provider(&self) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers
            .get(&self.default_provider)
            .or_else(|| self.providers.values().next())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// All registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Provider initialization errors (empty if all succeeded). Surfaced by
    /// the doctor command so operators can diagnose missing credentials
    /// without scraping startup logs.
    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_secrets_hides_long_tokens() {
        let msg = "auth failed for key AIzaSyD4f8k2jx93hfk2958sdkfj23 at endpoint";
        let masked = mask_secrets(msg);
        assert!(!masked.contains("AIzaSyD4f8k2jx93hfk2958sdkfj23"));
        assert!(masked.contains("AIza"));
    }

    #[test]
    fn mask_secrets_keeps_short_words() {
        let msg = "connection refused";
        assert_eq!(mask_secrets(msg), msg);
    }
}
