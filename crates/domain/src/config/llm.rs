use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Configured provider adapters.
    #[serde(default = "d_providers")]
    pub providers: Vec<ProviderConfig>,
    /// Provider used when a caller does not name one.
    #[serde(default = "d_default_provider")]
    pub default_provider: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: d_providers(),
            default_provider: d_default_provider(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registry id ("claude", "gemini").
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Cheap model used for LLM-gated maintenance (clustering, extraction).
    #[serde(default)]
    pub fast_model: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "d_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OAuth via the locally installed CLI binary.
    ClaudeCli,
    /// API-key REST.
    Gemini,
}

/// How an adapter resolves its credential.
///
/// OAuth-backed adapters ignore this entirely (the CLI holds the session).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Plaintext key in the config file (discouraged; warned at startup).
    #[serde(default)]
    pub key: Option<String>,
    /// OS keychain service name.
    #[serde(default)]
    pub service: Option<String>,
    /// OS keychain account name.
    #[serde(default)]
    pub account: Option<String>,
    /// Environment variable holding the key.
    #[serde(default)]
    pub env: Option<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: "claude".into(),
            kind: ProviderKind::ClaudeCli,
            base_url: None,
            default_model: Some("claude-sonnet-4-5".into()),
            fast_model: Some("claude-haiku-4-5".into()),
            auth: AuthConfig::default(),
            timeout_ms: d_timeout_ms(),
            max_retries: d_retries(),
        },
        ProviderConfig {
            id: "gemini".into(),
            kind: ProviderKind::Gemini,
            base_url: Some("https://generativelanguage.googleapis.com".into()),
            default_model: Some("gemini-2.0-flash".into()),
            fast_model: Some("gemini-2.0-flash".into()),
            auth: AuthConfig {
                env: Some("GEMINI_API_KEY".into()),
                ..Default::default()
            },
            timeout_ms: d_timeout_ms(),
            max_retries: d_retries(),
        },
    ]
}

fn d_default_provider() -> String {
    "claude".into()
}
fn d_timeout_ms() -> u64 {
    120_000
}
fn d_retries() -> u32 {
    3
}
