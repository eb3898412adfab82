//! Configuration types for tunevault
//!
//! Every behavior has a sensible default; a zero-configuration
//! [`Config::default()`] works for local development (file vault under
//! `./vault`, SQLite database beside it, API on localhost). Provider
//! credentials are the only settings production deployments must supply.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use utoipa::ToSchema;

/// Top-level configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Generation provider endpoint and credentials
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Durable artifact storage
    #[serde(default)]
    pub vault: VaultConfig,

    /// Data storage and state management
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// REST API server
    #[serde(default)]
    pub api: ApiConfig,

    /// Bounded retry for inbound callback processing
    #[serde(default = "callback_retry_default")]
    pub callback_retry: RetryConfig,

    /// One-shot deferred poll scheduled at submission
    #[serde(default)]
    pub deferred_poll: DeferredPollConfig,

    /// Failure classification terms
    #[serde(default)]
    pub classification: ClassificationConfig,
}

// Manual impl because the callback retry default is not RetryConfig's
// general default (see callback_retry_default)
impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            vault: VaultConfig::default(),
            persistence: PersistenceConfig::default(),
            api: ApiConfig::default(),
            callback_retry: callback_retry_default(),
            deferred_poll: DeferredPollConfig::default(),
            classification: ClassificationConfig::default(),
        }
    }
}

/// Generation provider configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderConfig {
    /// Base URL of the provider API (default: "https://api.example-music.dev/api/v1")
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Bearer token for provider API calls
    #[serde(default)]
    pub api_key: Option<String>,

    /// Publicly reachable URL of this service's callback endpoint,
    /// handed to the provider at submission
    #[serde(default)]
    pub callback_url: Option<String>,

    /// Timeout for provider status requests (default: 30 seconds)
    #[serde(default = "default_provider_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: None,
            callback_url: None,
            request_timeout: default_provider_timeout(),
        }
    }
}

/// Durable artifact storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VaultConfig {
    /// Root directory for stored artifacts (default: "./vault")
    #[serde(default = "default_vault_root")]
    pub root_dir: PathBuf,

    /// Secret used to sign retrieval references
    ///
    /// Rotating the secret invalidates every outstanding reference.
    #[serde(default = "default_signing_secret")]
    pub signing_secret: String,

    /// Validity window of signed retrieval references (default: 24 hours)
    #[serde(default = "default_artifact_ttl", with = "duration_serde")]
    pub artifact_ttl: Duration,

    /// Timeout for a single artifact download (default: 120 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root_dir: default_vault_root(),
            signing_secret: default_signing_secret(),
            artifact_ttl: default_artifact_ttl(),
            download_timeout: default_download_timeout(),
        }
    }
}

/// Data storage and state management configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./tunevault.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6710)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for interactive callers (X-Api-Key header)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Shared secret for trusted internal callers
    /// (Authorization: Bearer plus X-Service-Role header)
    #[serde(default)]
    pub service_secret: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            service_secret: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Retry configuration with exponential backoff
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// One-shot deferred poll configuration
///
/// The deferred poll is the safety net for tasks whose push callback
/// never arrives; it fires exactly once per submission.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DeferredPollConfig {
    /// Spawn the deferred poll at submission (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay before the poll fires (default: 2 minutes)
    #[serde(default = "default_deferred_delay", with = "duration_serde")]
    pub delay: Duration,
}

impl Default for DeferredPollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: default_deferred_delay(),
        }
    }
}

/// Failure classification configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassificationConfig {
    /// Case-insensitive substrings that mark a provider error as a
    /// content/policy rejection rather than a technical failure
    #[serde(default = "default_rejection_terms")]
    pub rejection_terms: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            rejection_terms: default_rejection_terms(),
        }
    }
}

fn default_provider_base_url() -> String {
    "https://api.example-music.dev/api/v1".to_string()
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_vault_root() -> PathBuf {
    PathBuf::from("./vault")
}

fn default_signing_secret() -> String {
    // Insecure placeholder; deployments must override.
    "tunevault-dev-secret".to_string()
}

fn default_artifact_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./tunevault.db")
}

fn default_bind_address() -> SocketAddr {
    "127.0.0.1:6710".parse().unwrap_or_else(|_| {
        SocketAddr::from(([127, 0, 0, 1], 6710))
    })
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_deferred_delay() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_rejection_terms() -> Vec<String> {
    ["rejected", "policy", "content", "forbidden", "violation"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

/// Callback processing uses a tighter schedule than the general default:
/// three attempts at 1s/2s/4s with no jitter, then abandon (the deferred
/// poll is the backstop).
fn callback_retry_default() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(8),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

impl Config {
    /// Validate configuration consistency
    pub fn validate(&self) -> crate::Result<()> {
        if url::Url::parse(&self.provider.base_url).is_err() {
            return Err(crate::Error::Config {
                message: format!("provider base URL is not valid: {}", self.provider.base_url),
                key: Some("provider.base_url".to_string()),
            });
        }
        if let Some(callback_url) = &self.provider.callback_url {
            if url::Url::parse(callback_url).is_err() {
                return Err(crate::Error::Config {
                    message: format!("callback URL is not valid: {callback_url}"),
                    key: Some("provider.callback_url".to_string()),
                });
            }
        }
        if self.vault.signing_secret.is_empty() {
            return Err(crate::Error::Config {
                message: "vault signing secret must not be empty".to_string(),
                key: Some("vault.signing_secret".to_string()),
            });
        }
        if self.callback_retry.max_attempts == 0 {
            return Err(crate::Error::Config {
                message: "callback retry must allow at least one attempt".to_string(),
                key: Some("callback_retry.max_attempts".to_string()),
            });
        }
        if self.classification.rejection_terms.is_empty() {
            return Err(crate::Error::Config {
                message: "classification requires at least one rejection term".to_string(),
                key: Some("classification.rejection_terms".to_string()),
            });
        }
        Ok(())
    }
}

// Duration serialization helper (seconds as u64)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
