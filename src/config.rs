use serde::{Deserialize, Serialize};

/// Log filter used when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "ecosnap=info,tower_http=info";

/// Main configuration structure loaded from ecosnap.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Upstream chat-completion gateway
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ai.gateway.lovable.dev/v1".to_string(),
            model: "google/gemini-2.5-flash".to_string(),
            temperature: 0.3,
            timeout_ms: 60_000,
        }
    }
}

/// Input limits for uploads and history listings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_image_bytes: usize,
    pub history_default: usize,
    pub history_max: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 5 * 1024 * 1024,
            history_default: 20,
            history_max: 100,
        }
    }
}

impl LimitsConfig {
    /// Body limit for inbound requests: the base64 expansion of the largest
    /// accepted image plus room for the JSON envelope and data-URL prefix.
    pub fn request_body_limit(&self) -> usize {
        self.max_image_bytes.div_ceil(3) * 4 + 64 * 1024
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "ecosnap.db".to_string(),
        }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api_key: Option<String>,
    pub http_bind: std::net::SocketAddr,
    pub bearer_token: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            http_bind: std::net::SocketAddr::from(([127, 0, 0, 1], 8787)),
            bearer_token: None,
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        let mut cfg = Self::default();

        cfg.api_key =
            non_empty_env("AI_GATEWAY_API_KEY").or_else(|| non_empty_env("LOVABLE_API_KEY"));
        if let Ok(v) = std::env::var("ECOSNAP_HTTP_BIND") {
            match v.parse::<std::net::SocketAddr>() {
                Ok(bind) => cfg.http_bind = bind,
                Err(_) => tracing::warn!("Ignoring unparseable ECOSNAP_HTTP_BIND '{}'", v),
            }
        }
        cfg.bearer_token = non_empty_env("ECOSNAP_BEARER_TOKEN");

        cfg
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses ECOSNAP_CONFIG environment variable or defaults to "ecosnap.toml"
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(env_path) = std::env::var("ECOSNAP_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
        }

        let config_path =
            std::env::var("ECOSNAP_CONFIG").unwrap_or_else(|_| "ecosnap.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            Self::from_toml(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        // Env-first overrides
        if let Some(url) = non_empty_env("ECOSNAP_GATEWAY_URL") {
            config.gateway.base_url = url;
            tracing::debug!("ECOSNAP_GATEWAY_URL env override applied");
        }
        if let Some(model) = non_empty_env("ECOSNAP_MODEL") {
            config.gateway.model = model;
            tracing::debug!("ECOSNAP_MODEL env override applied");
        }
        if let Some(timeout) =
            non_empty_env("ECOSNAP_GATEWAY_TIMEOUT_MS").and_then(|v| v.parse().ok())
        {
            config.gateway.timeout_ms = timeout;
        }
        if let Some(max) = non_empty_env("ECOSNAP_MAX_IMAGE_BYTES").and_then(|v| v.parse().ok()) {
            config.limits.max_image_bytes = max;
        }
        if let Some(path) = non_empty_env("ECOSNAP_DB_PATH") {
            config.store.database_path = path;
        }

        config.runtime = RuntimeConfig::load_from_env();
        config.validate()?;

        if config.runtime.api_key.is_none() {
            tracing::warn!(
                "AI_GATEWAY_API_KEY is not configured; classification requests will fail"
            );
        }

        Ok(config)
    }

    /// Parse the TOML layer only; runtime settings stay at their defaults
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate and normalize loaded values
    pub fn validate(&mut self) -> anyhow::Result<()> {
        let url = self.gateway.base_url.trim_end_matches('/').to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!(
                "Gateway URL '{}' must start with http:// or https://",
                self.gateway.base_url
            );
        }
        self.gateway.base_url = url;

        if !(0.0..=2.0).contains(&self.gateway.temperature) {
            tracing::warn!(
                "temperature {} outside 0.0-2.0, clamping",
                self.gateway.temperature
            );
            self.gateway.temperature = self.gateway.temperature.clamp(0.0, 2.0);
        }

        if self.gateway.model.trim().is_empty() {
            anyhow::bail!("Gateway model must not be empty");
        }
        if self.limits.max_image_bytes == 0 {
            anyhow::bail!("limits.max_image_bytes must be > 0");
        }
        if self.limits.history_max == 0 {
            anyhow::bail!("limits.history_max must be > 0");
        }
        if self.limits.history_default > self.limits.history_max {
            self.limits.history_default = self.limits.history_max;
        }
        Ok(())
    }
}
