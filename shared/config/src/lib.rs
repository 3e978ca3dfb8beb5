use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    /// Cache/counter backend (C2). Absent means the in-memory fallback is
    /// used everywhere a Redis round-trip would otherwise happen.
    pub redis_url: Option<String>,

    pub jwt_secret: String,

    #[serde(default = "default_jwt_access_ttl_seconds")]
    pub jwt_access_ttl_seconds: i64,

    #[serde(default = "default_jwt_refresh_ttl_days")]
    pub jwt_refresh_ttl_days: i64,

    #[serde(default = "default_api_key_prefix")]
    pub api_key_prefix: String,

    #[serde(default = "default_vector_dimension")]
    pub vector_dimension: usize,

    pub embedding_provider_url: Option<String>,
    pub embedding_provider_api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_webhook_max_attempts")]
    pub webhook_max_attempts: u32,

    #[serde(default = "default_webhook_retry_delays_seconds")]
    pub webhook_retry_delays_seconds: Vec<u64>,

    #[serde(default = "default_webhook_request_timeout_seconds")]
    pub webhook_request_timeout_seconds: u64,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_jwt_access_ttl_seconds() -> i64 {
    900 // 15 minutes
}

fn default_jwt_refresh_ttl_days() -> i64 {
    30
}

fn default_api_key_prefix() -> String {
    "mk_".to_string()
}

fn default_vector_dimension() -> usize {
    384
}

fn default_embedding_model() -> String {
    "local-minilm".to_string()
}

fn default_webhook_max_attempts() -> u32 {
    5
}

fn default_webhook_retry_delays_seconds() -> Vec<u64> {
    vec![60, 300, 900, 3600, 7200]
}

fn default_webhook_request_timeout_seconds() -> u64 {
    30
}

fn default_cors_origins() -> Vec<String> {
    vec![]
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables (`.env` first, if
    /// present, then the process environment).
    pub fn from_env() -> Result<Self, config::ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("no .env file loaded: {e}");
        }

        let builder = config::Config::builder()
            .set_default("database_url", "")?
            .set_default("jwt_secret", "")?
            .set_default("jwt_access_ttl_seconds", default_jwt_access_ttl_seconds())?
            .set_default("jwt_refresh_ttl_days", default_jwt_refresh_ttl_days())?
            .set_default("api_key_prefix", default_api_key_prefix())?
            .set_default("vector_dimension", default_vector_dimension() as i64)?
            .set_default("embedding_model", default_embedding_model())?
            .set_default("webhook_max_attempts", default_webhook_max_attempts())?
            .set_default(
                "webhook_retry_delays_seconds",
                default_webhook_retry_delays_seconds()
                    .into_iter()
                    .map(|v| v as i64)
                    .collect::<Vec<_>>(),
            )?
            .set_default(
                "webhook_request_timeout_seconds",
                default_webhook_request_timeout_seconds(),
            )?
            .set_default("host", default_host())?
            .set_default("port", default_port())?
            .add_source(config::Environment::default().try_parsing(true).list_separator(","));

        let config = builder.build()?;
        let deserialized = config.try_deserialize::<Config>()?;
        tracing::info!(
            port = deserialized.port,
            redis = deserialized.redis_url.is_some(),
            "configuration loaded"
        );

        Ok(deserialized)
    }
}
