use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Upstream search provider
    pub exa_api_key: String,

    // LLM adjudicator (required only when dedup is enabled)
    pub google_api_key: String,

    // Feature flags
    pub enable_dedup: bool,
    pub enable_url_resolution: bool,

    // External vector recall service
    pub vector_url: String,

    // Persistence
    pub mongodb_uri: String,

    // HTTP server
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        let enable_dedup = bool_env("ENABLE_DEDUP", true);

        Self {
            exa_api_key: required_env("EXA_API_KEY"),
            google_api_key: if enable_dedup {
                required_env("GOOGLE_API_KEY")
            } else {
                env::var("GOOGLE_API_KEY").unwrap_or_default()
            },
            enable_dedup,
            enable_url_resolution: bool_env("ENABLE_URL_RESOLUTION", true),
            vector_url: env::var("VECTOR_URL")
                .unwrap_or_else(|_| "http://localhost:8090".to_string()),
            mongodb_uri: env::var("MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("PORT must be a number"),
        }
    }

    /// Log the first few characters of each sensitive env var for debugging.
    pub fn log_redacted(&self) {
        let vars = [
            ("EXA_API_KEY", &self.exa_api_key),
            ("GOOGLE_API_KEY", &self.google_api_key),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
        tracing::info!(
            enable_dedup = self.enable_dedup,
            enable_url_resolution = self.enable_url_resolution,
            vector_url = %self.vector_url,
            port = self.port,
            "config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}
