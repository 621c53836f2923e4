use serde::{Deserialize, Serialize};

use crate::model::{ParcelVariant, MAX_BATCH_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub socrata: SocrataConfig,
    pub geoclient: GeoclientConfig,
    pub lookup: LookupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocrataConfig {
    pub base_url: String,
    /// Optional; without it requests run under the anonymous rate limit
    pub app_token: Option<String>,
    /// Per-request timeout. Unset means no explicit timeout.
    pub timeout_secs: Option<u64>,
    pub legals_dataset: String,
    pub master_dataset: String,
    pub permits_dataset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoclientConfig {
    pub url: String,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Filter variants tried in order until one yields rows
    pub variants: Vec<ParcelVariant>,
    pub batch_size: usize,
    pub legals_row_cap: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    pub direct_master_fallback: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            socrata: SocrataConfig::default(),
            geoclient: GeoclientConfig::default(),
            lookup: LookupConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl Default for SocrataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://data.cityofnewyork.us".to_string(),
            app_token: None,
            timeout_secs: None,
            legals_dataset: "8h5j-fqxa".to_string(),
            master_dataset: "bnx9-e6tj".to_string(),
            permits_dataset: "ipu4-2q9a".to_string(),
        }
    }
}

impl Default for GeoclientConfig {
    fn default() -> Self {
        Self {
            url: "https://api.nyc.gov/geoclient/v2".to_string(),
            key: None,
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            variants: ParcelVariant::DEFAULT_ORDER.to_vec(),
            batch_size: 75,
            legals_row_cap: 5000,
            default_limit: 25,
            max_limit: 100,
            direct_master_fallback: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // PARCEL__LOOKUP__BATCH_SIZE=50 -> lookup.batch_size
        config = config.add_source(
            config::Environment::with_prefix("PARCEL")
                .separator("__")
                .prefix_separator("__"),
        );

        let config = config.build()?;
        let mut app_config: AppConfig = config.try_deserialize()?;
        app_config.apply_env_fallbacks();
        app_config.validate()?;

        Ok(app_config)
    }

    /// Honour the bare variable names the hosting environment already sets
    fn apply_env_fallbacks(&mut self) {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if self.socrata.app_token.is_none() {
            self.socrata.app_token = var("SOCRATA_APP_TOKEN");
        }
        if self.geoclient.key.is_none() {
            self.geoclient.key = var("GEOCLIENT_KEY");
        }
        if let Some(url) = var("GEOCLIENT_URL") {
            self.geoclient.url = url;
        }
        if let Some(port) = var("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let lookup = &self.lookup;
        if lookup.variants.is_empty() {
            anyhow::bail!("lookup.variants must name at least one filter variant");
        }
        if lookup.batch_size == 0 || lookup.batch_size > MAX_BATCH_SIZE {
            anyhow::bail!(
                "lookup.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE,
                lookup.batch_size
            );
        }
        if lookup.max_limit == 0 || lookup.default_limit == 0 {
            anyhow::bail!("lookup limits must be positive");
        }
        if lookup.default_limit > lookup.max_limit {
            anyhow::bail!(
                "lookup.default_limit ({}) exceeds lookup.max_limit ({})",
                lookup.default_limit,
                lookup.max_limit
            );
        }
        Ok(())
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
