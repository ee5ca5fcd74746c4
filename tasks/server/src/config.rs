use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Database connection URL, either `postgres://...` or `sqlite://...`.
    pub db_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Caps the `limit` query parameter when listing tasks. Unbounded when unset.
    #[serde(default)]
    pub max_page_limit: Option<u64>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(environment: config::Environment) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }
}

fn default_port() -> u16 {
    8000
}
