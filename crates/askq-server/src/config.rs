use anyhow::{Context, Result, bail};

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEFAULT_FOSSABOT_API_BASE: &str = "https://api.fossabot.com/";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub channel_key: String,
    pub channel_secret: String,
    pub bridge_secret: String,
    pub eventsub_secret: Option<String>,
    pub fossabot_api_base: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = var("ASKQ_PORT", "3000");
        let port = port
            .parse()
            .with_context(|| format!("ASKQ_PORT is not a port number: {port}"))?;

        Ok(Self {
            host: var("ASKQ_HOST", "0.0.0.0"),
            port,
            db_path: var("ASKQ_DB_PATH", "askq.db"),
            jwt_secret: required_secret(&lookup, "ASKQ_JWT_SECRET")?,
            channel_key: var("ASKQ_CHANNEL_KEY", "askq"),
            channel_secret: required_secret(&lookup, "ASKQ_CHANNEL_SECRET")?,
            bridge_secret: required_secret(&lookup, "ASKQ_BRIDGE_SECRET")?,
            eventsub_secret: lookup("ASKQ_EVENTSUB_SECRET").filter(|s| !s.is_empty()),
            fossabot_api_base: var("ASKQ_FOSSABOT_API_BASE", DEFAULT_FOSSABOT_API_BASE),
        })
    }
}

fn required_secret(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    let value = lookup(key).unwrap_or_default();
    if value.is_empty() || PLACEHOLDER_SECRETS.contains(&value.as_str()) {
        bail!("{key} is unset or still a placeholder. Set it in your .env file and restart.");
    }
    Ok(value)
}
