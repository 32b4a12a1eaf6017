use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

pub const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";

/// Process-wide settings, loaded once in `main` and shared as `Arc<Config>`.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub paystack_secret_key: String,
    pub paystack_base_url: String,
    pub webhook_secret: String,
    pub callback_url: Option<String>,
    pub default_currency: String,
    pub gateway_max_attempts: u32,
    pub gateway_backoff_ms: u64,
    pub gateway_timeout_secs: u64,
    pub webhook_timeout_ms: u64,
    pub reconcile_after_secs: u64,
    pub reconcile_interval_secs: u64,
    pub notification_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let paystack_secret_key = get_env("PAYSTACK_SECRET_KEY")?;
        // Paystack signs webhooks with the secret key unless a dedicated secret is configured.
        let webhook_secret = get_env_opt("PAYSTACK_WEBHOOK_SECRET")
            .unwrap_or_else(|| paystack_secret_key.clone());

        let config = Self {
            server_address: get_env_or("SERVER_ADDRESS", "0.0.0.0:8080"),
            database_url: get_env_opt("DATABASE_URL"),
            jwt_secret: get_env("JWT_SECRET")?,
            paystack_secret_key,
            paystack_base_url: get_env_or("PAYSTACK_BASE_URL", DEFAULT_PAYSTACK_BASE_URL),
            webhook_secret,
            callback_url: get_env_opt("PAYSTACK_CALLBACK_URL"),
            default_currency: get_env_or("DEFAULT_CURRENCY", "KES").to_uppercase(),
            gateway_max_attempts: get_env_parse_or("GATEWAY_MAX_ATTEMPTS", 3)?,
            gateway_backoff_ms: get_env_parse_or("GATEWAY_BACKOFF_MS", 1000)?,
            gateway_timeout_secs: get_env_parse_or("GATEWAY_TIMEOUT_SECS", 15)?,
            webhook_timeout_ms: get_env_parse_or("WEBHOOK_TIMEOUT_MS", 5000)?,
            reconcile_after_secs: get_env_parse_or("RECONCILE_AFTER_SECS", 900)?,
            reconcile_interval_secs: get_env_parse_or("RECONCILE_INTERVAL_SECS", 60)?,
            notification_url: get_env_opt("NOTIFICATION_URL"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.gateway_max_attempts == 0 {
            return Err(Error::Config(
                "GATEWAY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        url::Url::parse(&self.paystack_base_url)
            .map_err(|e| Error::Config(format!("Invalid value for PAYSTACK_BASE_URL: {}", e)))?;
        if let Some(callback) = &self.callback_url {
            url::Url::parse(callback).map_err(|e| {
                Error::Config(format!("Invalid value for PAYSTACK_CALLBACK_URL: {}", e))
            })?;
        }
        Ok(())
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn gateway_backoff(&self) -> Duration {
        Duration::from_millis(self.gateway_backoff_ms)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }

    pub fn reconcile_after(&self) -> Duration {
        Duration::from_secs(self.reconcile_after_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env_or(name: &str, default: &str) -> String {
    get_env_opt(name).unwrap_or_else(|| default.to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_opt(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            server_address: "127.0.0.1:0".to_string(),
            database_url: None,
            jwt_secret: "secret".to_string(),
            paystack_secret_key: "sk_test".to_string(),
            paystack_base_url: DEFAULT_PAYSTACK_BASE_URL.to_string(),
            webhook_secret: "sk_test".to_string(),
            callback_url: None,
            default_currency: "KES".to_string(),
            gateway_max_attempts: 3,
            gateway_backoff_ms: 1000,
            gateway_timeout_secs: 15,
            webhook_timeout_ms: 5000,
            reconcile_after_secs: 900,
            reconcile_interval_secs: 0,
            notification_url: None,
        }
    }

    #[test]
    fn rejects_zero_attempts_and_bad_urls() {
        assert!(config().validate().is_ok());

        let mut no_attempts = config();
        no_attempts.gateway_max_attempts = 0;
        assert!(matches!(no_attempts.validate(), Err(Error::Config(_))));

        let mut bad_callback = config();
        bad_callback.callback_url = Some("not a url".to_string());
        assert!(matches!(bad_callback.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn durations_come_from_raw_values() {
        let config = config();
        assert_eq!(config.gateway_backoff(), Duration::from_secs(1));
        assert_eq!(config.webhook_timeout(), Duration::from_secs(5));
        assert_eq!(config.reconcile_interval(), Duration::from_secs(1));
    }
}
