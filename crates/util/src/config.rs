use std::{env, fmt, net::SocketAddr};

use super::server_bind_address;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:staff.db?mode=rwc";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_GEOCODER_USER_AGENT: &str = "staff-map/0.1";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub directory_url: String,
    pub directory_api_key: String,
    pub email_domain: String,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
    pub sheet_url: Option<String>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let database_url = var_or("MAP_DATABASE_URL", DEFAULT_DATABASE_URL);
        let directory_url = required_var("DIRECTORY_URL")?;
        let directory_api_key = required_var("DIRECTORY_API_KEY")?;
        let email_domain = required_var("CORP_EMAIL_DOMAIN")?;
        let geocoder_url = var_or("GEOCODER_URL", DEFAULT_GEOCODER_URL);
        let geocoder_user_agent = var_or("GEOCODER_USER_AGENT", DEFAULT_GEOCODER_USER_AGENT);
        let sheet_url = env::var("SHEET_URL").ok().filter(|value| !value.is_empty());

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            directory_url,
            directory_api_key,
            email_domain,
            geocoder_url,
            geocoder_user_agent,
            sheet_url,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingVar(name))
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingVar(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingVar(name) => write!(f, "{name} not found in environment or is empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    static ENV_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    fn set_required_vars() {
        env::set_var("DIRECTORY_URL", "https://tasks.example.com");
        env::set_var("DIRECTORY_API_KEY", "key");
        env::set_var("CORP_EMAIL_DOMAIN", "@example.com");
    }

    fn clear_vars() {
        for name in [
            "APP_ENV",
            "APP_BIND_ADDR",
            "MAP_DATABASE_URL",
            "DIRECTORY_URL",
            "DIRECTORY_API_KEY",
            "CORP_EMAIL_DOMAIN",
            "GEOCODER_URL",
            "GEOCODER_USER_AGENT",
            "SHEET_URL",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_vars();
        set_required_vars();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.geocoder_url, DEFAULT_GEOCODER_URL);
        assert_eq!(config.email_domain, "@example.com");
        assert!(config.sheet_url.is_none());

        clear_vars();
    }

    #[test]
    fn rejects_missing_api_key() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_vars();
        env::set_var("DIRECTORY_URL", "https://tasks.example.com");
        env::set_var("CORP_EMAIL_DOMAIN", "@example.com");

        let err = AppConfig::from_env().expect_err("missing api key should error");
        assert!(matches!(err, ConfigError::MissingVar("DIRECTORY_API_KEY")));

        clear_vars();
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_vars();
        set_required_vars();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_vars();
    }

    #[test]
    fn parses_production_environment_with_overrides() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_vars();
        set_required_vars();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("SHEET_URL", "https://sheets.example.com/export");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(
            config.sheet_url.as_deref(),
            Some("https://sheets.example.com/export")
        );

        clear_vars();
    }
}
