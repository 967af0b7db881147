use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Startup configuration errors. These are the only errors allowed to stop the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Secret and lifetime for one kind of signed token.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub duration: chrono::Duration,
}

/// Outgoing mail relay. Without `SMTP_HOST` mail is only logged.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub db_timeout: Duration,
    pub server_port: u16,
    pub server_host: String,
    pub access_token: TokenSettings,
    pub refresh_token: Option<TokenSettings>,
    pub bcrypt_cost: u32,
    pub cookie_secure: bool,
    pub mail_from: String,
    pub smtp: Option<SmtpSettings>,
    pub app_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_secret = required("JWT_ACCESS_SECRET")?;
        let refresh_token = match env::var("JWT_REFRESH_SECRET") {
            Ok(secret) if !secret.is_empty() => Some(TokenSettings {
                secret,
                duration: duration_secs("JWT_REFRESH_DURATION_SECS", 60 * 60 * 24 * 30)?,
            }),
            _ => None,
        };
        let smtp = match env::var("SMTP_HOST") {
            Ok(host) if !host.trim().is_empty() => Some(SmtpSettings {
                host,
                port: parsed("SMTP_PORT", 587)?,
                username: required("SMTP_USERNAME")?,
                password: required("SMTP_PASSWORD")?,
            }),
            _ => None,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            db_timeout: Duration::from_millis(parsed("DB_TIMEOUT_MS", 3000)?),
            server_port: parsed("SERVER_PORT", 8080)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            access_token: TokenSettings {
                secret: access_secret,
                duration: duration_secs("JWT_ACCESS_DURATION_SECS", 60 * 60 * 24)?,
            },
            refresh_token,
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            cookie_secure: parsed("COOKIE_SECURE", false)?,
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "Novelism <no-reply@novelism.local>".to_string()),
            smtp,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// A positive number of seconds that fits a `chrono::Duration`.
fn duration_secs(name: &'static str, default: i64) -> Result<chrono::Duration, ConfigError> {
    let secs = parsed(name, default)?;
    match chrono::Duration::try_seconds(secs) {
        Some(duration) if secs > 0 => Ok(duration),
        _ => Err(ConfigError::Invalid {
            name,
            value: secs.to_string(),
        }),
    }
}
