use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;

use streamhub_api::parse_duration;
use streamhub_media::CloudinaryConfig;
use streamhub_media::cloudinary::DEFAULT_BASE_URL;

/// Values that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub cors_origin: String,
    pub email_domain: String,
    pub access_secret: String,
    pub access_ttl: TimeDelta,
    pub refresh_secret: String,
    pub refresh_ttl: TimeDelta,
    pub cloudinary: CloudinaryConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset and empty values fall
    /// back to defaults; required values without one are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| get(key).with_context(|| format!("{} must be set", key));

        let port = or("STREAMHUB_PORT", "8000")
            .parse()
            .context("STREAMHUB_PORT must be a port number")?;

        let access_secret = or("ACCESS_TOKEN_SECRET", "");
        let refresh_secret = or("REFRESH_TOKEN_SECRET", "");
        check_secrets(&access_secret, &refresh_secret)?;

        let access_ttl = parse_duration(&or("ACCESS_TOKEN_EXPIRY", "1d"))
            .context("ACCESS_TOKEN_EXPIRY is invalid")?;
        let refresh_ttl = parse_duration(&or("REFRESH_TOKEN_EXPIRY", "10d"))
            .context("REFRESH_TOKEN_EXPIRY is invalid")?;

        let cloudinary = CloudinaryConfig {
            cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
            api_key: required("CLOUDINARY_API_KEY")?,
            api_secret: required("CLOUDINARY_API_SECRET")?,
            base_url: or("CLOUDINARY_BASE_URL", DEFAULT_BASE_URL),
        };

        Ok(Self {
            host: or("STREAMHUB_HOST", "0.0.0.0"),
            port,
            db_path: or("STREAMHUB_DB_PATH", "streamhub.db").into(),
            upload_dir: or("STREAMHUB_UPLOAD_DIR", "./public/temp").into(),
            cors_origin: or("STREAMHUB_CORS_ORIGIN", "http://localhost:5173"),
            email_domain: or("STREAMHUB_EMAIL_DOMAIN", "gmail.com").to_lowercase(),
            access_secret,
            access_ttl,
            refresh_secret,
            refresh_ttl,
            cloudinary,
        })
    }
}

/// Refuse to start with missing, placeholder or shared signing secrets.
pub fn check_secrets(access: &str, refresh: &str) -> Result<()> {
    for (name, secret) in [("ACCESS_TOKEN_SECRET", access), ("REFRESH_TOKEN_SECRET", refresh)] {
        if secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret) {
            bail!("{} is unset or still a placeholder", name);
        }
    }
    if access == refresh {
        bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("ACCESS_TOKEN_SECRET", "a-long-access-secret"),
            ("REFRESH_TOKEN_SECRET", "a-long-refresh-secret"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_API_SECRET", "shh"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config> {
        Config::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_path, PathBuf::from("streamhub.db"));
        assert_eq!(config.upload_dir, PathBuf::from("./public/temp"));
        assert_eq!(config.cors_origin, "http://localhost:5173");
        assert_eq!(config.email_domain, "gmail.com");
        assert_eq!(config.access_ttl, TimeDelta::days(1));
        assert_eq!(config.refresh_ttl, TimeDelta::days(10));
        assert_eq!(config.cloudinary.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn overrides_are_read() {
        let mut env = base_env();
        env.insert("STREAMHUB_PORT", "9100");
        env.insert("ACCESS_TOKEN_EXPIRY", "15m");
        env.insert("STREAMHUB_EMAIL_DOMAIN", "Example.ORG");
        let config = load(&env).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.access_ttl, TimeDelta::minutes(15));
        assert_eq!(config.email_domain, "example.org");
    }

    #[test]
    fn bad_values_are_errors() {
        let mut env = base_env();
        env.insert("STREAMHUB_PORT", "eighty");
        assert!(load(&env).is_err());

        let mut env = base_env();
        env.insert("REFRESH_TOKEN_EXPIRY", "10y");
        assert!(load(&env).is_err());

        let mut env = base_env();
        env.remove("CLOUDINARY_API_SECRET");
        assert!(load(&env).is_err());
    }

    #[test]
    fn secrets_must_be_real_and_distinct() {
        assert!(check_secrets("", "refresh-secret").is_err());
        assert!(check_secrets("dev-secret-change-me", "refresh-secret").is_err());
        assert!(check_secrets("same-secret", "same-secret").is_err());
        assert!(check_secrets("access-secret", "refresh-secret").is_ok());
    }
}
