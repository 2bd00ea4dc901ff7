use serde::Deserialize;
use std::{env, fs, path::Path};
use taskify_shared::domain::RejectionReentry;

const DEFAULT_EMAIL_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HS256 secret shared with the credential service.
    pub jwt_secret: String,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
    pub email_token_ttl_hours: Option<i64>,
    /// Where a rejected task lands when reopened.
    #[serde(default)]
    pub rejection_reentry: RejectionReentry,
    /// Period of the stale token sweep; unset disables it.
    pub token_sweep_minutes: Option<u64>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Invalid(m) => write!(f, "invalid config: {}", m),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().len() < 16 {
            return Err(ConfigError::Invalid(
                "jwt_secret must be at least 16 characters".into(),
            ));
        }
        if let Some(h) = self.email_token_ttl_hours
            && h <= 0
        {
            return Err(ConfigError::Invalid(
                "email_token_ttl_hours must be positive".into(),
            ));
        }
        if self.token_sweep_minutes == Some(0) {
            return Err(ConfigError::Invalid(
                "token_sweep_minutes must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn email_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(
            self.email_token_ttl_hours
                .unwrap_or(DEFAULT_EMAIL_TOKEN_TTL_HOURS),
        )
    }

    pub fn token_sweep_interval(&self) -> Option<std::time::Duration> {
        self.token_sweep_minutes
            .map(|m| std::time::Duration::from_secs(m * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = AppConfig::from_yaml("jwt_secret: 0123456789abcdef0123\n").unwrap();
        assert_eq!(cfg.rejection_reentry, RejectionReentry::InProgress);
        assert_eq!(cfg.email_token_ttl(), chrono::Duration::hours(24));
        assert!(cfg.token_sweep_interval().is_none());
        assert!(cfg.listen_port.is_none());
    }

    #[test]
    fn full_config_is_parsed() {
        let yaml = r#"
jwt_secret: "0123456789abcdef0123"
listen_port: 8088
dev_cors_origin: "http://localhost:5173"
email_token_ttl_hours: 2
rejection_reentry: pending
token_sweep_minutes: 15
"#;
        let cfg = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.listen_port, Some(8088));
        assert_eq!(cfg.rejection_reentry, RejectionReentry::Pending);
        assert_eq!(cfg.email_token_ttl(), chrono::Duration::hours(2));
        assert_eq!(
            cfg.token_sweep_interval(),
            Some(std::time::Duration::from_secs(900))
        );
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = AppConfig::from_yaml("jwt_secret: short\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_reentry_state_is_a_yaml_error() {
        let err = AppConfig::from_yaml("jwt_secret: 0123456789abcdef0123\nrejection_reentry: verified\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
