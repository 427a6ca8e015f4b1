use anyhow::{bail, Result};
use std::path::Path;
use tokio::fs;

use crate::config::settings::ServiceConfig;

/// Load and validate config from a YAML file.
pub async fn run(config_path: &str) -> Result<ServiceConfig> {
    let raw = fs::read_to_string(Path::new(config_path)).await?;
    let mut config: ServiceConfig = serde_yaml::from_str(&raw)?;

    // Apply defaults / env fallbacks
    if config.encryption.secret_key.is_none() {
        config.encryption.secret_key = std::env::var("TOKEN_KEEPER_SECRET_KEY").ok();
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &ServiceConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    if config.provider.app_id.trim().is_empty() {
        errors.push("provider.app_id must not be empty".to_string());
    }
    if config.provider.app_secret.trim().is_empty() {
        errors.push("provider.app_secret must not be empty".to_string());
    }
    if config.provider.redirect_uri.trim().is_empty() {
        errors.push("provider.redirect_uri must not be empty".to_string());
    }
    if config.store.path.trim().is_empty() {
        errors.push("store.path must not be empty".to_string());
    }
    if config
        .encryption
        .secret_key
        .as_deref()
        .map(|k| k.trim().len() < 8)
        .unwrap_or(true)
    {
        errors.push(
            "encryption.secret_key (or TOKEN_KEEPER_SECRET_KEY) must be set, at least 8 characters"
                .to_string(),
        );
    }
    if config.internal_api_key.trim().is_empty() {
        errors.push("internal_api_key must not be empty".to_string());
    }
    if config.refresh.safety_margin_days() < 1 {
        errors.push("refresh.safety_margin_days must be >= 1".to_string());
    }
    if config.refresh.within_hours() == 0 {
        errors.push("refresh.within_hours must be > 0".to_string());
    }
    if config.server.port.parse::<u16>().is_err() {
        errors.push(format!("server.port '{}' is not a valid port", config.server.port));
    }

    if !errors.is_empty() {
        bail!("invalid config: {}", errors.join("; "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> String {
        r#"
provider:
  app_id: "123"
  app_secret: "shhh"
  redirect_uri: "http://localhost:8080/auth/callback"
store:
  path: "tokens.json"
encryption:
  secret_key: "unit-test-secret"
server:
  host: "127.0.0.1"
  port: "8080"
internal_api_key: "internal-key"
"#
        .to_string()
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: ServiceConfig = serde_yaml::from_str(&minimal_yaml()).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.provider.api_version, "v22.0");
        assert_eq!(config.refresh.safety_margin_days(), 3);
        assert_eq!(config.refresh.within_hours(), 24);
        assert!(!config.metrics.is_enabled);
        assert_eq!(config.metrics.path, "/metrics");
        assert!(!config.provider.default_scopes.is_empty());
    }

    #[test]
    fn validation_aggregates_errors() {
        let yaml = minimal_yaml()
            .replace("\"123\"", "\"\"")
            .replace("\"8080\"", "\"not-a-port\"");
        let config: ServiceConfig = serde_yaml::from_str(&yaml).unwrap();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("app_id"));
        assert!(err.contains("port"));
    }

    #[test]
    fn short_secret_key_is_rejected() {
        let yaml = minimal_yaml().replace("unit-test-secret", "short");
        let config: ServiceConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(validate(&config).is_err());
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn secret_key_falls_back_to_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let yaml = minimal_yaml().replace("secret_key: \"unit-test-secret\"", "secret_key: null");
        std::fs::write(&path, yaml).unwrap();

        std::env::set_var("TOKEN_KEEPER_SECRET_KEY", "env-provided-secret");
        let config = run(path.to_str().unwrap()).await.unwrap();
        std::env::remove_var("TOKEN_KEEPER_SECRET_KEY");

        assert_eq!(config.encryption.secret_key.as_deref(), Some("env-provided-secret"));
    }
}
