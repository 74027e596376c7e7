use anyhow::{anyhow, bail, Context, Result};
use nfe_core::models::{DocumentModel, Environment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const APP_NAME: &str = "nfe-issuer";
const KEYCHAIN_SERVICE: &str = "br.nfe-issuer.credentials";

/// Secret names, looked up as `NFE_<NAME>` in the environment first and
/// then in the OS keychain.
pub const API_KEY: &str = "api_key";
pub const CLIENT_SECRET: &str = "client_secret";
pub const JWT_SECRET: &str = "jwt_secret";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    /// Where the invoice database and audit log live. Defaults to the
    /// directory holding the configuration file.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub defaults: DocumentDefaults,
    #[serde(default)]
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Mock,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    /// OAuth2 client id. Without it the API key secret is used.
    pub client_id: Option<String>,
    pub token_url: Option<String>,
    pub scope: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Mock,
            base_url: None,
            client_id: None,
            token_url: None,
            scope: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Values used when a request body leaves them out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDefaults {
    #[serde(default)]
    pub model: DocumentModel,
    #[serde(default = "default_series")]
    pub series: u32,
    #[serde(default = "default_nature")]
    pub nature_of_operation: String,
}

impl Default for DocumentDefaults {
    fn default() -> Self {
        Self {
            model: DocumentModel::Nfe,
            series: default_series(),
            nature_of_operation: default_nature(),
        }
    }
}

fn default_series() -> u32 {
    1
}

fn default_nature() -> String {
    "VENDA".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    #[default]
    Static,
    Jwt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub kind: IdentityKind,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Token to subject table for `static` mode.
    #[serde(default = "default_static_tokens")]
    pub tokens: BTreeMap<String, String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            kind: IdentityKind::Static,
            issuer: None,
            audience: None,
            tokens: default_static_tokens(),
        }
    }
}

fn default_static_tokens() -> BTreeMap<String, String> {
    BTreeMap::from([("local-dev-token".to_string(), "local".to_string())])
}

impl AppConfig {
    /// Update one setting addressed by a dotted key, e.g. `provider.kind`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |v: &str| {
            let v = v.trim();
            (!v.is_empty()).then(|| v.to_string())
        };
        match key {
            "provider.kind" => self.provider.kind = parse_enum(key, value)?,
            "provider.base_url" => self.provider.base_url = optional(value),
            "provider.client_id" => self.provider.client_id = optional(value),
            "provider.token_url" => self.provider.token_url = optional(value),
            "provider.scope" => self.provider.scope = optional(value),
            "provider.timeout_secs" => {
                self.provider.timeout_secs = value
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a number of seconds"))?
            }
            "environment" => self.environment = parse_enum(key, value)?,
            "defaults.model" => self.defaults.model = parse_enum(key, value)?,
            "defaults.series" => {
                self.defaults.series = value
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a number"))?
            }
            "defaults.nature_of_operation" => {
                self.defaults.nature_of_operation = value.trim().to_string()
            }
            "data_dir" => self.data_dir = optional(value).map(PathBuf::from),
            "identity.kind" => self.identity.kind = parse_enum(key, value)?,
            "identity.issuer" => self.identity.issuer = optional(value),
            "identity.audience" => self.identity.audience = optional(value),
            other => bail!("unknown setting {other}"),
        }
        Ok(())
    }

    /// Configured data directory, or the configuration file's directory.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let file = confy::get_configuration_file_path(APP_NAME, None)
            .context("Failed to locate configuration directory")?;
        file.parent()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| anyhow!("configuration path has no parent directory"))
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_ascii_lowercase()))
        .with_context(|| format!("invalid value {value:?} for {key}"))
}

pub fn load() -> Result<AppConfig> {
    let cfg: AppConfig = confy::load(APP_NAME, None).context("Failed to load app config")?;
    Ok(cfg)
}

pub fn store(cfg: &AppConfig) -> Result<()> {
    confy::store(APP_NAME, None, cfg).context("Failed to store app config")?;
    Ok(())
}

fn env_var_name(key: &str) -> String {
    format!("NFE_{}", key.to_ascii_uppercase())
}

/// Store a secret in the OS keychain
pub fn store_secret(key: &str, value: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    entry.set_password(value)?;
    Ok(())
}

/// Retrieve a secret from the OS keychain
pub fn get_secret(key: &str) -> Result<String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    let password = entry.get_password()?;
    Ok(password)
}

/// Delete a secret from the OS keychain
pub fn delete_secret(key: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    entry.delete_password()?;
    Ok(())
}

/// Environment variable first, keychain second.
pub fn resolve_secret(key: &str) -> Result<String> {
    if let Ok(value) = std::env::var(env_var_name(key)) {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }
    get_secret(key).with_context(|| {
        format!(
            "secret {key} not found; set {} or store it in the keychain",
            env_var_name(key)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_mock_provider_and_sandbox() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.provider.kind, ProviderKind::Mock);
        assert_eq!(cfg.provider.timeout_secs, 30);
        assert_eq!(cfg.environment, Environment::Sandbox);
        assert_eq!(cfg.defaults.series, 1);
        assert_eq!(cfg.identity.kind, IdentityKind::Static);
    }

    #[test]
    fn partial_file_fills_missing_sections() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"provider": {"kind": "http", "base_url": "https://api"}}"#)
                .unwrap();
        assert_eq!(cfg.provider.kind, ProviderKind::Http);
        assert_eq!(cfg.provider.timeout_secs, 30);
        assert_eq!(cfg.defaults, DocumentDefaults::default());
    }

    #[test]
    fn set_updates_dotted_keys() {
        let mut cfg = AppConfig::default();
        cfg.set("provider.kind", "HTTP").unwrap();
        cfg.set("provider.base_url", "https://api.sandbox.example").unwrap();
        cfg.set("environment", "production").unwrap();
        cfg.set("defaults.model", "nfce").unwrap();
        cfg.set("defaults.series", "2").unwrap();
        cfg.set("identity.issuer", " ").unwrap();

        assert_eq!(cfg.provider.kind, ProviderKind::Http);
        assert_eq!(cfg.provider.base_url.as_deref(), Some("https://api.sandbox.example"));
        assert_eq!(cfg.environment, Environment::Production);
        assert_eq!(cfg.defaults.model, DocumentModel::Nfce);
        assert_eq!(cfg.defaults.series, 2);
        assert_eq!(cfg.identity.issuer, None);
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_values() {
        let mut cfg = AppConfig::default();
        assert!(cfg.set("provider.colour", "blue").is_err());
        assert!(cfg.set("environment", "staging").is_err());
        assert!(cfg.set("defaults.series", "one").is_err());
    }

    #[test]
    fn configured_data_dir_wins() {
        let cfg = AppConfig {
            data_dir: Some(PathBuf::from("/var/lib/nfe")),
            ..Default::default()
        };
        assert_eq!(cfg.resolved_data_dir().unwrap(), PathBuf::from("/var/lib/nfe"));
    }

    #[test]
    fn secrets_prefer_environment() {
        std::env::set_var("NFE_TEST_ONLY_SECRET", "from-env");
        assert_eq!(resolve_secret("test_only_secret").unwrap(), "from-env");
        std::env::remove_var("NFE_TEST_ONLY_SECRET");
    }
}
