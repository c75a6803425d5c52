//! Service configuration.
//!
//! Loaded from TOML; every field has a default so a partial file (or no file)
//! works. A few deployment settings can be overridden from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sdn_license_auth::{AuthConfig, StreamConfig};

use crate::error::{LicenseError, Result};

pub const ENV_ISSUER: &str = "SDN_LICENSE_ISSUER";
pub const ENV_ADMIN_TOKEN: &str = "SDN_LICENSE_ADMIN_TOKEN";
pub const ENV_PLUGIN_ROOT: &str = "SDN_PLUGIN_ROOT";

pub const SIGNING_KEY_FILE: &str = "token_signing_ed25519.seed";
pub const DATABASE_FILE: &str = "entitlements.db";

/// License service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Node data directory; license state lives under `<data_dir>/license`.
    pub data_dir: PathBuf,
    /// Token issuer.
    pub issuer: String,
    pub challenge_ttl_secs: i64,
    pub token_ttl_secs: i64,
    pub clock_skew_secs: i64,
    /// Tolerance applied when verifying tokens.
    pub verify_leeway_secs: i64,
    pub max_pending_challenges: usize,
    pub max_request_bytes: usize,
    pub read_timeout_secs: u64,
    /// Defaults to `<data_dir>/license/plugins`.
    pub plugin_root: Option<PathBuf>,
    /// X25519 key used to decrypt inventory bundles.
    pub node_x25519_key_path: Option<PathBuf>,
    /// Empty disables the admin endpoints.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub admin_token: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        let auth = AuthConfig::default();
        let stream = StreamConfig::default();
        Self {
            data_dir: PathBuf::from("data"),
            issuer: auth.issuer,
            challenge_ttl_secs: auth.challenge_ttl_secs,
            token_ttl_secs: auth.token_ttl_secs,
            clock_skew_secs: auth.clock_skew_secs,
            verify_leeway_secs: sdn_license_core::DEFAULT_VERIFY_LEEWAY_SECS,
            max_pending_challenges: auth.max_pending,
            max_request_bytes: stream.max_request_bytes,
            read_timeout_secs: stream.read_timeout.as_secs(),
            plugin_root: None,
            node_x25519_key_path: None,
            admin_token: String::new(),
        }
    }
}

impl LicenseConfig {
    /// Parse TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: LicenseConfig = toml::from_str(contents)
            .map_err(|e| LicenseError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            LicenseError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(issuer) = get(ENV_ISSUER) {
            self.issuer = issuer;
        }
        if let Some(token) = get(ENV_ADMIN_TOKEN) {
            self.admin_token = token;
        }
        if let Some(root) = get(ENV_PLUGIN_ROOT) {
            self.plugin_root = Some(PathBuf::from(root));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.issuer.trim().is_empty() {
            return Err(LicenseError::Config("issuer must not be empty".into()));
        }
        let positive = [
            ("challenge_ttl_secs", self.challenge_ttl_secs),
            ("token_ttl_secs", self.token_ttl_secs),
            ("clock_skew_secs", self.clock_skew_secs),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(LicenseError::Config(format!("{} must be positive", name)));
            }
        }
        if self.max_pending_challenges == 0 || self.max_request_bytes == 0 {
            return Err(LicenseError::Config(
                "max_pending_challenges and max_request_bytes must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// `<data_dir>/license`
    pub fn license_dir(&self) -> PathBuf {
        self.data_dir.join("license")
    }

    pub fn plugin_root(&self) -> PathBuf {
        self.plugin_root
            .clone()
            .unwrap_or_else(|| self.license_dir().join("plugins"))
    }

    pub fn signing_key_path(&self) -> PathBuf {
        self.license_dir().join(SIGNING_KEY_FILE)
    }

    pub fn database_path(&self) -> PathBuf {
        self.license_dir().join(DATABASE_FILE)
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            issuer: self.issuer.trim().to_string(),
            challenge_ttl_secs: self.challenge_ttl_secs,
            token_ttl_secs: self.token_ttl_secs,
            clock_skew_secs: self.clock_skew_secs,
            max_pending: self.max_pending_challenges,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            max_request_bytes: self.max_request_bytes,
            read_timeout: Duration::from_secs(self.read_timeout_secs.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = LicenseConfig::default();
        assert_eq!(config.issuer, "sdn-license");
        assert_eq!(config.challenge_ttl_secs, 60);
        assert_eq!(config.token_ttl_secs, 900);
        assert_eq!(config.clock_skew_secs, 120);
        assert_eq!(config.verify_leeway_secs, 30);
        assert_eq!(config.max_pending_challenges, 10_000);
        assert_eq!(config.max_request_bytes, 64 * 1024);
        assert_eq!(config.read_timeout_secs, 10);
        assert_eq!(config.plugin_root(), PathBuf::from("data/license/plugins"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = LicenseConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/sdn"
            token_ttl_secs = 300
            "#,
        )
        .unwrap();
        assert_eq!(config.token_ttl_secs, 300);
        assert_eq!(config.challenge_ttl_secs, 60);
        assert_eq!(config.signing_key_path(), PathBuf::from("/var/lib/sdn/license/token_signing_ed25519.seed"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(LicenseConfig::from_toml_str("token_ttl_secs = \"soon\"").is_err());
        assert!(LicenseConfig::from_toml_str("token_ttl_secs = 0").is_err());
        assert!(LicenseConfig::from_toml_str("issuer = \" \"").is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ISSUER, "node-7"),
            (ENV_ADMIN_TOKEN, "  "),
            (ENV_PLUGIN_ROOT, "/opt/plugins"),
        ]
        .into_iter()
        .collect();

        let mut config = LicenseConfig::default();
        config.admin_token = "keep".into();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.issuer, "node-7");
        assert_eq!(config.admin_token, "keep");
        assert_eq!(config.plugin_root(), PathBuf::from("/opt/plugins"));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("license.toml");
        std::fs::write(&path, "issuer = \"from-file\"\n").unwrap();
        let config = LicenseConfig::load_from_path(&path).unwrap();
        assert!(!config.issuer.is_empty());
        assert!(LicenseConfig::load_from_path(&dir.path().join("missing.toml")).is_err());
    }
}
