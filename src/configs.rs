use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub key_material: KeyMaterialConfig,
    #[serde(default)]
    pub ca_defaults: CaDefaults,
    #[serde(default)]
    pub server_cert_defaults: ServerCertDefaults,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8443
}

/// Filesystem locations checked by the file-based key material source.
///
/// The environment source takes priority over these; see
/// [`crate::key_material`].
#[derive(Debug, Deserialize, Clone)]
pub struct KeyMaterialConfig {
    #[serde(default = "default_private_key_path")]
    pub private_key_path: PathBuf,
    #[serde(default = "default_certificate_path")]
    pub certificate_path: PathBuf,
    #[serde(default = "default_ca_certificate_path")]
    pub ca_certificate_path: PathBuf,
}

impl Default for KeyMaterialConfig {
    fn default() -> Self {
        Self {
            private_key_path: default_private_key_path(),
            certificate_path: default_certificate_path(),
            ca_certificate_path: default_ca_certificate_path(),
        }
    }
}

fn default_private_key_path() -> PathBuf {
    PathBuf::from("server-key.pem")
}

fn default_certificate_path() -> PathBuf {
    PathBuf::from("server-cert.pem")
}

fn default_ca_certificate_path() -> PathBuf {
    PathBuf::from("ca-cert.pem")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaDefaults {
    #[serde(default = "default_ca_cn")]
    pub common_name: String,
    #[serde(default = "default_ca_org")]
    pub organization: String,
    #[serde(default = "default_ca_locality")]
    pub locality: String,
    #[serde(default = "default_ca_state")]
    pub state: String,
    #[serde(default = "default_ca_country")]
    pub country: String,
    #[serde(default = "default_ca_validity")]
    pub validity_days: u32,
}

impl Default for CaDefaults {
    fn default() -> Self {
        Self {
            common_name: default_ca_cn(),
            organization: default_ca_org(),
            locality: default_ca_locality(),
            state: default_ca_state(),
            country: default_ca_country(),
            validity_days: default_ca_validity(),
        }
    }
}

fn default_ca_cn() -> String {
    "CipherGate Root CA".to_string()
}

fn default_ca_org() -> String {
    "CipherGate Labs".to_string()
}

fn default_ca_locality() -> String {
    "Toronto".to_string()
}

fn default_ca_state() -> String {
    "Ontario".to_string()
}

fn default_ca_country() -> String {
    "CA".to_string()
}

fn default_ca_validity() -> u32 {
    3650 // 10 years
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerCertDefaults {
    #[serde(default = "default_server_cert_cn")]
    pub common_name: String,
    #[serde(default = "default_server_cert_validity")]
    pub validity_days: u32,
}

impl Default for ServerCertDefaults {
    fn default() -> Self {
        Self {
            common_name: default_server_cert_cn(),
            validity_days: default_server_cert_validity(),
        }
    }
}

fn default_server_cert_cn() -> String {
    "localhost".to_string()
}

fn default_server_cert_validity() -> u32 {
    365 // 1 year
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config_str =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;

        let config: AppConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration from the default path (config.toml), falling back
    /// to built-in defaults when no config file exists.
    pub fn load() -> Result<Self> {
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_sections() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8443);
        assert_eq!(
            config.key_material.private_key_path,
            PathBuf::from("server-key.pem")
        );
        assert_eq!(config.ca_defaults.validity_days, 3650);
        assert_eq!(config.server_cert_defaults.common_name, "localhost");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.ca_defaults.common_name, "CipherGate Root CA");
    }
}
