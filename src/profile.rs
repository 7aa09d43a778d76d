//! Connection profiles.
//!
//! A profile is a JSON file naming the vendor, the strategy, the database
//! config and optional tunnel settings. Environment variables override the
//! stored endpoint and secrets so deployments can inject credentials without
//! writing them to disk.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connector::Connector;
use crate::engine::config::{ConnectionConfig, TunnelSettings};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DatabaseConnection;
use crate::engine::types::{StrategyKind, Vendor};
use crate::factory::ConnectionFactory;

pub const ENV_HOST: &str = "DBCONNECTOR_HOST";
pub const ENV_PORT: &str = "DBCONNECTOR_PORT";
pub const ENV_USERNAME: &str = "DBCONNECTOR_USERNAME";
pub const ENV_PASSWORD: &str = "DBCONNECTOR_PASSWORD";
pub const ENV_DATABASE: &str = "DBCONNECTOR_DATABASE";
pub const ENV_SSH_PASSWORD: &str = "DBCONNECTOR_SSH_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub vendor: Vendor,
    #[serde(default)]
    pub strategy: StrategyKind,
    pub database: ConnectionConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelSettings>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl ConnectionProfile {
    pub fn new(vendor: Vendor, strategy: StrategyKind, database: ConnectionConfig) -> Self {
        Self {
            vendor,
            strategy,
            database,
            tunnel: None,
        }
    }

    pub fn with_tunnel(mut self, tunnel: TunnelSettings) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    pub fn from_json(raw: &str) -> EngineResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| EngineError::configuration(format!("Invalid connection profile: {}", e)))
    }

    /// Reads the profile at `path` and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            EngineError::configuration(format!(
                "Failed to read connection profile {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut profile = Self::from_json(&raw)?;
        profile.apply_env_overrides()?;
        debug!(path = %path.display(), vendor = %profile.vendor, strategy = %profile.strategy, "Loaded connection profile");
        Ok(profile)
    }

    /// Writes the profile as pretty JSON. Passwords are never written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::configuration(format!("Failed to create profile directory: {}", e))
            })?;
        }

        let payload = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::configuration(format!("Save failed: {}", e)))?;
        fs::write(path, payload)
            .map_err(|e| EngineError::configuration(format!("Save failed: {}", e)))?;
        Ok(())
    }

    /// Applies the `DBCONNECTOR_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> EngineResult<()> {
        self.apply_overrides(env_string)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> EngineResult<()> {
        if let Some(host) = lookup(ENV_HOST) {
            self.database.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.database.port = port.trim().parse().map_err(|_| {
                EngineError::configuration(format!("{} must be a port number, got {:?}", ENV_PORT, port))
            })?;
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            self.database.username = username;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.database.password = password;
        }
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database.database = database;
        }
        if let Some(ssh_password) = lookup(ENV_SSH_PASSWORD) {
            if self.strategy == StrategyKind::SshTunnel || self.tunnel.is_some() {
                self.tunnel.get_or_insert_with(TunnelSettings::default).ssh_password =
                    Some(ssh_password);
            } else {
                debug!("Ignoring {} for a profile without a tunnel", ENV_SSH_PASSWORD);
            }
        }
        Ok(())
    }

    pub fn into_connection(self, factory: &ConnectionFactory) -> EngineResult<Box<dyn DatabaseConnection>> {
        factory.create_connection(self.vendor, self.strategy, self.database, self.tunnel)
    }

    pub fn into_connector(self, factory: &ConnectionFactory) -> EngineResult<Connector> {
        self.into_connection(factory).map(Connector::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const PROFILE: &str = r#"{
        "vendor": "postgresql",
        "strategy": "ssh_tunnel",
        "database": {
            "host": "db.internal",
            "port": 5432,
            "username": "app",
            "database": "orders",
            "options": { "ssl": true, "application_name": "reports", "connect_timeout": 5 }
        },
        "tunnel": {
            "ssh_host": "bastion.example.com",
            "ssh_port": 22,
            "ssh_username": "deploy"
        }
    }"#;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn parses_profile_json() {
        let profile = ConnectionProfile::from_json(PROFILE).expect("profile");

        assert_eq!(profile.vendor, Vendor::Postgres);
        assert_eq!(profile.strategy, StrategyKind::SshTunnel);
        assert_eq!(profile.database.password, "");
        assert_eq!(
            profile.database.connection_options().get("application_name"),
            Some(&"reports".into())
        );
        assert_eq!(
            profile.tunnel.as_ref().and_then(|t| t.ssh_host.as_deref()),
            Some("bastion.example.com")
        );
    }

    #[test]
    fn strategy_defaults_to_direct() {
        let profile = ConnectionProfile::from_json(
            r#"{"vendor": "mysql", "database": {"host": "h", "port": 3306, "username": "u", "database": "d"}}"#,
        )
        .expect("profile");
        assert_eq!(profile.strategy, StrategyKind::Direct);
        assert!(profile.tunnel.is_none());
    }

    #[test]
    fn env_overrides_endpoint_and_secrets() {
        let mut profile = ConnectionProfile::from_json(PROFILE).expect("profile");
        profile
            .apply_overrides(lookup(&[
                (ENV_HOST, "db.replica"),
                (ENV_PORT, "6432"),
                (ENV_PASSWORD, "s3cret"),
                (ENV_SSH_PASSWORD, "hunter2"),
            ]))
            .expect("overrides");

        assert_eq!(profile.database.host, "db.replica");
        assert_eq!(profile.database.port, 6432);
        assert_eq!(profile.database.password, "s3cret");
        assert_eq!(profile.database.username, "app");
        assert_eq!(
            profile.tunnel.as_ref().and_then(|t| t.ssh_password.as_deref()),
            Some("hunter2")
        );
    }

    #[test]
    fn bad_port_override_is_a_configuration_error() {
        let mut profile = ConnectionProfile::from_json(PROFILE).expect("profile");
        let err = profile
            .apply_overrides(lookup(&[(ENV_PORT, "fifty")]))
            .expect_err("bad port");
        assert!(err.is_configuration());
    }

    #[test]
    fn unknown_vendor_is_rejected() {
        let err = ConnectionProfile::from_json(
            r#"{"vendor": "db2", "database": {"host": "h", "port": 1, "username": "u", "database": "d"}}"#,
        )
        .expect_err("unknown vendor");
        assert!(err.is_configuration());
    }

    #[test]
    fn save_never_writes_passwords() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("profiles").join("orders.json");
        let profile = ConnectionProfile::new(
            Vendor::Postgres,
            StrategyKind::Remote,
            ConnectionConfig::new("db", 5432, "app", "s3cret", "orders"),
        )
        .with_tunnel(TunnelSettings {
            ssh_password: Some("hunter2".into()),
            ..TunnelSettings::default()
        });

        profile.save_to_file(&path).expect("save");
        let raw = fs::read_to_string(&path).expect("read back");
        assert!(!raw.contains("s3cret"));
        assert!(!raw.contains("hunter2"));

        let loaded = ConnectionProfile::from_json(&raw).expect("reload");
        assert_eq!(loaded.strategy, StrategyKind::Remote);
        assert_eq!(loaded.database.host, "db");
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ConnectionProfile::load(dir.path().join("absent.json")).expect_err("missing");
        assert!(err.is_configuration());
    }

    #[test]
    fn tunnel_profile_without_auth_fails_in_the_factory() {
        let profile = ConnectionProfile::from_json(PROFILE).expect("profile");
        let err = profile
            .into_connection(&ConnectionFactory::new())
            .err()
            .expect("no ssh auth");
        assert!(err.is_configuration());
    }
}
