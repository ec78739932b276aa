//! Device configuration.
//!
//! All values are compiled in. The access point settings can be replaced by
//! a JSON document persisted in the key-value store (see
//! [`crate::startup::load_ap_override`]).

use serde::{Deserialize, Serialize};

use crate::error::NetError;

/// Key-value namespace holding persisted device settings.
pub const SETTINGS_NAMESPACE: &str = "softap";

/// Key of the persisted access point override inside [`SETTINGS_NAMESPACE`].
pub const AP_OVERRIDE_KEY: &str = "ap";

/// Everything the bootstrap needs, grouped per collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub mount: MountConfig,
    pub ap: ApConfig,
    pub http: HttpConfig,
}

/// Filesystem partition mount parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Mount point; also the content root of the static file server.
    pub base_path: String,

    /// Partition label. `None` picks the first partition of the right type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_label: Option<String>,

    /// Maximum number of files open at the same time.
    pub max_files: usize,

    /// Format the partition if mounting fails.
    pub format_if_mount_failed: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            base_path: "/spiffs".to_string(),
            partition_label: None,
            max_files: 5,
            format_if_mount_failed: false,
        }
    }
}

/// Authentication mode of the access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa3Psk,
    Wpa2Wpa3Psk,
}

impl AuthMode {
    pub fn requires_password(self) -> bool {
        !matches!(self, AuthMode::Open)
    }
}

/// Access point settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApConfig {
    pub ssid: String,
    pub password: String,

    /// Radio channel; 0 lets the driver choose.
    #[serde(default)]
    pub channel: u8,

    pub auth: AuthMode,

    #[serde(default)]
    pub ssid_hidden: bool,

    pub max_connections: u16,

    /// Beacon interval in time units (1 TU = 1024 us).
    #[serde(default = "default_beacon_interval")]
    pub beacon_interval: u16,
}

fn default_beacon_interval() -> u16 {
    100
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            ssid: "charmender".to_string(),
            password: "charmender".to_string(),
            channel: 0,
            auth: AuthMode::WpaPsk,
            ssid_hidden: false,
            max_connections: 4,
            beacon_interval: default_beacon_interval(),
        }
    }
}

impl ApConfig {
    pub const MAX_SSID_LEN: usize = 32;
    pub const MIN_PASSWORD_LEN: usize = 8;
    pub const MAX_PASSWORD_LEN: usize = 64;
    pub const MAX_CONNECTIONS: u16 = 10;

    /// Parse a persisted override.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check the limits enforced by the wifi driver.
    pub fn validate(&self) -> Result<(), NetError> {
        if self.ssid.is_empty() || self.ssid.len() > Self::MAX_SSID_LEN {
            return Err(NetError::InvalidConfig(format!(
                "ssid must be 1..={} bytes, got {}",
                Self::MAX_SSID_LEN,
                self.ssid.len()
            )));
        }

        if self.auth.requires_password() {
            let len = self.password.len();
            if !(Self::MIN_PASSWORD_LEN..=Self::MAX_PASSWORD_LEN).contains(&len) {
                return Err(NetError::InvalidConfig(format!(
                    "password for {:?} must be {}..={} bytes, got {}",
                    self.auth,
                    Self::MIN_PASSWORD_LEN,
                    Self::MAX_PASSWORD_LEN,
                    len
                )));
            }
        } else if !self.password.is_empty() {
            return Err(NetError::InvalidConfig(
                "open network must not have a password".to_string(),
            ));
        }

        if self.max_connections == 0 || self.max_connections > Self::MAX_CONNECTIONS {
            return Err(NetError::InvalidConfig(format!(
                "max_connections must be 1..={}, got {}",
                Self::MAX_CONNECTIONS,
                self.max_connections
            )));
        }

        Ok(())
    }
}

/// HTTP transport settings. Defaults mirror the ESP-IDF server defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub port: u16,

    /// URI template the static file handler is registered under.
    pub handler_pattern: String,

    pub max_open_sockets: u16,

    /// Stack size of the server task, in bytes.
    pub stack_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 80,
            handler_pattern: "/*".to_string(),
            max_open_sockets: 7,
            stack_size: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_firmware() {
        let config = DeviceConfig::default();

        assert_eq!(config.mount.base_path, "/spiffs");
        assert_eq!(config.mount.max_files, 5);
        assert!(!config.mount.format_if_mount_failed);
        assert_eq!(config.ap.ssid, "charmender");
        assert_eq!(config.ap.auth, AuthMode::WpaPsk);
        assert_eq!(config.ap.max_connections, 4);
        assert_eq!(config.http.handler_pattern, "/*");
        assert!(config.ap.validate().is_ok());
    }

    #[test]
    fn test_validate_ssid() {
        let mut ap = ApConfig::default();
        ap.ssid = String::new();
        assert!(ap.validate().is_err());

        ap.ssid = "x".repeat(33);
        assert!(ap.validate().is_err());

        ap.ssid = "x".repeat(32);
        assert!(ap.validate().is_ok());
    }

    #[test]
    fn test_validate_password() {
        let mut ap = ApConfig::default();
        ap.password = "short".to_string();
        assert!(ap.validate().is_err());

        ap.password = String::new();
        assert!(ap.validate().is_err());

        ap.auth = AuthMode::Open;
        assert!(ap.validate().is_ok());

        ap.password = "charmender".to_string();
        assert!(ap.validate().is_err());
    }

    #[test]
    fn test_validate_max_connections() {
        let mut ap = ApConfig::default();
        ap.max_connections = 0;
        assert!(ap.validate().is_err());

        ap.max_connections = 11;
        assert!(ap.validate().is_err());

        ap.max_connections = 10;
        assert!(ap.validate().is_ok());
    }

    #[test]
    fn test_override_json_uses_defaults_for_optional_fields() {
        let ap = ApConfig::from_json(
            r#"{"ssid":"workshop","password":"hunter22","auth":"wpa2_psk","max_connections":2}"#,
        )
        .unwrap();

        assert_eq!(
            ap,
            ApConfig {
                ssid: "workshop".to_string(),
                password: "hunter22".to_string(),
                channel: 0,
                auth: AuthMode::Wpa2Psk,
                ssid_hidden: false,
                max_connections: 2,
                beacon_interval: 100,
            }
        );
    }
}
