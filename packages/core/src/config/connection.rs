//! Per-connection configuration

use serde::{Deserialize, Serialize};

use super::protocol::{Http1Config, Http2Config, Http3Config};
use super::validation::{ConfigResult, ConfigurationError, Validator};
use crate::protocols::core::{HttpVersion, Role};

/// Everything needed to construct one connection driver.
///
/// The version is fixed for the lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub version: HttpVersion,
    pub role: Role,
    #[serde(default)]
    pub http1: Http1Config,
    #[serde(default)]
    pub http2: Http2Config,
    #[serde(default)]
    pub http3: Http3Config,
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(version: HttpVersion, role: Role) -> Self {
        Self {
            version,
            role,
            http1: Http1Config::default(),
            http2: Http2Config::default(),
            http3: Http3Config::default(),
        }
    }

    #[must_use]
    pub fn client(version: HttpVersion) -> Self {
        Self::new(version, Role::Client)
    }

    #[must_use]
    pub fn server(version: HttpVersion) -> Self {
        Self::new(version, Role::Server)
    }
}

impl Validator for ConnectionConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self.version {
            HttpVersion::Http11 => self.http1.validate(),
            HttpVersion::Http2 => {
                if !cfg!(feature = "h2") {
                    return Err(ConfigurationError::UnsupportedVersion(
                        self.version.to_string(),
                    ));
                }
                self.http2.validate()
            }
            HttpVersion::Http3 => {
                if !cfg!(feature = "h3") {
                    return Err(ConfigurationError::UnsupportedVersion(
                        self.version.to_string(),
                    ));
                }
                self.http3.validate()?;
                if self.role == Role::Server
                    && (self.http3.tls.cert_chain_file.is_none()
                        || self.http3.tls.private_key_file.is_none())
                {
                    return Err(ConfigurationError::MissingTls(
                        "HTTP/3 servers need cert_chain_file and private_key_file".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}
