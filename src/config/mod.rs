/// Router configuration
///
/// Configuration arrives already structured; the TOML helpers exist for
/// callers that keep it in a file.

use crate::core::Endpoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Password shared by every node; empty or absent means no AUTH
    #[serde(default)]
    pub password: Option<String>,
    /// Where node addresses come from
    pub deployment: DeploymentConfig,
    /// Node connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// How node addresses are obtained, fixed for the lifetime of a router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Static,
    Discovered,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentMode::Static => write!(f, "static"),
            DeploymentMode::Discovered => write!(f, "discovered"),
        }
    }
}

/// Per-mode role configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum DeploymentConfig {
    #[serde(rename = "static")]
    Static {
        /// Candidate masters, one is picked at random per cold start
        masters: Vec<Endpoint>,
        /// Candidate replicas; an empty list sends reads to a master
        #[serde(default)]
        replicas: Vec<Endpoint>,
    },
    #[serde(rename = "discovered")]
    Discovered {
        /// Service group monitored by the discovery nodes
        service_group: String,
        /// Discovery nodes registered on the discovery client
        discovery_nodes: Vec<Endpoint>,
    },
}

impl DeploymentConfig {
    pub fn mode(&self) -> DeploymentMode {
        match self {
            DeploymentConfig::Static { .. } => DeploymentMode::Static,
            DeploymentConfig::Discovered { .. } => DeploymentMode::Discovered,
        }
    }
}

/// Node connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Reply timeout in milliseconds; unset waits as long as the node takes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_timeout_ms: Option<u64>,
    /// What happens to a cached connection after a connection-level failure
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            response_timeout_ms: None,
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Cache eviction policy for failed connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Keep the cached connection no matter what
    #[default]
    Never,
    /// Drop the cached connection when it fails at the connection layer,
    /// so the next operation re-resolves and reconnects
    OnConnectionError,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            password: None,
            deployment: DeploymentConfig::Static {
                masters: vec![Endpoint::new("127.0.0.1", 6379)],
                replicas: Vec::new(),
            },
            connection: ConnectionConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml_str(&content)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    pub fn mode(&self) -> DeploymentMode {
        self.deployment.mode()
    }

    /// Password to authenticate with, if any
    pub fn effective_password(&self) -> Option<String> {
        self.password.clone().filter(|p| !p.is_empty())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.deployment {
            DeploymentConfig::Static { masters, replicas } => {
                if masters.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "static deployment needs at least one master".to_string(),
                    ));
                }

                for endpoint in masters.iter().chain(replicas.iter()) {
                    validate_endpoint(endpoint)?;
                }
            }
            DeploymentConfig::Discovered {
                service_group,
                discovery_nodes,
            } => {
                if service_group.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "service_group cannot be empty".to_string(),
                    ));
                }

                if discovery_nodes.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "discovery_nodes cannot be empty".to_string(),
                    ));
                }

                for endpoint in discovery_nodes {
                    validate_endpoint(endpoint)?;
                }
            }
        }

        if self.connection.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.connection.response_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "response_timeout_ms must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_endpoint(endpoint: &Endpoint) -> Result<(), ConfigError> {
    if endpoint.host.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "endpoint host cannot be empty (port {})",
            endpoint.port
        )));
    }

    if endpoint.port == 0 {
        return Err(ConfigError::ValidationError(format!(
            "invalid port 0 for endpoint {}",
            endpoint.host
        )));
    }

    Ok(())
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
