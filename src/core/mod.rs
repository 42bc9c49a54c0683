/// Core routing abstractions shared by the resolver, cache and router
pub mod cache;
pub mod connection;
pub mod resolver;

use crate::config::ConfigError;
use crate::error::RouterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which physical node an operation needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The node accepting writes
    Master,
    /// A read-only copy of the master
    Replica,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Master, Role::Replica];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Replica => "replica",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "master" => Ok(Role::Master),
            "replica" | "slave" => Ok(Role::Replica),
            _ => Err(RouterError::InvalidRole(s.to_string())),
        }
    }
}

/// A store node address plus the credential used to reach it
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Endpoint {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    /// Same address, different credential
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// `host:port` form used for connecting and logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Same host and port, ignoring credentials
    pub fn same_address(&self, other: &Endpoint) -> bool {
        self.host == other.host && self.port == other.port
    }
}

// Passwords stay out of logs.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    /// Parse `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::ValidationError(format!("Invalid endpoint: {}", s)))?;

        if host.is_empty() {
            return Err(ConfigError::ValidationError(format!("Invalid endpoint: {}", s)));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::ValidationError(format!("Invalid endpoint port: {}", s)))?;

        Ok(Endpoint::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("master".parse::<Role>().unwrap(), Role::Master);
        assert_eq!("Replica".parse::<Role>().unwrap(), Role::Replica);
        assert_eq!("slave".parse::<Role>().unwrap(), Role::Replica);

        let err = "primary".parse::<Role>().unwrap_err();
        assert!(matches!(err, RouterError::InvalidRole(ref name) if name == "primary"));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Master.to_string(), "master");
        assert_eq!(Role::Replica.to_string(), "replica");
        assert_eq!(Role::ALL.len(), 2);
    }

    #[test]
    fn test_endpoint_parsing() {
        let endpoint: Endpoint = "10.0.1.20:6379".parse().unwrap();
        assert_eq!(endpoint, Endpoint::new("10.0.1.20", 6379));
        assert_eq!(endpoint.address(), "10.0.1.20:6379");

        assert!("10.0.1.20".parse::<Endpoint>().is_err());
        assert!(":6379".parse::<Endpoint>().is_err());
        assert!("redis.local:port".parse::<Endpoint>().is_err());
        assert!("redis.local:70000".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_hides_password() {
        let endpoint =
            Endpoint::new("127.0.0.1", 6379).with_password(Some("hunter2".to_string()));
        let debug = format!("{:?}", endpoint);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
        assert_eq!(endpoint.to_string(), "127.0.0.1:6379");
    }

    #[test]
    fn test_same_address_ignores_password() {
        let plain = Endpoint::new("127.0.0.1", 6379);
        let secured = plain.clone().with_password(Some("secret".to_string()));
        assert_ne!(plain, secured);
        assert!(plain.same_address(&secured));
        assert!(!plain.same_address(&Endpoint::new("127.0.0.1", 6380)));
    }
}
