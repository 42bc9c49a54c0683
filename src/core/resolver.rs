/// Endpoint resolution for master and replica roles
///
/// Turns static candidate lists or discovery answers into one concrete
/// endpoint carrying the shared password. Resolution happens once per cold
/// start of a role; the caller caches whatever connection results.
use crate::config::{ConfigError, DeploymentConfig, DeploymentMode, RouterConfig};
use crate::core::{Endpoint, Role};
use crate::discovery::DiscoveryClient;
use crate::error::RouterResult;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

/// Where candidate endpoints come from
pub enum Topology {
    Static {
        masters: Vec<Endpoint>,
        replicas: Vec<Endpoint>,
    },
    Discovered {
        group: String,
        client: Box<dyn DiscoveryClient>,
    },
}

pub struct EndpointResolver {
    topology: Topology,
    password: Option<String>,
}

impl EndpointResolver {
    /// Resolver over fixed candidate lists; at least one master is required
    pub fn from_static(
        masters: Vec<Endpoint>,
        replicas: Vec<Endpoint>,
        password: Option<String>,
    ) -> Result<Self, ConfigError> {
        if masters.is_empty() {
            return Err(ConfigError::ValidationError(
                "static deployment needs at least one master".to_string(),
            ));
        }

        Ok(Self {
            topology: Topology::Static { masters, replicas },
            password,
        })
    }

    /// Resolver backed by a discovery service for `group`
    pub fn from_discovery<G: Into<String>>(
        group: G,
        client: Box<dyn DiscoveryClient>,
        password: Option<String>,
    ) -> Self {
        Self {
            topology: Topology::Discovered {
                group: group.into(),
                client,
            },
            password,
        }
    }

    /// Build from router configuration, registering the configured discovery
    /// nodes on `discovery` in discovered mode
    pub fn from_config(
        config: &RouterConfig,
        discovery: Option<Box<dyn DiscoveryClient>>,
    ) -> Result<Self, ConfigError> {
        let password = config.effective_password();

        match &config.deployment {
            DeploymentConfig::Static { masters, replicas } => {
                if discovery.is_some() {
                    warn!("Discovery client ignored for static deployment");
                }
                Self::from_static(masters.clone(), replicas.clone(), password)
            }
            DeploymentConfig::Discovered {
                service_group,
                discovery_nodes,
            } => {
                let mut client = discovery.ok_or_else(|| {
                    ConfigError::ValidationError(
                        "discovered deployment requires a discovery client".to_string(),
                    )
                })?;

                for node in discovery_nodes {
                    client.register_node(node.clone());
                }

                Ok(Self::from_discovery(service_group.clone(), client, password))
            }
        }
    }

    pub fn mode(&self) -> DeploymentMode {
        match self.topology {
            Topology::Static { .. } => DeploymentMode::Static,
            Topology::Discovered { .. } => DeploymentMode::Discovered,
        }
    }

    pub async fn resolve(&self, role: Role) -> RouterResult<Endpoint> {
        match role {
            Role::Master => self.resolve_master().await,
            Role::Replica => self.resolve_replica().await,
        }
    }

    pub async fn resolve_master(&self) -> RouterResult<Endpoint> {
        let endpoint = match &self.topology {
            // from_static guarantees a candidate
            Topology::Static { masters, .. } => pick(masters).cloned().ok_or_else(|| {
                ConfigError::ValidationError("no master endpoints configured".to_string())
            })?,
            Topology::Discovered { group, client } => client.query_master(group).await?,
        };

        debug!("Resolved master endpoint {}", endpoint);
        Ok(self.attach_password(endpoint))
    }

    /// Replica endpoint, or the master's when there are no replicas
    pub async fn resolve_replica(&self) -> RouterResult<Endpoint> {
        let endpoint = match &self.topology {
            Topology::Static { replicas, .. } => pick(replicas).cloned(),
            Topology::Discovered { group, client } => {
                let replicas = client.query_replicas(group).await?;
                pick(&replicas).cloned()
            }
        };

        match endpoint {
            Some(endpoint) => {
                debug!("Resolved replica endpoint {}", endpoint);
                Ok(self.attach_password(endpoint))
            }
            None => {
                debug!("No replicas available, reads go to the master");
                self.resolve_master().await
            }
        }
    }

    fn attach_password(&self, endpoint: Endpoint) -> Endpoint {
        endpoint.with_password(self.password.clone())
    }
}

/// Uniform random choice among candidates
fn pick(candidates: &[Endpoint]) -> Option<&Endpoint> {
    candidates.choose(&mut rand::thread_rng())
}
