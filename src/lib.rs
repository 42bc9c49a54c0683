/// Rumbo - read/write splitting client for Redis master/replica deployments
///
/// Rumbo presents one logical client over a deployment made of one writable
/// master and any number of read-only replicas:
/// 1. Static mode: candidate masters and replicas come from configuration
/// 2. Discovered mode: master and replicas are looked up through a discovery
///    service for a named service group
///
/// Every operation is classified by name. The fixed read-only set goes to
/// the replica connection; everything else, unknown names included, goes to
/// the master connection. Each role keeps at most one cached connection,
/// created on first use, and the selected logical database follows the
/// router's session across both.
///
/// ```no_run
/// use rumbo::{Router, RouterConfig, SetOptions};
///
/// # async fn demo() -> rumbo::RouterResult<()> {
/// let config = RouterConfig::load_from_file("rumbo.toml")?;
/// let router = Router::from_config(config)?;
///
/// router.set("greeting", "hello", SetOptions::new()).await?;
/// let reply = router.get("greeting").await?;
/// println!("{:?}", reply);
/// # Ok(())
/// # }
/// ```
pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod redis;
pub mod router;

#[cfg(test)]
mod testing;

pub use config::{
    ConfigError, ConnectionConfig, DeploymentConfig, DeploymentMode, EvictionPolicy, RouterConfig,
};
pub use crate::core::cache::ConnectionCache;
pub use crate::core::connection::{Connector, NodeConnection, RespConnection, TcpConnector};
pub use crate::core::resolver::EndpointResolver;
pub use crate::core::{Endpoint, Role};
pub use discovery::{DiscoveryClient, StaticDiscovery};
pub use error::{ErrorSeverity, RouterError, RouterResult};
pub use redis::{Command, RespValue, ScoreBound, SetOptions};
pub use router::Router;
