/// Discovery service client interface and an in-memory implementation
///
/// A discovery service (sentinel-style quorum) knows which node is the current
/// master of a service group and which nodes replicate it. The router only
/// consumes the query contract below; speaking a discovery wire protocol is up
/// to the implementor.

use crate::core::Endpoint;
use crate::error::{RouterError, RouterResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Query contract of a discovery service
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Add a discovery node to query
    fn register_node(&mut self, endpoint: Endpoint);

    /// Registered discovery nodes
    fn nodes(&self) -> &[Endpoint];

    /// Current master of `group`
    async fn query_master(&self, group: &str) -> RouterResult<Endpoint>;

    /// Current replicas of `group`, possibly empty
    async fn query_replicas(&self, group: &str) -> RouterResult<Vec<Endpoint>>;
}

/// Known topology of one service group
#[derive(Debug, Clone, Default)]
pub struct GroupTopology {
    pub master: Option<Endpoint>,
    pub replicas: Vec<Endpoint>,
}

/// Discovery client answering from an in-memory topology table
///
/// Useful for fixed deployments and tests; topologies can be changed at any
/// time to simulate failover.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    nodes: Vec<Endpoint>,
    groups: RwLock<HashMap<String, GroupTopology>>,
    unreachable: AtomicBool,
    queries: AtomicUsize,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the master reported for `group`
    pub async fn set_master<G: Into<String>>(&self, group: G, master: Endpoint) {
        let mut groups = self.groups.write().await;
        groups.entry(group.into()).or_default().master = Some(master);
    }

    /// Set the replicas reported for `group`
    pub async fn set_replicas<G: Into<String>>(&self, group: G, replicas: Vec<Endpoint>) {
        let mut groups = self.groups.write().await;
        groups.entry(group.into()).or_default().replicas = replicas;
    }

    /// Remove a group entirely
    pub async fn remove_group(&self, group: &str) -> Option<GroupTopology> {
        let mut groups = self.groups.write().await;
        groups.remove(group)
    }

    /// Simulate every discovery node going down (or coming back)
    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    /// Number of queries answered or attempted so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    async fn topology(&self, group: &str) -> RouterResult<GroupTopology> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        if self.nodes.is_empty() {
            return Err(RouterError::discovery_unavailable(
                group,
                "no discovery nodes registered",
            ));
        }

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RouterError::discovery_unavailable(
                group,
                format!("none of {} discovery nodes answered", self.nodes.len()),
            ));
        }

        let groups = self.groups.read().await;
        groups
            .get(group)
            .cloned()
            .ok_or_else(|| RouterError::discovery_unavailable(group, "group is not monitored"))
    }
}

#[async_trait]
impl DiscoveryClient for StaticDiscovery {
    fn register_node(&mut self, endpoint: Endpoint) {
        if !self.nodes.contains(&endpoint) {
            debug!("Registered discovery node {}", endpoint);
            self.nodes.push(endpoint);
        }
    }

    fn nodes(&self) -> &[Endpoint] {
        &self.nodes
    }

    async fn query_master(&self, group: &str) -> RouterResult<Endpoint> {
        self.topology(group).await?.master.ok_or_else(|| {
            RouterError::discovery_unavailable(group, "no master known for group")
        })
    }

    async fn query_replicas(&self, group: &str) -> RouterResult<Vec<Endpoint>> {
        Ok(self.topology(group).await?.replicas)
    }
}
