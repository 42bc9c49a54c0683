/// Per-role connection cache
///
/// Holds at most one live connection per role for the lifetime of the
/// router. A role is resolved and connected only on its first use (cold
/// start); afterwards the cached connection is handed out as is. The
/// selected logical database is shared session state: new connections
/// pick it up when created and live ones are switched when it changes.
use crate::config::EvictionPolicy;
use crate::core::connection::{Connector, NodeConnection};
use crate::core::resolver::EndpointResolver;
use crate::core::{Endpoint, Role};
use crate::error::{RouterError, RouterResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Handle to a cached connection
pub type SharedConnection<N> = Arc<Mutex<N>>;

/// Session state shared by every connection of one router
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub selected_database: u32,
}

/// A cached connection and the endpoint it was opened against
pub struct CacheEntry<N> {
    pub role: Role,
    pub endpoint: Endpoint,
    connection: SharedConnection<N>,
}

type Slot<N> = Mutex<Option<CacheEntry<N>>>;

pub struct ConnectionCache<C: Connector> {
    connector: C,
    resolver: EndpointResolver,
    eviction: EvictionPolicy,
    // One lock per role, held across that role's cold start, so a slow
    // connect to one role never stalls the other
    master: Slot<C::Connection>,
    replica: Slot<C::Connection>,
    // Written before the broadcast takes any slot lock; cold starts read it
    // while holding their slot lock
    selected_database: AtomicU32,
    // Serializes database switches
    broadcast: Mutex<()>,
}

impl<C: Connector> ConnectionCache<C> {
    pub fn new(connector: C, resolver: EndpointResolver, eviction: EvictionPolicy) -> Self {
        Self {
            connector,
            resolver,
            eviction,
            master: Mutex::new(None),
            replica: Mutex::new(None),
            selected_database: AtomicU32::new(0),
            broadcast: Mutex::new(()),
        }
    }

    pub fn resolver(&self) -> &EndpointResolver {
        &self.resolver
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.eviction
    }

    fn slot(&self, role: Role) -> &Slot<C::Connection> {
        match role {
            Role::Master => &self.master,
            Role::Replica => &self.replica,
        }
    }

    pub fn session(&self) -> SessionState {
        SessionState {
            selected_database: self.selected_database.load(Ordering::SeqCst),
        }
    }

    /// Connection for `role`, establishing it on first use
    pub async fn get(&self, role: Role) -> RouterResult<SharedConnection<C::Connection>> {
        let mut slot = self.slot(role).lock().await;

        if let Some(entry) = slot.as_ref() {
            return Ok(Arc::clone(&entry.connection));
        }

        let entry = self.establish(role, self.session()).await?;
        let connection = Arc::clone(&entry.connection);
        *slot = Some(entry);

        Ok(connection)
    }

    /// Resolve, connect, authenticate and apply the session's database
    async fn establish(
        &self,
        role: Role,
        session: SessionState,
    ) -> RouterResult<CacheEntry<C::Connection>> {
        let endpoint = self.resolver.resolve(role).await?;
        debug!(%role, endpoint = %endpoint, "Cold start, connecting");

        let mut connection = self.connector.connect(&endpoint.host, endpoint.port).await?;

        if let Some(password) = endpoint.password.as_deref().filter(|p| !p.is_empty()) {
            connection
                .authenticate(password)
                .await
                .map_err(|e| match e {
                    RouterError::Node { message, .. } => {
                        RouterError::connection_failed(endpoint.address(), message)
                    }
                    other => other,
                })?;
        }

        if session.selected_database != 0 {
            connection
                .select_database(session.selected_database)
                .await?;
        }

        info!(
            %role,
            endpoint = %endpoint,
            database = session.selected_database,
            "Connection established"
        );

        Ok(CacheEntry {
            role,
            endpoint,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Switch every cached connection to `index`; connections created later
    /// start on it too.
    ///
    /// A connection that fails to switch is evicted so it cannot serve the
    /// old database; the remaining ones are still switched and the first
    /// failure is returned.
    pub async fn select_database(&self, index: u32) -> RouterResult<()> {
        let _broadcast = self.broadcast.lock().await;
        self.selected_database.store(index, Ordering::SeqCst);

        let mut first_error = None;
        for role in Role::ALL {
            let mut slot = self.slot(role).lock().await;
            let entry = match slot.as_ref() {
                Some(entry) => entry,
                None => continue,
            };

            let result = entry.connection.lock().await.select_database(index).await;
            match result {
                Ok(()) => debug!(%role, database = index, "Switched cached connection"),
                Err(e) => {
                    warn!(%role, endpoint = %entry.endpoint, "Evicting connection that failed to switch database: {}", e);
                    *slot = None;
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(database = index, "Selected database");
        Ok(())
    }

    pub async fn selected_database(&self) -> u32 {
        self.session().selected_database
    }

    pub async fn is_cached(&self, role: Role) -> bool {
        self.slot(role).lock().await.is_some()
    }

    /// Endpoint the cached connection for `role` was opened against
    pub async fn cached_endpoint(&self, role: Role) -> Option<Endpoint> {
        self.slot(role)
            .lock()
            .await
            .as_ref()
            .map(|entry| entry.endpoint.clone())
    }

    /// Drop the cached connection for `role`; the next use re-resolves
    pub async fn invalidate(&self, role: Role) -> bool {
        let removed = self.slot(role).lock().await.take();
        if let Some(entry) = &removed {
            info!(%role, endpoint = %entry.endpoint, "Invalidated cached connection");
        }
        removed.is_some()
    }

    /// Apply the eviction policy after `connection` failed with `error`.
    ///
    /// Only evicts when the failing connection is still the cached one, so a
    /// replacement created meanwhile survives.
    pub async fn report_failure(
        &self,
        role: Role,
        connection: &SharedConnection<C::Connection>,
        error: &RouterError,
    ) -> bool {
        if self.eviction != EvictionPolicy::OnConnectionError || !error.is_connection_error() {
            return false;
        }

        let mut slot = self.slot(role).lock().await;
        let is_current = slot
            .as_ref()
            .map_or(false, |entry| Arc::ptr_eq(&entry.connection, connection));

        if is_current {
            if let Some(entry) = slot.take() {
                warn!(%role, endpoint = %entry.endpoint, "Evicting failed connection: {}", error);
            }
        }
        is_current
    }
}
