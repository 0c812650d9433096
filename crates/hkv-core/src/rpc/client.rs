//! The remote table-query capability and the shared client registry.
//!
//! Transport concerns (connection pooling, routing, retry with backoff) live
//! behind [`TableRpc`]; this crate only shapes requests and interprets results.

use super::types::{RpcRequest, RpcResponse};
use crate::config::RemoteConfig;
use crate::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Trait defining the remote table-query capability.
///
/// Implementations own their retry policy; one call to `execute` is one
/// logical attempt from this crate's point of view.
#[async_trait]
pub trait TableRpc: Send + Sync {
    /// Execute a query, batch or query-and-mutate request.
    async fn execute(&self, request: RpcRequest) -> Result<RpcResponse>;

    /// Refresh cached routing for a physical table.
    async fn refresh_table_entry(&self, table_name: &str) -> Result<()> {
        debug!(table = %table_name, "Routing refresh not required by this client");
        Ok(())
    }
}

/// Trait for creating RPC clients from configuration.
pub trait ClientFactory: Send + Sync {
    fn create(&self, config: &RemoteConfig) -> Result<Arc<dyn TableRpc>>;
}

impl<F> ClientFactory for F
where
    F: Fn(&RemoteConfig) -> Result<Arc<dyn TableRpc>> + Send + Sync,
{
    fn create(&self, config: &RemoteConfig) -> Result<Arc<dyn TableRpc>> {
        self(config)
    }
}

/// Registry of shared RPC clients keyed by remote identity.
///
/// Tables opened with equal [`RemoteConfig`]s share one client. Clients stay
/// registered until evicted or the registry is cleared.
pub struct ClientRegistry {
    clients: DashMap<RemoteConfig, Arc<dyn TableRpc>>,
    factory: Box<dyn ClientFactory>,
}

impl ClientRegistry {
    /// Create a registry that builds missing clients with `factory`.
    pub fn new(factory: impl ClientFactory + 'static) -> Self {
        Self {
            clients: DashMap::new(),
            factory: Box::new(factory),
        }
    }

    /// Return the client for `config`, creating it on first use.
    ///
    /// The factory runs without any registry lock held. If two callers race
    /// on a new identity, the first client inserted wins and the other is
    /// dropped.
    pub fn get_or_create(&self, config: &RemoteConfig) -> Result<Arc<dyn TableRpc>> {
        if let Some(client) = self.get(config) {
            return Ok(client);
        }

        let created = self.factory.create(config)?;
        match self.clients.entry(config.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                info!(
                    endpoint = %config.endpoint,
                    database = %config.database,
                    "Created table client"
                );
                Ok(entry.insert(created).clone())
            }
        }
    }

    /// Look up a client without creating it.
    pub fn get(&self, config: &RemoteConfig) -> Option<Arc<dyn TableRpc>> {
        self.clients.get(config).map(|c| c.value().clone())
    }

    /// Remove a client; tables already holding it keep working.
    pub fn evict(&self, config: &RemoteConfig) -> Option<Arc<dyn TableRpc>> {
        let removed = self.clients.remove(config).map(|(_, client)| client);
        if removed.is_some() {
            info!(endpoint = %config.endpoint, "Evicted table client");
        }
        removed
    }

    pub fn clear(&self) {
        self.clients.clear();
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::memory::MemoryTableService;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};

    fn remote(endpoint: &str) -> RemoteConfig {
        RemoteConfig {
            endpoint: endpoint.into(),
            full_user_name: "root@sys".into(),
            database: "test".into(),
        }
    }

    fn counting_registry(created: Arc<AtomicUsize>) -> ClientRegistry {
        ClientRegistry::new(move |_: &RemoteConfig| -> Result<Arc<dyn TableRpc>> {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MemoryTableService::new()))
        })
    }

    #[test]
    fn test_registry_shares_clients_per_identity() {
        let created = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(created.clone());

        let a = registry.get_or_create(&remote("a")).unwrap();
        let b = registry.get_or_create(&remote("a")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);

        registry.get_or_create(&remote("b")).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_registry_eviction_recreates() {
        let created = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(created.clone());

        let first = registry.get_or_create(&remote("a")).unwrap();
        assert!(registry.evict(&remote("a")).is_some());
        assert!(registry.get(&remote("a")).is_none());

        let second = registry.get_or_create(&remote("a")).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 2);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_factory_error_is_not_cached() {
        let registry = ClientRegistry::new(|_: &RemoteConfig| -> Result<Arc<dyn TableRpc>> {
            Err(Error::Rpc("config server unreachable".into()))
        });
        assert!(registry.get_or_create(&remote("a")).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_factory_may_call_back_into_registry() {
        let slot: Arc<OnceLock<Weak<ClientRegistry>>> = Arc::new(OnceLock::new());
        let seen = Arc::new(AtomicUsize::new(0));

        let factory_slot = slot.clone();
        let factory_seen = seen.clone();
        let registry = Arc::new(ClientRegistry::new(
            move |config: &RemoteConfig| -> Result<Arc<dyn TableRpc>> {
                let registry = factory_slot.get().and_then(Weak::upgrade);
                if let Some(registry) = registry {
                    assert!(registry.get(config).is_none());
                    factory_seen.store(registry.len(), Ordering::SeqCst);
                }
                Ok(Arc::new(MemoryTableService::new()))
            },
        ));
        assert!(slot.set(Arc::downgrade(&registry)).is_ok());

        registry.get_or_create(&remote("a")).unwrap();
        registry.get_or_create(&remote("b")).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
