//! Service registry: resolves a routing key to a `Service` through a layered
//! lookup — static map, then the external key/value store, then the
//! `CATCH_ALL` sentinel.

use std::collections::HashMap;
use std::sync::RwLock;

use log::{debug, warn};
use serde::Deserialize;

use crate::config::CATCH_ALL;
use crate::error::RouterError;
use crate::service::kv::KvStore;

/// A routing target: either a direct `host:port` pair or a reverse-tunnel
/// client secret, never both and never neither.
#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct Service {
    #[serde(default)]
    pub addr: String,
    #[serde(default, alias = "tlsport")]
    pub tls_port: u16,
    #[serde(default, alias = "httpport")]
    pub http_port: u16,
    #[serde(default, alias = "clientsecret")]
    pub client_secret: String,
}

impl Service {
    pub fn is_tunneled(&self) -> bool {
        !self.client_secret.is_empty()
    }

    pub fn port_for(&self, is_tls: bool) -> u16 {
        if is_tls {
            self.tls_port
        } else {
            self.http_port
        }
    }
}

/// Layered hostname → `Service` resolver.
///
/// The static map is guarded by a reader/writer lock: reads dominate
/// (one per incoming connection), writes are rare (`register`/`delete`).
pub struct ServiceRegistry {
    static_map: RwLock<HashMap<String, Service>>,
    kv: Box<dyn KvStore>,
}

impl ServiceRegistry {
    pub fn new(static_map: HashMap<String, Service>, kv: Box<dyn KvStore>) -> Self {
        Self {
            static_map: RwLock::new(static_map),
            kv,
        }
    }

    /// Resolve order: lowercase → static map → kv store → `CATCH_ALL` →
    /// `UnknownService`.
    pub async fn resolve(&self, hostname: &str) -> Result<Service, RouterError> {
        let hostname = hostname.to_lowercase();

        if let Some(service) = self.lookup_static(&hostname) {
            return Ok(service);
        }

        match self.lookup_kv(&hostname).await {
            Ok(Some(service)) => return Ok(service),
            Ok(None) => {}
            Err(e) => {
                // Registry/store transient (§7): surfaces as unknown
                // service for this request, never cached as a negative.
                warn!("kv lookup for {:?} failed, treating as unknown: {}", hostname, e);
            }
        }

        if let Some(service) = self.lookup_static(CATCH_ALL) {
            debug!("no specific match for {:?}, using CATCH_ALL", hostname);
            return Ok(service);
        }

        Err(RouterError::UnknownService(hostname))
    }

    fn lookup_static(&self, key: &str) -> Option<Service> {
        let map = self.static_map.read().expect("static_map lock poisoned");
        map.get(key).cloned()
    }

    async fn lookup_kv(&self, hostname: &str) -> Result<Option<Service>, RouterError> {
        let key = format!("tcprouter/service/{}", hostname);
        let value = self.kv.get(&key).await?;
        let Some(bytes) = value else {
            return Ok(None);
        };
        let service: Service = serde_json::from_slice(&bytes)
            .map_err(|e| RouterError::InvalidServiceRecord(e.to_string()))?;
        Ok(Some(service))
    }

    /// Mutate only the static layer, under the write lock.
    pub fn register(&self, name: &str, service: Service) {
        let mut map = self.static_map.write().expect("static_map lock poisoned");
        map.insert(name.to_lowercase(), service);
    }

    pub fn delete(&self, name: &str) {
        let mut map = self.static_map.write().expect("static_map lock poisoned");
        map.remove(&name.to_lowercase());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::kv::NullKvStore;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct FakeKv(Mutex<StdHashMap<String, Vec<u8>>>);

    #[async_trait]
    impl KvStore for FakeKv {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, crate::error::KvError> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }
    }

    fn service(addr: &str) -> Service {
        Service {
            addr: addr.to_string(),
            http_port: 80,
            tls_port: 443,
            client_secret: String::new(),
        }
    }

    #[tokio::test]
    async fn resolution_order_matches_spec() {
        let mut static_map = StdHashMap::new();
        static_map.insert("a".to_string(), service("s1"));
        static_map.insert(CATCH_ALL.to_string(), service("s4"));

        let mut kv_data = StdHashMap::new();
        kv_data.insert(
            "tcprouter/service/a".to_string(),
            serde_json::to_vec(&service("s2")).unwrap(),
        );
        kv_data.insert(
            "tcprouter/service/b".to_string(),
            serde_json::to_vec(&service("s3")).unwrap(),
        );

        let registry = ServiceRegistry::new(static_map, Box::new(FakeKv(Mutex::new(kv_data))));

        assert_eq!(registry.resolve("a").await.unwrap().addr, "s1");
        assert_eq!(registry.resolve("b").await.unwrap().addr, "s3");
        assert_eq!(registry.resolve("c").await.unwrap().addr, "s4");
    }

    #[tokio::test]
    async fn unknown_service_without_catch_all() {
        let registry = ServiceRegistry::new(StdHashMap::new(), Box::new(NullKvStore));
        let err = registry.resolve("nowhere").await.unwrap_err();
        assert!(matches!(err, RouterError::UnknownService(_)));
    }
}
