//! Static configuration for the router.
//!
//! Loading is deliberately thin — a path to a TOML file, deserialized with
//! `serde` — the parsing machinery itself is out of scope; only the shape of
//! the resulting struct matters to the rest of the crate.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::service::registry::Service;

/// The sentinel service name consulted when no other entry matches.
pub const CATCH_ALL: &str = "CATCH_ALL";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub tls_port: u16,
    pub http_port: u16,
    pub clients_port: u16,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KvBackendKind {
    Redis,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KvSection {
    pub backend: KvBackendKind,
    #[serde(default)]
    pub address: String,
}

/// A single entry under `[services.<name>]`.
///
/// Mirrors the wire shape of a KV-store service record (§6) so the same
/// struct deserializes either the static TOML table or a JSON blob read
/// from the external store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub addr: String,
    #[serde(default, alias = "tlsport")]
    pub tls_port: u16,
    #[serde(default, alias = "httpport")]
    pub http_port: u16,
    #[serde(default, alias = "clientsecret")]
    pub client_secret: String,
}

impl ServiceSpec {
    /// Validate the direct/tunneled invariant from §3 and convert into the
    /// runtime `Service` type.
    pub fn into_service(self, name: &str) -> Result<Service, ConfigError> {
        let tunneled = !self.client_secret.is_empty();
        let direct = !self.addr.is_empty();
        if tunneled && direct {
            return Err(ConfigError::AmbiguousService {
                name: name.to_string(),
            });
        }
        if !tunneled && !direct {
            return Err(ConfigError::AmbiguousService {
                name: name.to_string(),
            });
        }
        Ok(Service {
            addr: self.addr,
            tls_port: self.tls_port,
            http_port: self.http_port,
            client_secret: self.client_secret,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerSection,
    pub kv: KvSection,
    #[serde(default, rename = "services")]
    pub services: HashMap<String, ServiceSpec>,
}

impl Config {
    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text)
    }

    /// Validate every static service entry, returning the runtime map keyed
    /// by lowercased hostname (`CATCH_ALL` is left as-is).
    pub fn static_services(&self) -> Result<HashMap<String, Service>, ConfigError> {
        let mut out = HashMap::with_capacity(self.services.len());
        for (name, spec) in &self.services {
            let key = if name == CATCH_ALL {
                name.clone()
            } else {
                name.to_lowercase()
            };
            out.insert(key, spec.clone().into_service(name)?);
        }
        Ok(out)
    }
}
