//! Domain registry
//!
//! Maps an opaque domain key to a base URL per deployment environment. The
//! execution engine only sees the [`AddressResolver`] trait; `DomainRegistry`
//! is the stock implementation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Deployment environment a base URL belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum Environment {
    Mock,
    /// Named development environment, e.g. `d1`.
    Develop(String),
    /// Named test environment, e.g. `t2`.
    Test(String),
    PreProduction,
    Production,
}

/// Resolves a domain key to a base address.
pub trait AddressResolver: Send + Sync {
    fn resolve(&self, domain_key: &str) -> Option<String>;
}

impl<F> AddressResolver for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn resolve(&self, domain_key: &str) -> Option<String> {
        self(domain_key)
    }
}

#[derive(Debug)]
struct RegistryState {
    current: Environment,
    domains: HashMap<String, HashMap<Environment, String>>,
}

/// Domain key → environment → base URL, with a switchable current environment.
#[derive(Debug)]
pub struct DomainRegistry {
    state: RwLock<RegistryState>,
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::new(Environment::Production)
    }
}

impl DomainRegistry {
    pub fn new(environment: Environment) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                current: environment,
                domains: HashMap::new(),
            }),
        }
    }

    /// Register (or replace) the base URLs for `key`.
    pub fn register<I, S>(&self, key: impl Into<String>, urls: I)
    where
        I: IntoIterator<Item = (Environment, S)>,
        S: Into<String>,
    {
        let urls = urls.into_iter().map(|(env, url)| (env, url.into())).collect();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.domains.insert(key.into(), urls);
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with_domain<I, S>(self, key: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = (Environment, S)>,
        S: Into<String>,
    {
        self.register(key, urls);
        self
    }

    pub fn set_environment(&self, environment: Environment) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(target: "callwire::domain", from = ?state.current, to = ?environment, "switching environment");
        state.current = environment;
    }

    pub fn environment(&self) -> Environment {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.current.clone()
    }

    /// Base URL for `key` in the current environment.
    pub fn domain(&self, key: &str) -> Option<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .domains
            .get(key)
            .and_then(|urls| urls.get(&state.current))
            .cloned()
    }
}

impl AddressResolver for DomainRegistry {
    fn resolve(&self, domain_key: &str) -> Option<String> {
        self.domain(domain_key)
    }
}
