//! Node kind registry.
//!
//! Maps kind names to a factory and the kind's default credentials. Built
//! once at startup, then passed to whatever constructs the topology and only
//! read from there on.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::credentials::Credentials;
use crate::error::{NodeError, Result};
use crate::kinds;
use crate::node::Node;

/// Produces a fresh, un-initialized node of one kind.
pub type NodeFactory = Arc<dyn Fn() -> Box<dyn Node> + Send + Sync>;

/// What a kind name resolves to.
pub struct RegistryEntry {
    factory: NodeFactory,
    credentials: Option<Arc<Credentials>>,
}

impl RegistryEntry {
    /// Instantiate a new node of this kind.
    pub fn new_node(&self) -> Box<dyn Node> {
        (self.factory)()
    }

    /// Default credentials of the kind, shared by all its nodes.
    pub fn credentials(&self) -> Option<&Arc<Credentials>> {
        self.credentials.as_ref()
    }
}

/// Table of known node kinds.
#[derive(Default)]
pub struct NodeRegistry {
    entries: HashMap<String, Arc<RegistryEntry>>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the bridge, linux and xrd kinds.
    pub fn with_builtin_kinds() -> Result<Self> {
        let mut registry = Self::new();
        kinds::register_builtin(&mut registry)?;
        Ok(registry)
    }

    /// Register `names` as aliases of one kind.
    ///
    /// Fails without registering anything if any name is already taken.
    pub fn register<F>(
        &mut self,
        names: &[&str],
        factory: F,
        credentials: Option<Credentials>,
    ) -> Result<()>
    where
        F: Fn() -> Box<dyn Node> + Send + Sync + 'static,
    {
        for (i, name) in names.iter().enumerate() {
            if self.entries.contains_key(*name) || names[..i].contains(name) {
                return Err(NodeError::DuplicateKind(name.to_string()));
            }
        }

        let entry = Arc::new(RegistryEntry {
            factory: Arc::new(factory),
            credentials: credentials.map(Arc::new),
        });

        for name in names {
            self.entries.insert(name.to_string(), Arc::clone(&entry));
        }

        debug!(kinds = ?names, "Registered node kind");
        Ok(())
    }

    /// Exact-match lookup of a kind name.
    pub fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name).map(|e| e.as_ref())
    }

    /// Instantiate a node of the named kind.
    pub fn new_node(&self, name: &str) -> Result<Box<dyn Node>> {
        self.lookup(name)
            .map(RegistryEntry::new_node)
            .ok_or_else(|| NodeError::UnknownKind(name.to_string()))
    }

    /// All registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
