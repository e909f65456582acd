use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::actions::{ActivateAction, StartAction, StopAction};
use crate::errors::{DaemonError, Result};

/// Capability tags considered provided before any service starts.
///
/// The loopback interface is configured by the kernel at boot, so services
/// may require it without any descriptor providing it.
pub const BOOTSTRAP_PROVISIONS: &[&str] = &["loopback"];

/// Declarative record describing one supervisable unit.
///
/// Descriptors arrive fully resolved from whatever configuration layer sits
/// above the supervisor; nothing here is re-validated against files on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique name within a registry. Also usable as a requirement tag.
    pub name: String,

    /// Capability tags this service satisfies once running.
    #[serde(default)]
    pub provision: BTreeSet<String>,

    /// Capability tags that must be live before this service starts.
    #[serde(default)]
    pub requirement: BTreeSet<String>,

    pub start: StartAction,

    #[serde(default)]
    pub stop: StopAction,

    /// Idempotent pre-start preparation, run before every start.
    #[serde(default)]
    pub activate: Option<ActivateAction>,

    /// Restart automatically when the process dies while running.
    #[serde(default)]
    pub respawn: bool,

    /// OS user accounts the service expects to exist before starting.
    /// Created by the host provisioning layer, only verified here.
    #[serde(default)]
    pub user_accounts: Vec<String>,

    #[serde(default)]
    pub user_groups: Vec<String>,

    #[serde(default)]
    pub documentation: Option<String>,
}

impl ServiceDescriptor {
    /// Whether this descriptor satisfies `tag`. A service always provides
    /// its own name, so requirements can name services directly.
    pub fn provides(&self, tag: &str) -> bool {
        self.name == tag || self.provision.contains(tag)
    }
}

/// An explicitly owned set of descriptors, scoped to one supervision
/// session. Declaration order is preserved and used for deterministic
/// scheduling tie-breaks.
#[derive(Debug, Clone)]
pub struct Registry {
    descriptors: Vec<ServiceDescriptor>,
    index: HashMap<String, usize>,
    bootstrap: BTreeSet<String>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_bootstrap(BOOTSTRAP_PROVISIONS.iter().map(|s| s.to_string()))
    }

    /// A registry whose pre-satisfied capability set differs from the
    /// default, e.g. in containers without a loopback marker.
    pub fn with_bootstrap(tags: impl IntoIterator<Item = String>) -> Self {
        Self {
            descriptors: Vec::new(),
            index: HashMap::new(),
            bootstrap: tags.into_iter().collect(),
        }
    }

    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<()> {
        if self.index.contains_key(&descriptor.name) {
            return Err(DaemonError::DuplicateService(descriptor.name));
        }
        self.index
            .insert(descriptor.name.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn register_all(
        &mut self,
        descriptors: impl IntoIterator<Item = ServiceDescriptor>,
    ) -> Result<()> {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declaration index of a service, used for scheduling tie-breaks.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// All descriptors in declaration order.
    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Whether `tag` is satisfied before anything starts.
    pub fn is_bootstrap(&self, tag: &str) -> bool {
        self.bootstrap.contains(tag)
    }

    /// Names of every service providing `tag`, in declaration order.
    pub fn providers_of(&self, tag: &str) -> Vec<&str> {
        self.descriptors
            .iter()
            .filter(|d| d.provides(tag))
            .map(|d| d.name.as_str())
            .collect()
    }
}
