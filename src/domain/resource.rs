use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Capability describing a resource category. The engine never knows about
/// concrete categories; domain packages register descriptors here and the
/// engine operates on the abstract pair (id, domain).
pub trait ResourceDescriptor: Send + Sync {
    fn resource_id(&self) -> &str;
    fn resource_domain(&self) -> &str;
}

/// Descriptor registered by a domain package.
#[derive(Debug, Clone)]
pub struct StaticResource {
    id: String,
    domain: String,
}

impl StaticResource {
    pub fn new(id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
        }
    }
}

impl ResourceDescriptor for StaticResource {
    fn resource_id(&self) -> &str {
        &self.id
    }

    fn resource_domain(&self) -> &str {
        &self.domain
    }
}

/// String-only placeholder returned when no descriptor is registered,
/// letting deserialization proceed without the owning domain module loaded.
#[derive(Debug, Clone)]
pub struct DynamicResource {
    id: String,
}

impl ResourceDescriptor for DynamicResource {
    fn resource_id(&self) -> &str {
        &self.id
    }

    fn resource_domain(&self) -> &str {
        "dynamic"
    }
}

type Registry = RwLock<HashMap<String, Arc<dyn ResourceDescriptor>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers a descriptor. Idempotent by id: the first registration wins
/// and later ones for the same id are no-ops.
pub fn register(descriptor: Arc<dyn ResourceDescriptor>) {
    let mut map = registry().write();
    map.entry(descriptor.resource_id().to_string())
        .or_insert(descriptor);
}

pub fn lookup(resource_id: &str) -> Option<Arc<dyn ResourceDescriptor>> {
    registry().read().get(resource_id).cloned()
}

/// Resolves a descriptor, falling back to a [`DynamicResource`] placeholder
/// for unregistered ids.
pub fn lookup_or_fallback(resource_id: &str) -> Arc<dyn ResourceDescriptor> {
    lookup(resource_id).unwrap_or_else(|| {
        Arc::new(DynamicResource {
            id: resource_id.to_string(),
        })
    })
}

pub fn registered_ids() -> Vec<String> {
    let mut ids: Vec<String> = registry().read().keys().cloned().collect();
    ids.sort();
    ids
}
