use parley_core::{ModuleId, ParticipantModule};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Modules the manager can deliver to, keyed by id.
///
/// Fixed once the manager is built, so lookups need no lock.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<ModuleId, Arc<dyn ParticipantModule>>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    pub fn register(&mut self, id: impl Into<ModuleId>, module: Arc<dyn ParticipantModule>) {
        let id = id.into();
        info!("Registering participant module: {id}");
        self.modules.insert(id, module);
    }

    #[must_use]
    pub fn get(&self, id: &ModuleId) -> Option<Arc<dyn ParticipantModule>> {
        self.modules.get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    #[must_use]
    pub fn list(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.modules.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
