use std::collections::HashMap;

use crate::integrity::IntegrityFilter;
use crate::liveness::LivenessMonitor;
use crate::stage::Stage;
use crate::stamp::StampFramer;

/// Constructor for a named stage.
pub type StageFactory = Box<dyn Fn() -> Box<dyn Stage> + Send + Sync>;

/// Name-keyed registry of stage constructors.
///
/// Sessions look stages up here during pipeline wiring. The registry is
/// explicitly injected per session rather than process-global, so tests can
/// substitute fake stages without shared state.
#[derive(Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in heartbeat, crc, and stamps stages.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::liveness::STAGE_NAME, || {
            Box::new(LivenessMonitor::new())
        });
        registry.register(crate::integrity::STAGE_NAME, || {
            Box::new(IntegrityFilter::new())
        });
        registry.register(crate::stamp::STAGE_NAME, || Box::new(StampFramer::new()));
        registry
    }

    /// Register a factory under a stage name, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Stage> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Construct a fresh stage instance, or `None` for an unknown name.
    pub fn create(&self, name: &str) -> Option<Box<dyn Stage>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Check whether a stage name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered stage names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
