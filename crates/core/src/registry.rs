use std::collections::BTreeMap;
use std::fmt;

use crate::node::NodeBehavior;
use crate::nodes_builtin::register_builtins;

type Factory = Box<dyn Fn() -> Box<dyn NodeBehavior>>;

/// Maps node type names to behaviour factories. Owned by whoever builds
/// graphs; several registries can coexist.
#[derive(Default)]
pub struct NodeRegistry {
    factories: BTreeMap<String, Factory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }

    /// Replaces any factory already registered under `type_name`.
    pub fn register<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn() -> Box<dyn NodeBehavior> + 'static,
    {
        if self
            .factories
            .insert(type_name.to_string(), Box::new(factory))
            .is_some()
        {
            tracing::warn!("node type {} registered twice, keeping the latest", type_name);
        }
    }

    pub fn create(&self, type_name: &str) -> Option<Box<dyn NodeBehavior>> {
        self.factories.get(type_name).map(|factory| factory())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
