//! Subscription registry
//!
//! Ordered list of a session's bindings. Insertion order is the column order
//! of every message sent for the list. Names are not required to be unique;
//! lookups and removals act on the first match.

use crate::binding::VariableBinding;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    bindings: Vec<VariableBinding>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an unresolved binding for `name`
    pub fn add(&mut self, name: impl Into<Arc<str>>) -> &mut VariableBinding {
        self.bindings.push(VariableBinding::new(name));
        let last = self.bindings.len() - 1;
        &mut self.bindings[last]
    }

    /// Remove the first binding named `name`; returns whether one was removed
    pub fn remove(&mut self, name: &str) -> bool {
        match self.bindings.iter().position(|b| b.name() == name) {
            Some(index) => {
                self.bindings.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn find(&self, name: &str) -> Option<&VariableBinding> {
        self.bindings.iter().find(|b| b.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut VariableBinding> {
        self.bindings.iter_mut().find(|b| b.name() == name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableBinding> {
        self.bindings.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VariableBinding> {
        self.bindings.iter_mut()
    }

    /// Subscribed names in wire order
    pub fn names(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.name().to_string()).collect()
    }
}
