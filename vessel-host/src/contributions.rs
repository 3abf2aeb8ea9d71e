//! Contribution registry
//!
//! Scripts register named contributions (commands, menu entries, ...) through
//! the `@vessel/contributions` capability. Entries are scoped to the
//! registering extension; only global extensions may write the shared scope.

use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use vessel_api::ExtensionId;

/// Owner of a contribution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum ContributionScope {
    Global,
    Extension(ExtensionId),
}

impl fmt::Display for ContributionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Extension(id) => write!(f, "extension:{id}"),
        }
    }
}

/// Snapshot of one registered contribution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub scope: ContributionScope,
    pub kind: String,
    pub name: String,
    pub value: serde_json::Value,
}

type EntryKey = (ContributionScope, String, String);

#[derive(Debug)]
struct Entry {
    registration: u64,
    value: serde_json::Value,
}

/// Shared registry of contributions; clones see the same entries
#[derive(Debug, Clone, Default)]
pub struct ContributionRegistry {
    entries: Rc<RefCell<BTreeMap<EntryKey, Entry>>>,
    next_registration: Rc<Cell<u64>>,
}

impl ContributionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a contribution; returns its registration id
    pub fn register(
        &self,
        scope: ContributionScope,
        kind: &str,
        name: &str,
        value: serde_json::Value,
    ) -> u64 {
        let registration = self.next_registration.get();
        self.next_registration.set(registration + 1);
        tracing::debug!(scope = %scope, kind, name, "Registered contribution");
        self.entries.borrow_mut().insert(
            (scope, kind.to_string(), name.to_string()),
            Entry {
                registration,
                value,
            },
        );
        registration
    }

    pub fn get(
        &self,
        scope: &ContributionScope,
        kind: &str,
        name: &str,
    ) -> Option<serde_json::Value> {
        self.entries
            .borrow()
            .get(&(scope.clone(), kind.to_string(), name.to_string()))
            .map(|entry| entry.value.clone())
    }

    /// Names and values of one kind within a scope, ordered by name
    pub fn list(&self, scope: &ContributionScope, kind: &str) -> Vec<(String, serde_json::Value)> {
        self.entries
            .borrow()
            .iter()
            .filter(|((s, k, _), _)| s == scope && k == kind)
            .map(|((_, _, name), entry)| (name.clone(), entry.value.clone()))
            .collect()
    }

    pub fn remove(
        &self,
        scope: &ContributionScope,
        kind: &str,
        name: &str,
    ) -> Option<serde_json::Value> {
        self.entries
            .borrow_mut()
            .remove(&(scope.clone(), kind.to_string(), name.to_string()))
            .map(|entry| entry.value)
    }

    /// Remove an entry only if it still holds the given registration
    pub fn withdraw(
        &self,
        scope: &ContributionScope,
        kind: &str,
        name: &str,
        registration: u64,
    ) -> bool {
        let key = (scope.clone(), kind.to_string(), name.to_string());
        let current = self
            .entries
            .borrow()
            .get(&key)
            .is_some_and(|entry| entry.registration == registration);
        if current {
            self.entries.borrow_mut().remove(&key);
        }
        current
    }

    /// Drop everything an extension registered in its own scope
    pub fn remove_extension(&self, extension: &ExtensionId) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(scope, _, _), _| {
            !matches!(scope, ContributionScope::Extension(id) if id == extension)
        });
        before - entries.len()
    }

    pub fn snapshot(&self) -> Vec<Contribution> {
        self.entries
            .borrow()
            .iter()
            .map(|((scope, kind, name), entry)| Contribution {
                scope: scope.clone(),
                kind: kind.clone(),
                name: name.clone(),
                value: entry.value.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
