//! UI store
//!
//! Published components are addressed by [`StoreKey`] and held as
//! [`ComponentFactory`] values: deferred results that resolve to the
//! component definition once its loading pipeline settles. The store keeps
//! whatever was written last and never rejects a write.

use crate::error::ExtensionError;
use crate::executor::{ScriptError, ScriptValue};
use crate::template::RenderUnit;
use crate::widgets::ComponentRef;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use vessel_api::StoreKey;

/// A fully loaded UI component
#[derive(Debug, Clone)]
pub struct ComponentDefinition {
    /// File name, e.g. `main.vue`
    pub name: String,
    pub key: StoreKey,
    /// Path of the component file relative to the extension root
    pub path: String,
    /// Value returned by the component's script
    pub options: ScriptValue,
    pub render: RenderUnit,
    /// Base widgets merged with the script's own `components`
    pub components: BTreeMap<String, ComponentRef>,
}

impl ComponentDefinition {
    /// A top-level member of the script result
    pub fn option(&self, name: &str) -> Result<Option<ScriptValue>, ScriptError> {
        self.options.get(name)
    }

    /// Initial state: the result of `data()`, or `{}` when absent
    pub fn data(&self) -> Result<serde_json::Value, ScriptError> {
        match self.options.get("data")? {
            Some(data) if data.is_function() => self.options.call_method("data", &[]),
            Some(data) => data.to_json(),
            None => Ok(serde_json::Value::Object(Default::default())),
        }
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }
}

/// Outcome of a component pipeline
pub type ComponentResult = Result<Rc<ComponentDefinition>, Rc<ExtensionError>>;

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

/// Deferred component definition; clones share one result
#[derive(Clone)]
pub struct ComponentFactory {
    id: u64,
    future: Shared<LocalBoxFuture<'static, ComponentResult>>,
}

impl ComponentFactory {
    pub fn new(future: impl Future<Output = ComponentResult> + 'static) -> Self {
        Self {
            id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
            future: future.boxed_local().shared(),
        }
    }

    /// A factory that is already settled with `definition`
    pub fn ready(definition: ComponentDefinition) -> Self {
        Self::new(futures::future::ready(Ok(Rc::new(definition))))
    }

    /// Unique id of this factory (shared by its clones)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the definition
    pub async fn resolve(&self) -> ComponentResult {
        self.future.clone().await
    }

    /// The result, if the pipeline has already settled
    pub fn peek(&self) -> Option<ComponentResult> {
        self.future.peek().cloned()
    }

    pub fn is_settled(&self) -> bool {
        self.future.peek().is_some()
    }
}

impl fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.future.peek() {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "rejected",
        };
        f.debug_struct("ComponentFactory")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

/// Shared map of published components; clones see the same entries
#[derive(Clone, Default)]
pub struct UiStore {
    entries: Rc<RefCell<BTreeMap<StoreKey, ComponentFactory>>>,
    revision: Rc<Cell<u64>>,
}

impl UiStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) {
        self.revision.set(self.revision.get() + 1);
    }

    /// Publish `factory` under `key`, replacing any previous entry
    pub fn set(&self, key: StoreKey, factory: ComponentFactory) -> Option<ComponentFactory> {
        self.bump();
        self.entries.borrow_mut().insert(key, factory)
    }

    pub fn get(&self, key: &StoreKey) -> Option<ComponentFactory> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        self.entries.borrow().contains_key(key)
    }

    pub fn remove(&self, key: &StoreKey) -> Option<ComponentFactory> {
        let removed = self.entries.borrow_mut().remove(key);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Remove the entry only if it is still the factory with `id`
    pub fn remove_if(&self, key: &StoreKey, id: u64) -> bool {
        let matches = self
            .entries
            .borrow()
            .get(key)
            .is_some_and(|factory| factory.id() == id);
        if matches {
            self.entries.borrow_mut().remove(key);
            self.bump();
        }
        matches
    }

    pub fn keys(&self) -> Vec<StoreKey> {
        self.entries.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.borrow_mut();
        if !entries.is_empty() {
            entries.clear();
            drop(entries);
            self.bump();
        }
    }

    /// Resolve the component published under `key`
    pub async fn resolve(&self, key: &StoreKey) -> Option<ComponentResult> {
        let factory = self.get(key)?;
        Some(factory.resolve().await)
    }

    /// Number of mutations applied so far
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }
}

impl fmt::Debug for UiStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.borrow().iter()).finish()
    }
}
