//! Capability environments
//!
//! Everything an extension script can reach is listed in its
//! [`CapabilityEnvironment`]: a set of named modules returned by the script's
//! only free binding, `require(name)`. An environment is built fresh for
//! every execution and scoped to one extension and one activation.
//!
//! # Built-in modules
//!
//! | Module | Members |
//! |--------|---------|
//! | `@vessel/env` | `extensionId`, `isGlobal` |
//! | `@vessel/ui` | `keys()`, `has(key)` |
//! | `@vessel/contributions` | `register(kind, name, data)`, `get(kind, name)`, `list(kind)`; global extensions also get `registerGlobal` and `listGlobal` |
//! | `@vessel/style` | `createStyleSheet(css)` |
//! | `@vessel/notification` | `error(message)` |
//!
//! Hosts add their own modules through [`ModuleProvider`].

use crate::contributions::{ContributionRegistry, ContributionScope};
use crate::error::ExtensionError;
use crate::sinks::{ErrorSink, MemoryStyleSink, StyleSink, TracingErrorSink};
use crate::store::UiStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use vessel_api::{DisposableList, DisposeFn, ExtensionId};

pub const ENV_MODULE: &str = "@vessel/env";
pub const UI_MODULE: &str = "@vessel/ui";
pub const CONTRIBUTIONS_MODULE: &str = "@vessel/contributions";
pub const STYLE_MODULE: &str = "@vessel/style";
pub const NOTIFICATION_MODULE: &str = "@vessel/notification";

/// Host function callable from scripts
///
/// Arguments and the return value cross the engine boundary as JSON. An
/// `Err` is thrown inside the script as an `Error` with that message.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

/// One member of a capability module
#[derive(Clone)]
pub enum Capability {
    Value(Value),
    Function(NativeFn),
}

impl Capability {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn function(f: impl Fn(&[Value]) -> Result<Value, String> + 'static) -> Self {
        Self::Function(Rc::new(f))
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Named members exported by one `require`-able module
#[derive(Debug, Clone, Default)]
pub struct CapabilityModule {
    members: BTreeMap<String, Capability>,
}

impl CapabilityModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, capability: Capability) -> Self {
        self.insert(name, capability);
        self
    }

    pub fn insert(&mut self, name: &str, capability: Capability) {
        self.members.insert(name.to_string(), capability);
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.members.get(name)
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &Capability)> {
        self.members.iter().map(|(name, cap)| (name.as_str(), cap))
    }

    pub fn member_names(&self) -> Vec<&str> {
        self.members.keys().map(String::as_str).collect()
    }
}

/// The complete set of modules visible to one script execution
#[derive(Debug, Clone)]
pub struct CapabilityEnvironment {
    extension_id: ExtensionId,
    is_global: bool,
    modules: BTreeMap<String, CapabilityModule>,
}

impl CapabilityEnvironment {
    /// An environment with no modules at all
    pub fn empty(extension_id: ExtensionId, is_global: bool) -> Self {
        Self {
            extension_id,
            is_global,
            modules: BTreeMap::new(),
        }
    }

    pub fn extension_id(&self) -> &ExtensionId {
        &self.extension_id
    }

    pub fn is_global(&self) -> bool {
        self.is_global
    }

    pub fn insert_module(&mut self, name: &str, module: CapabilityModule) {
        self.modules.insert(name.to_string(), module);
    }

    pub fn module(&self, name: &str) -> Option<&CapabilityModule> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &CapabilityModule)> {
        self.modules.iter().map(|(name, module)| (name.as_str(), module))
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }
}

/// Host collaborators the built-in modules talk to
#[derive(Clone)]
pub struct HostServices {
    pub errors: Rc<dyn ErrorSink>,
    pub styles: Rc<dyn StyleSink>,
    pub contributions: ContributionRegistry,
}

impl HostServices {
    pub fn new(
        errors: Rc<dyn ErrorSink>,
        styles: Rc<dyn StyleSink>,
        contributions: ContributionRegistry,
    ) -> Self {
        Self {
            errors,
            styles,
            contributions,
        }
    }

    /// Report an error on behalf of an extension
    pub fn report(&self, extension: &ExtensionId, error: &ExtensionError) {
        self.errors.report(extension, error);
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self::new(
            Rc::new(TracingErrorSink),
            Rc::new(MemoryStyleSink::new()),
            ContributionRegistry::new(),
        )
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices")
            .field("contributions", &self.contributions.len())
            .finish_non_exhaustive()
    }
}

/// What a [`ModuleProvider`] may capture when building its module
pub struct ModuleScope<'a> {
    pub extension_id: &'a ExtensionId,
    pub is_global: bool,
    pub disposables: &'a DisposableList,
    pub ui_store: &'a UiStore,
    pub services: &'a HostServices,
}

/// Contributes an extra module to every environment
pub trait ModuleProvider {
    /// Name passed to `require`
    fn name(&self) -> &str;

    /// Only offered to global extensions
    fn global_only(&self) -> bool {
        false
    }

    fn provide(&self, scope: &ModuleScope<'_>) -> CapabilityModule;
}

/// Builds per-execution capability environments
#[derive(Clone, Default)]
pub struct CapabilityBuilder {
    services: HostServices,
    providers: Vec<Rc<dyn ModuleProvider>>,
}

impl CapabilityBuilder {
    pub fn new(services: HostServices) -> Self {
        Self {
            services,
            providers: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: impl ModuleProvider + 'static) -> Self {
        self.providers.push(Rc::new(provider));
        self
    }

    pub fn services(&self) -> &HostServices {
        &self.services
    }

    /// Build the environment for one execution
    ///
    /// Building has no side effects; the captured disposables list and UI
    /// store are only touched when a script calls into the environment.
    pub fn build(
        &self,
        extension_id: &ExtensionId,
        disposables: &DisposableList,
        ui_store: &UiStore,
        is_global: bool,
    ) -> CapabilityEnvironment {
        let mut env = CapabilityEnvironment::empty(extension_id.clone(), is_global);
        env.insert_module(ENV_MODULE, env_module(extension_id, is_global));
        env.insert_module(UI_MODULE, ui_module(ui_store));
        env.insert_module(
            CONTRIBUTIONS_MODULE,
            contributions_module(
                extension_id,
                disposables,
                &self.services.contributions,
                is_global,
            ),
        );
        env.insert_module(
            STYLE_MODULE,
            style_module(extension_id, disposables, &self.services.styles),
        );
        env.insert_module(
            NOTIFICATION_MODULE,
            notification_module(extension_id, &self.services.errors),
        );

        let scope = ModuleScope {
            extension_id,
            is_global,
            disposables,
            ui_store,
            services: &self.services,
        };
        for provider in &self.providers {
            if provider.global_only() && !is_global {
                continue;
            }
            env.insert_module(provider.name(), provider.provide(&scope));
        }
        env
    }
}

impl fmt::Debug for CapabilityBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityBuilder")
            .field("services", &self.services)
            .field("providers", &self.providers.len())
            .finish()
    }
}

fn arg_str<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument '{name}' must be a string"))
}

fn env_module(extension_id: &ExtensionId, is_global: bool) -> CapabilityModule {
    CapabilityModule::new()
        .with("extensionId", Capability::value(extension_id.as_str()))
        .with("isGlobal", Capability::value(is_global))
}

fn ui_module(ui_store: &UiStore) -> CapabilityModule {
    let keys_store = ui_store.clone();
    let has_store = ui_store.clone();
    CapabilityModule::new()
        .with(
            "keys",
            Capability::function(move |_| {
                Ok(keys_store
                    .keys()
                    .iter()
                    .map(|key| Value::String(key.to_string()))
                    .collect())
            }),
        )
        .with(
            "has",
            Capability::function(move |args| {
                let key = arg_str(args, 0, "key")?;
                Ok(Value::Bool(has_store.contains(&vessel_api::StoreKey::parse(key))))
            }),
        )
}

fn register_in(
    registry: &ContributionRegistry,
    disposables: &DisposableList,
    scope: ContributionScope,
    args: &[Value],
) -> Result<Value, String> {
    let kind = arg_str(args, 0, "kind")?.to_string();
    let name = arg_str(args, 1, "name")?.to_string();
    let data = args.get(2).cloned().unwrap_or(Value::Null);

    let registration = registry.register(scope.clone(), &kind, &name, data);
    let registry = registry.clone();
    disposables.push(DisposeFn::new(move || {
        registry.withdraw(&scope, &kind, &name, registration);
    }));
    Ok(Value::Null)
}

fn list_in(
    registry: &ContributionRegistry,
    scope: &ContributionScope,
    args: &[Value],
) -> Result<Value, String> {
    let kind = arg_str(args, 0, "kind")?;
    Ok(Value::Object(registry.list(scope, kind).into_iter().collect()))
}

fn contributions_module(
    extension_id: &ExtensionId,
    disposables: &DisposableList,
    registry: &ContributionRegistry,
    is_global: bool,
) -> CapabilityModule {
    let own = ContributionScope::Extension(extension_id.clone());
    let mut module = CapabilityModule::new();

    {
        let (registry, disposables, scope) = (registry.clone(), disposables.clone(), own.clone());
        module.insert(
            "register",
            Capability::function(move |args| {
                register_in(&registry, &disposables, scope.clone(), args)
            }),
        );
    }
    {
        let (registry, scope) = (registry.clone(), own.clone());
        module.insert(
            "get",
            Capability::function(move |args| {
                let kind = arg_str(args, 0, "kind")?;
                let name = arg_str(args, 1, "name")?;
                Ok(registry.get(&scope, kind, name).unwrap_or(Value::Null))
            }),
        );
    }
    {
        let (registry, scope) = (registry.clone(), own);
        module.insert(
            "list",
            Capability::function(move |args| list_in(&registry, &scope, args)),
        );
    }

    if is_global {
        let (registry_w, disposables) = (registry.clone(), disposables.clone());
        module.insert(
            "registerGlobal",
            Capability::function(move |args| {
                register_in(&registry_w, &disposables, ContributionScope::Global, args)
            }),
        );
        let registry_r = registry.clone();
        module.insert(
            "listGlobal",
            Capability::function(move |args| {
                list_in(&registry_r, &ContributionScope::Global, args)
            }),
        );
    }
    module
}

fn style_module(
    extension_id: &ExtensionId,
    disposables: &DisposableList,
    styles: &Rc<dyn StyleSink>,
) -> CapabilityModule {
    let (extension_id, disposables, styles) =
        (extension_id.clone(), disposables.clone(), Rc::clone(styles));
    CapabilityModule::new().with(
        "createStyleSheet",
        Capability::function(move |args| {
            let css = arg_str(args, 0, "css")?;
            disposables.push_boxed(styles.inject(&extension_id, css));
            Ok(Value::Null)
        }),
    )
}

fn notification_module(extension_id: &ExtensionId, errors: &Rc<dyn ErrorSink>) -> CapabilityModule {
    let (extension_id, errors) = (extension_id.clone(), Rc::clone(errors));
    CapabilityModule::new().with(
        "error",
        Capability::function(move |args| {
            let message = match args.first() {
                Some(Value::String(message)) => message.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            errors.report(
                &extension_id,
                &ExtensionError::Reported {
                    extension: extension_id.clone(),
                    message,
                },
            );
            Ok(Value::Null)
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::RecordingErrorSink;
    use serde_json::json;

    fn call(
        env: &CapabilityEnvironment,
        module: &str,
        member: &str,
        args: &[Value],
    ) -> Result<Value, String> {
        match env.module(module).and_then(|m| m.get(member)) {
            Some(Capability::Function(f)) => f(args),
            other => panic!("{module}.{member} is not a function: {other:?}"),
        }
    }

    struct Clock;

    impl ModuleProvider for Clock {
        fn name(&self) -> &str {
            "host/clock"
        }

        fn global_only(&self) -> bool {
            true
        }

        fn provide(&self, _scope: &ModuleScope<'_>) -> CapabilityModule {
            CapabilityModule::new().with("now", Capability::value(0))
        }
    }

    #[test]
    fn test_build_is_side_effect_free() {
        let builder = CapabilityBuilder::default();
        let disposables = DisposableList::new();
        let store = UiStore::new();
        let env = builder.build(&ExtensionId::new("ext"), &disposables, &store, false);

        assert_eq!(
            env.module_names(),
            vec![CONTRIBUTIONS_MODULE, ENV_MODULE, NOTIFICATION_MODULE, STYLE_MODULE, UI_MODULE]
        );
        assert!(disposables.is_empty());
        assert!(builder.services().contributions.is_empty());
    }

    #[test]
    fn test_global_capabilities_are_gated() {
        let builder = CapabilityBuilder::default().with_provider(Clock);
        let disposables = DisposableList::new();
        let store = UiStore::new();

        let local = builder.build(&ExtensionId::new("ext"), &disposables, &store, false);
        let members = local.module(CONTRIBUTIONS_MODULE).unwrap().member_names();
        assert_eq!(members, vec!["get", "list", "register"]);
        assert!(local.module("host/clock").is_none());

        let global = builder.build(&ExtensionId::new("ext"), &disposables, &store, true);
        let members = global.module(CONTRIBUTIONS_MODULE).unwrap().member_names();
        assert_eq!(members, vec!["get", "list", "listGlobal", "register", "registerGlobal"]);
        assert!(global.module("host/clock").is_some());
    }

    #[test]
    fn test_registrations_append_disposables() {
        let builder = CapabilityBuilder::default();
        let registry = builder.services().contributions.clone();
        let disposables = DisposableList::new();
        let store = UiStore::new();
        let env = builder.build(&ExtensionId::new("ext"), &disposables, &store, false);

        let args = [json!("command"), json!("run"), json!({"title": "Run"})];
        call(&env, CONTRIBUTIONS_MODULE, "register", &args).unwrap();
        assert_eq!(disposables.len(), 1);
        assert_eq!(
            call(&env, CONTRIBUTIONS_MODULE, "list", &[json!("command")]).unwrap(),
            json!({"run": {"title": "Run"}})
        );

        disposables.dispose_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_extensions_cannot_see_each_other() {
        let builder = CapabilityBuilder::default();
        let disposables = DisposableList::new();
        let store = UiStore::new();
        let a = builder.build(&ExtensionId::new("a"), &disposables, &store, false);
        let b = builder.build(&ExtensionId::new("b"), &disposables, &store, false);

        let key = [json!("command"), json!("x")];
        call(&a, CONTRIBUTIONS_MODULE, "register", &[key[0].clone(), key[1].clone(), json!(1)])
            .unwrap();
        assert_eq!(call(&b, CONTRIBUTIONS_MODULE, "get", &key).unwrap(), Value::Null);
        assert_eq!(call(&a, CONTRIBUTIONS_MODULE, "get", &key).unwrap(), json!(1));
    }

    #[test]
    fn test_notification_reports_to_sink() {
        let errors = RecordingErrorSink::new();
        let services = HostServices::new(
            Rc::new(errors.clone()),
            Rc::new(MemoryStyleSink::new()),
            ContributionRegistry::new(),
        );
        let builder = CapabilityBuilder::new(services);
        let env = builder.build(
            &ExtensionId::new("ext"),
            &DisposableList::new(),
            &UiStore::new(),
            false,
        );

        call(&env, NOTIFICATION_MODULE, "error", &[json!("boom")]).unwrap();
        assert_eq!(errors.messages(), vec!["Extension 'ext' reported: boom".to_string()]);
    }

    #[test]
    fn test_bad_arguments_are_errors() {
        let builder = CapabilityBuilder::default();
        let env = builder.build(
            &ExtensionId::new("ext"),
            &DisposableList::new(),
            &UiStore::new(),
            false,
        );
        let err = call(&env, STYLE_MODULE, "createStyleSheet", &[json!(42)]).unwrap_err();
        assert!(err.contains("css"));
    }
}
