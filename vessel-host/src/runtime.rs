//! Extension activation
//!
//! [`ExtensionRuntime`] ties the loaders together: activating an extension
//! loads its UI root first, then runs its scripts root. The resulting
//! [`Activation`] owns the UI store and the disposables of that activation.

use crate::capability::{CapabilityBuilder, HostServices, ModuleProvider};
use crate::config::{FailurePolicy, VesselConfig};
use crate::error::{ExtensionError, ExtensionResult};
use crate::executor::ScriptExecutor;
use crate::scripts::{ScriptLoadReport, ScriptLoader};
use crate::store::{ComponentResult, UiStore};
use crate::template::{MarkupCompiler, TemplateCompiler};
use crate::ui::UiLoader;
use std::fmt;
use std::io;
use std::rc::Rc;
use vessel_api::{DisposableList, ExtensionId, FileSystem, StoreKey};

/// Host-facing entry point for loading extensions
#[derive(Clone)]
pub struct ExtensionRuntime {
    config: VesselConfig,
    capabilities: CapabilityBuilder,
    executor: ScriptExecutor,
    compiler: Rc<dyn TemplateCompiler>,
}

impl ExtensionRuntime {
    pub fn new(config: VesselConfig) -> Self {
        Self::with_capabilities(config, CapabilityBuilder::default())
    }

    pub fn with_services(config: VesselConfig, services: HostServices) -> Self {
        Self::with_capabilities(config, CapabilityBuilder::new(services))
    }

    pub fn with_capabilities(config: VesselConfig, capabilities: CapabilityBuilder) -> Self {
        Self {
            executor: ScriptExecutor::new(config.executor.clone()),
            config,
            capabilities,
            compiler: Rc::new(MarkupCompiler),
        }
    }

    /// Offer an extra module to every extension
    pub fn with_provider(mut self, provider: impl ModuleProvider + 'static) -> Self {
        self.capabilities = self.capabilities.with_provider(provider);
        self
    }

    pub fn with_compiler(mut self, compiler: Rc<dyn TemplateCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn config(&self) -> &VesselConfig {
        &self.config
    }

    pub fn services(&self) -> &HostServices {
        self.capabilities.services()
    }

    pub fn ui_loader(&self) -> UiLoader {
        UiLoader::new(self.executor.clone(), self.capabilities.clone())
            .with_config(&self.config.loader)
            .with_compiler(Rc::clone(&self.compiler))
    }

    pub fn script_loader(&self) -> ScriptLoader {
        ScriptLoader::new(self.executor.clone(), self.capabilities.clone())
            .with_policy(self.config.loader.failure_policy)
    }

    /// Load an extension: UI components first, then scripts
    ///
    /// A missing scripts root is not an error. If script loading fails under
    /// [`FailurePolicy::FailFast`](FailurePolicy::FailFast), everything
    /// acquired so far is released before the error is returned.
    pub async fn activate(
        &self,
        extension_id: ExtensionId,
        fs: Rc<dyn FileSystem>,
        is_global: bool,
    ) -> ExtensionResult<Activation> {
        tracing::info!(extension = %extension_id, is_global, "Activating extension");
        let mut activation = Activation {
            runtime: self.clone(),
            extension_id,
            is_global,
            fs,
            ui_store: UiStore::new(),
            disposables: DisposableList::new(),
            scripts: ScriptLoadReport::default(),
        };

        self.ui_loader()
            .load_ui_components(
                &activation.fs,
                &activation.extension_id,
                &activation.ui_store,
                &activation.disposables,
                &self.config.loader.ui_root,
            )
            .await;

        match activation.load_scripts_root().await {
            Ok(report) => activation.scripts = report,
            Err(err) => {
                activation.release();
                return Err(err);
            }
        }

        tracing::info!(
            extension = %activation.extension_id,
            components = activation.ui_store.len(),
            scripts = activation.scripts.executed.len(),
            "Extension activated"
        );
        Ok(activation)
    }
}

/// What [`Activation::reload`] changed
#[derive(Debug, Default)]
pub struct ReloadSummary {
    /// Component files that were loaded again
    pub components: Vec<String>,

    /// Store keys dropped because their files are gone
    pub removed: Vec<StoreKey>,

    pub scripts: ScriptLoadReport,
}

impl ReloadSummary {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.removed.is_empty() && self.scripts.total_found() == 0
    }
}

/// One loaded extension
pub struct Activation {
    runtime: ExtensionRuntime,
    extension_id: ExtensionId,
    is_global: bool,
    fs: Rc<dyn FileSystem>,
    ui_store: UiStore,
    disposables: DisposableList,
    scripts: ScriptLoadReport,
}

impl Activation {
    pub fn extension_id(&self) -> &ExtensionId {
        &self.extension_id
    }

    pub fn is_global(&self) -> bool {
        self.is_global
    }

    pub fn ui_store(&self) -> &UiStore {
        &self.ui_store
    }

    pub fn disposables(&self) -> &DisposableList {
        &self.disposables
    }

    /// Report of the initial script run
    pub fn scripts(&self) -> &ScriptLoadReport {
        &self.scripts
    }

    /// Resolve a published component by its `/`-separated key
    pub async fn component(&self, key: &str) -> Option<ComponentResult> {
        self.ui_store.resolve(&StoreKey::parse(key)).await
    }

    async fn load_scripts_root(&self) -> ExtensionResult<ScriptLoadReport> {
        let root = &self.runtime.config.loader.scripts_root;
        match self.fs.directory(root).await {
            Ok(dir) => {
                self.runtime
                    .script_loader()
                    .load_scripts(
                        dir,
                        &self.ui_store,
                        &self.disposables,
                        self.is_global,
                        &self.extension_id,
                    )
                    .await
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(
                    extension = %self.extension_id,
                    path = %root,
                    "No scripts directory"
                );
                Ok(ScriptLoadReport::default())
            }
            Err(source) => Err(ExtensionError::ReadDirectory {
                path: root.clone(),
                source,
            }),
        }
    }

    /// Apply changes to the given extension-relative paths
    ///
    /// Component files are loaded again or dropped from the store when they
    /// no longer exist; new UI directories are loaded. Changed scripts run
    /// again; their earlier side effects stay until deactivation.
    pub async fn reload(&self, paths: &[String]) -> ExtensionResult<ReloadSummary> {
        let mut summary = ReloadSummary::default();
        let loader = &self.runtime.config.loader;

        for path in paths {
            let path = path.trim_matches('/');
            if is_below(path, &loader.ui_root) {
                self.reload_ui_path(path, &mut summary).await;
            } else if is_below(path, &loader.scripts_root) {
                self.reload_script_path(path, &mut summary).await?;
            } else {
                tracing::debug!(
                    extension = %self.extension_id,
                    path,
                    "Ignoring change outside extension roots"
                );
            }
        }

        tracing::info!(
            extension = %self.extension_id,
            components = summary.components.len(),
            removed = summary.removed.len(),
            scripts = summary.scripts.total_found(),
            "Reloaded extension"
        );
        Ok(summary)
    }

    async fn reload_ui_path(&self, path: &str, summary: &mut ReloadSummary) {
        let ui = self.runtime.ui_loader();
        if self.fs.directory(path).await.is_ok() {
            ui.load_ui_components(
                &self.fs,
                &self.extension_id,
                &self.ui_store,
                &self.disposables,
                path,
            )
            .await;
            summary.components.push(path.to_string());
            return;
        }

        match self.fs.read_file(path).await {
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let removed = if ui.is_component_file(path) {
                    let key = ui.key_for(path);
                    self.ui_store.remove(&key).map(|_| vec![key]).unwrap_or_default()
                } else {
                    self.remove_below(&ui.key_for(path))
                };
                summary.removed.extend(removed);
            }
            _ => {
                ui.load_ui_component(
                    &self.fs,
                    path,
                    &self.extension_id,
                    &self.ui_store,
                    &self.disposables,
                )
                .await;
                summary.components.push(path.to_string());
            }
        }
    }

    /// Drop every key inside a deleted UI directory
    fn remove_below(&self, prefix: &StoreKey) -> Vec<StoreKey> {
        if prefix.is_empty() {
            return Vec::new();
        }
        let removed: Vec<StoreKey> = self
            .ui_store
            .keys()
            .into_iter()
            .filter(|key| key.segments().starts_with(prefix.segments()))
            .collect();
        for key in &removed {
            self.ui_store.remove(key);
        }
        removed
    }

    async fn reload_script_path(
        &self,
        path: &str,
        summary: &mut ReloadSummary,
    ) -> ExtensionResult<()> {
        let scripts = self.runtime.script_loader();
        if let Ok(dir) = self.fs.directory(path).await {
            let report = scripts
                .load_scripts(
                    dir,
                    &self.ui_store,
                    &self.disposables,
                    self.is_global,
                    &self.extension_id,
                )
                .await?;
            // Nested paths come back relative to the directory name
            let parent = path.rsplit_once('/').map(|(parent, _)| parent);
            summary.scripts.executed.extend(
                report
                    .executed
                    .into_iter()
                    .map(|child| prefixed(parent, child)),
            );
            summary.scripts.failures.extend(
                report
                    .failures
                    .into_iter()
                    .map(|(child, err)| (prefixed(parent, child), err)),
            );
            return Ok(());
        }

        match scripts
            .load_script_file(
                &*self.fs,
                path,
                &self.ui_store,
                &self.disposables,
                self.is_global,
                &self.extension_id,
            )
            .await
        {
            Ok(()) => summary.scripts.executed.push(path.to_string()),
            Err(ExtensionError::ReadFile { source, .. })
                if source.kind() == io::ErrorKind::NotFound =>
            {
                tracing::debug!(extension = %self.extension_id, path, "Script removed");
            }
            Err(err) => match scripts.policy() {
                FailurePolicy::FailFast => return Err(err),
                FailurePolicy::Isolate => {
                    self.runtime.services().report(&self.extension_id, &err);
                    summary.scripts.failures.push((path.to_string(), err));
                }
            },
        }
        Ok(())
    }

    fn release(&self) -> usize {
        let disposed = self.disposables.dispose_all();
        self.ui_store.clear();
        self.runtime
            .services()
            .contributions
            .remove_extension(&self.extension_id);
        disposed
    }

    /// Dispose everything this activation acquired
    ///
    /// Returns the number of disposed resources.
    pub fn deactivate(self) -> usize {
        let disposed = self.release();
        tracing::info!(extension = %self.extension_id, disposed, "Extension deactivated");
        disposed
    }
}

impl fmt::Debug for ExtensionRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRuntime")
            .field("config", &self.config)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("extension_id", &self.extension_id)
            .field("is_global", &self.is_global)
            .field("ui_store", &self.ui_store)
            .field("disposables", &self.disposables)
            .finish_non_exhaustive()
    }
}

fn is_below(path: &str, root: &str) -> bool {
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn prefixed(parent: Option<&str>, child: String) -> String {
    match parent {
        Some(parent) => format!("{parent}/{child}"),
        None => child,
    }
}
