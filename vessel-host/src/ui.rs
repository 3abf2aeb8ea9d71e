//! UI component tree loader
//!
//! Walks the UI root of an extension and turns every component file into a
//! [`ComponentDefinition`] published in the activation's [`UiStore`].
//!
//! Per file the pipeline is strictly sequential:
//!
//! ```text
//! read -> split blocks -> run script (sync) -> compile template
//!      -> merge widgets -> inject styles -> definition
//! ```
//!
//! The store entry is set to the pending factory before the pipeline starts
//! and set again once it settles. Siblings run concurrently and never affect
//! each other.

use crate::capability::CapabilityBuilder;
use crate::config::LoaderConfig;
use crate::error::{ExtensionError, ExtensionResult};
use crate::executor::{ExecutionMode, ScriptExecutor, ScriptOrigin, ScriptRequest};
use crate::sfc::parse_component;
use crate::store::{ComponentDefinition, ComponentFactory, UiStore};
use crate::template::{MarkupCompiler, TemplateCompiler, PLACEHOLDER_TEMPLATE};
use crate::widgets::{base_widget_library, ComponentRef};
use futures::future::{join_all, FutureExt, LocalBoxFuture};
use std::fmt;
use std::rc::Rc;
use vessel_api::{DisposableList, EntryKind, ExtensionId, FileSystem, ScriptLanguage, StoreKey};

/// Loads `.vue`-style component files into a [`UiStore`]
#[derive(Clone)]
pub struct UiLoader {
    executor: ScriptExecutor,
    capabilities: CapabilityBuilder,
    compiler: Rc<dyn TemplateCompiler>,
    ui_root: String,
    component_suffix: String,
}

impl UiLoader {
    pub fn new(executor: ScriptExecutor, capabilities: CapabilityBuilder) -> Self {
        let defaults = LoaderConfig::default();
        Self {
            executor,
            capabilities,
            compiler: Rc::new(MarkupCompiler),
            ui_root: defaults.ui_root,
            component_suffix: defaults.component_suffix,
        }
    }

    /// Use `config`'s UI root and component suffix
    pub fn with_config(mut self, config: &LoaderConfig) -> Self {
        self.ui_root = config.ui_root.clone();
        self.component_suffix = config.component_suffix.clone();
        self
    }

    pub fn with_compiler(mut self, compiler: Rc<dyn TemplateCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn ui_root(&self) -> &str {
        &self.ui_root
    }

    pub fn is_component_file(&self, path: &str) -> bool {
        path.ends_with(&self.component_suffix)
    }

    /// Store key of the component at `path`
    pub fn key_for(&self, path: &str) -> StoreKey {
        StoreKey::from_component_path(path, &self.ui_root, &self.component_suffix)
    }

    /// Load every component below `base_path`
    ///
    /// A directory that cannot be listed counts as empty.
    pub fn load_ui_components<'a>(
        &'a self,
        fs: &'a Rc<dyn FileSystem>,
        extension_id: &'a ExtensionId,
        ui_store: &'a UiStore,
        disposables: &'a DisposableList,
        base_path: &'a str,
    ) -> LocalBoxFuture<'a, ()> {
        async move {
            let entries = match fs.read_dir(base_path).await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::debug!(
                        extension = %extension_id,
                        path = base_path,
                        error = %err,
                        "UI directory not listed, treating as empty"
                    );
                    Vec::new()
                }
            };

            let tasks = entries.into_iter().map(|entry| {
                let path = format!("{base_path}/{}", entry.name);
                async move {
                    match entry.kind {
                        EntryKind::File => {
                            self.load_ui_component(fs, &path, extension_id, ui_store, disposables)
                                .await
                        }
                        EntryKind::Directory => {
                            self.load_ui_components(fs, extension_id, ui_store, disposables, &path)
                                .await
                        }
                    }
                }
            });
            join_all(tasks).await;
        }
        .boxed_local()
    }

    /// Load one component file and publish it
    ///
    /// Failures are reported to the error sink, never returned.
    pub async fn load_ui_component(
        &self,
        fs: &Rc<dyn FileSystem>,
        component_path: &str,
        extension_id: &ExtensionId,
        ui_store: &UiStore,
        disposables: &DisposableList,
    ) {
        if !self.is_component_file(component_path) {
            let file = component_path
                .rsplit('/')
                .next()
                .unwrap_or(component_path)
                .to_string();
            self.capabilities.services().report(
                extension_id,
                &ExtensionError::NotAComponentFile {
                    path: component_path.to_string(),
                    file,
                },
            );
            return;
        }

        let key = self.key_for(component_path);
        let factory = {
            let loader = self.clone();
            let fs = Rc::clone(fs);
            let path = component_path.to_string();
            let key = key.clone();
            let extension_id = extension_id.clone();
            let ui_store = ui_store.clone();
            let disposables = disposables.clone();
            ComponentFactory::new(async move {
                loader
                    .build_component(&*fs, &path, key, &extension_id, &ui_store, &disposables)
                    .await
                    .map(Rc::new)
                    .map_err(Rc::new)
            })
        };

        ui_store.set(key.clone(), factory.clone());
        tracing::debug!(extension = %extension_id, key = %key, "Published pending component");

        match factory.resolve().await {
            Ok(definition) => {
                ui_store.set(key.clone(), factory);
                tracing::info!(
                    extension = %extension_id,
                    key = %key,
                    path = %definition.path,
                    "Loaded component"
                );
            }
            Err(err) if matches!(*err, ExtensionError::Parse { .. }) => {
                ui_store.remove_if(&key, factory.id());
                tracing::warn!(
                    extension = %extension_id,
                    key = %key,
                    "Component withdrawn after parse errors"
                );
            }
            Err(_) => {
                ui_store.set(key.clone(), factory);
                tracing::warn!(extension = %extension_id, key = %key, "Component failed to load");
            }
        }
    }

    /// Run the pipeline for one file; every failure is reported exactly once
    async fn build_component(
        &self,
        fs: &dyn FileSystem,
        path: &str,
        key: StoreKey,
        extension_id: &ExtensionId,
        ui_store: &UiStore,
        disposables: &DisposableList,
    ) -> ExtensionResult<ComponentDefinition> {
        let result = self
            .try_build_component(fs, path, key, extension_id, ui_store, disposables)
            .await;
        if let Err(err) = &result {
            // Parse errors are reported one by one as they are found
            if !matches!(err, ExtensionError::Parse { .. }) {
                self.capabilities.services().report(extension_id, err);
            }
        }
        result
    }

    async fn try_build_component(
        &self,
        fs: &dyn FileSystem,
        path: &str,
        key: StoreKey,
        extension_id: &ExtensionId,
        ui_store: &UiStore,
        disposables: &DisposableList,
    ) -> ExtensionResult<ComponentDefinition> {
        // 1. Read and split into blocks
        let source = fs
            .read_file(path)
            .await
            .map_err(|source| ExtensionError::ReadFile {
                path: path.to_string(),
                source,
            })?;
        let descriptor = parse_component(&source);

        if let Some(first) = descriptor.errors.first() {
            for error in &descriptor.errors {
                self.capabilities.services().report(
                    extension_id,
                    &ExtensionError::Parse {
                        path: path.to_string(),
                        source: error.clone(),
                    },
                );
            }
            return Err(ExtensionError::Parse {
                path: path.to_string(),
                source: first.clone(),
            });
        }

        // 2. Run the script block; its default export becomes the options
        let (code, language) = match &descriptor.script {
            Some(script) => (
                script.content.replacen("export default", "return", 1),
                script
                    .lang()
                    .map(ScriptLanguage::from_lang_attr)
                    .unwrap_or_default(),
            ),
            None => (String::new(), ScriptLanguage::JavaScript),
        };
        let env = self
            .capabilities
            .build(extension_id, disposables, ui_store, false);
        let request = ScriptRequest::new(code, ScriptOrigin::new(extension_id.clone(), path))
            .language(language)
            .mode(ExecutionMode::Sync);
        let options = self.executor.execute(request, &env).await?;

        // 3. Compile the template
        let markup = descriptor
            .template
            .as_ref()
            .map(|template| template.content.as_str())
            .unwrap_or(PLACEHOLDER_TEMPLATE);
        let render = self
            .compiler
            .compile(markup)
            .map_err(|source| ExtensionError::Template {
                path: path.to_string(),
                source,
            })?;

        // 4. Base widgets first, the script's own components win
        let mut components = base_widget_library();
        if let Some(declared) = options.get("components")? {
            for (name, component) in declared.entries()? {
                components.insert(name, ComponentRef::Script(component));
            }
        }

        // 5. Styles
        let styles = &self.capabilities.services().styles;
        for style in &descriptor.styles {
            disposables.push_boxed(styles.inject(extension_id, &style.content));
        }

        Ok(ComponentDefinition {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            key,
            path: path.to_string(),
            options,
            render,
            components,
        })
    }
}

impl fmt::Debug for UiLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiLoader")
            .field("executor", &self.executor)
            .field("ui_root", &self.ui_root)
            .field("component_suffix", &self.component_suffix)
            .finish_non_exhaustive()
    }
}
