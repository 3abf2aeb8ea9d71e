//! Script tree loader
//!
//! Runs every file below a scripts directory once, for its side effects.
//! `.ts` files are stripped of types first; everything else is plain
//! JavaScript. Bodies run in async mode so they may `await`.

use crate::capability::CapabilityBuilder;
use crate::config::FailurePolicy;
use crate::error::{ExtensionError, ExtensionResult};
use crate::executor::{ExecutionMode, ScriptExecutor, ScriptOrigin, ScriptRequest};
use crate::store::UiStore;
use futures::future::{try_join_all, FutureExt, LocalBoxFuture};
use std::rc::Rc;
use vessel_api::{DirectoryHandle, DisposableList, Entry, ExtensionId, FileSystem, ScriptLanguage};

/// Outcome of loading a script tree
#[derive(Debug, Default)]
pub struct ScriptLoadReport {
    /// Paths of the scripts that ran to completion
    pub executed: Vec<String>,

    /// Scripts that failed, with their errors
    pub failures: Vec<(String, ExtensionError)>,
}

impl ScriptLoadReport {
    /// Returns true if every script ran
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of script files found
    pub fn total_found(&self) -> usize {
        self.executed.len() + self.failures.len()
    }

    fn merge(&mut self, other: ScriptLoadReport) {
        self.executed.extend(other.executed);
        self.failures.extend(other.failures);
    }
}

/// Per-call state shared by every file of one traversal
struct Scope<'a> {
    ui_store: &'a UiStore,
    disposables: &'a DisposableList,
    is_global: bool,
    extension_id: &'a ExtensionId,
}

/// Executes script trees against fresh capability environments
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    executor: ScriptExecutor,
    capabilities: CapabilityBuilder,
    policy: FailurePolicy,
}

impl ScriptLoader {
    pub fn new(executor: ScriptExecutor, capabilities: CapabilityBuilder) -> Self {
        Self {
            executor,
            capabilities,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run every script below `root`
    ///
    /// File paths are reported relative to the extension, starting with the
    /// root's own name. Directory enumeration errors are returned. A failing
    /// file is handled according to the [`FailurePolicy`].
    pub async fn load_scripts(
        &self,
        root: Rc<dyn DirectoryHandle>,
        ui_store: &UiStore,
        disposables: &DisposableList,
        is_global: bool,
        extension_id: &ExtensionId,
    ) -> ExtensionResult<ScriptLoadReport> {
        let scope = Scope {
            ui_store,
            disposables,
            is_global,
            extension_id,
        };
        let prefix = root.name().to_string();
        let report = self.walk(root, prefix, &scope).await?;

        tracing::info!(
            extension = %extension_id,
            executed = report.executed.len(),
            failed = report.failures.len(),
            "Loaded scripts"
        );
        Ok(report)
    }

    fn walk<'a>(
        &'a self,
        dir: Rc<dyn DirectoryHandle>,
        path: String,
        scope: &'a Scope<'a>,
    ) -> LocalBoxFuture<'a, ExtensionResult<ScriptLoadReport>> {
        async move {
            let entries = dir
                .entries()
                .await
                .map_err(|source| ExtensionError::ReadDirectory {
                    path: path.clone(),
                    source,
                })?;

            let tasks = entries.into_iter().map(|entry| {
                let child = join(&path, entry.name());
                async move {
                    match entry {
                        Entry::Directory(dir) => self.walk(dir, child, scope).await,
                        Entry::File(file) => {
                            let outcome = match file.text().await {
                                Ok(code) => self.run(code, &child, scope).await,
                                Err(source) => Err(ExtensionError::ReadFile {
                                    path: child.clone(),
                                    source,
                                }),
                            };
                            self.settle(child, outcome, scope)
                        }
                    }
                }
            });

            let mut report = ScriptLoadReport::default();
            for part in try_join_all(tasks).await? {
                report.merge(part);
            }
            Ok(report)
        }
        .boxed_local()
    }

    /// Apply the failure policy to one file's outcome
    fn settle(
        &self,
        path: String,
        outcome: ExtensionResult<()>,
        scope: &Scope<'_>,
    ) -> ExtensionResult<ScriptLoadReport> {
        let mut report = ScriptLoadReport::default();
        match outcome {
            Ok(()) => report.executed.push(path),
            Err(err) => match self.policy {
                FailurePolicy::FailFast => return Err(err),
                FailurePolicy::Isolate => {
                    self.capabilities.services().report(scope.extension_id, &err);
                    report.failures.push((path, err));
                }
            },
        }
        Ok(report)
    }

    async fn run(&self, code: String, path: &str, scope: &Scope<'_>) -> ExtensionResult<()> {
        let language = ScriptLanguage::from_file_name(path);
        tracing::debug!(extension = %scope.extension_id, path, ?language, "Running script");

        let env = self.capabilities.build(
            scope.extension_id,
            scope.disposables,
            scope.ui_store,
            scope.is_global,
        );
        let request = ScriptRequest::new(code, ScriptOrigin::new(scope.extension_id.clone(), path))
            .language(language)
            .mode(ExecutionMode::Async);
        self.executor.execute(request, &env).await?;
        Ok(())
    }

    /// Run a single script file addressed through `fs`
    pub async fn load_script_file(
        &self,
        fs: &dyn FileSystem,
        path: &str,
        ui_store: &UiStore,
        disposables: &DisposableList,
        is_global: bool,
        extension_id: &ExtensionId,
    ) -> ExtensionResult<()> {
        let code = fs
            .read_file(path)
            .await
            .map_err(|source| ExtensionError::ReadFile {
                path: path.to_string(),
                source,
            })?;
        let scope = Scope {
            ui_store,
            disposables,
            is_global,
            extension_id,
        };
        self.run(code, path, &scope).await
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}
