//! File watcher for extension directories
//!
//! Watches an extension root recursively and delivers debounced batches of
//! changed paths, relative to the root and `/`-separated, ready for
//! [`Activation::reload`](crate::runtime::Activation::reload).

use crate::config::WatchConfig;
use crate::error::{ExtensionError, ExtensionResult};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tokio::sync::mpsc;

/// Debounced watcher over one extension root
pub struct ExtensionWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
    batches: mpsc::Receiver<Vec<String>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl ExtensionWatcher {
    /// Start watching `root`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(root: impl AsRef<Path>, config: &WatchConfig) -> ExtensionResult<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|source| ExtensionError::ReadDirectory {
            path: root.display().to_string(),
            source,
        })?;

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(100);
        let (batch_tx, batches) = mpsc::channel::<Vec<String>>(16);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = event_tx.blocking_send(event);
                }
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            })
            .map_err(ExtensionError::Watch)?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(ExtensionError::Watch)?;
        tracing::info!(dir = %root.display(), "Watching extension directory");

        let task_root = root.clone();
        let debounce = config.debounce();
        tokio::spawn(async move {
            let mut pending: BTreeSet<String> = BTreeSet::new();
            let mut deadline: Option<tokio::time::Instant> = None;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Extension watcher shutting down");
                        break;
                    }

                    Some(event) = event_rx.recv() => {
                        // Reads made while reloading must not trigger another reload
                        if event.kind.is_access() {
                            continue;
                        }
                        for path in &event.paths {
                            if let Some(relative) = relative_path(&task_root, path) {
                                pending.insert(relative);
                                deadline = Some(tokio::time::Instant::now() + debounce);
                            }
                        }
                    }

                    _ = async {
                        match deadline {
                            Some(deadline) => tokio::time::sleep_until(deadline).await,
                            None => std::future::pending::<()>().await,
                        }
                    } => {
                        deadline = None;
                        let batch: Vec<String> = std::mem::take(&mut pending).into_iter().collect();
                        tracing::debug!(changes = batch.len(), "Delivering change batch");
                        if batch_tx.send(batch).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            root,
            _watcher: watcher,
            batches,
            shutdown_tx,
        })
    }

    /// The canonical root being watched
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Wait for the next batch of changed paths
    ///
    /// Returns `None` once the watcher has shut down.
    pub async fn next_batch(&mut self) -> Option<Vec<String>> {
        self.batches.recv().await
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl std::fmt::Debug for ExtensionWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionWatcher")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let segments: Vec<&str> = relative
        .components()
        .map(|component| match component {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    (!segments.is_empty()).then(|| segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_relative_path() {
        let root = Path::new("/ext");
        assert_eq!(
            relative_path(root, Path::new("/ext/ui/panels/main.vue")).as_deref(),
            Some("ui/panels/main.vue")
        );
        assert_eq!(relative_path(root, Path::new("/ext")), None);
        assert_eq!(relative_path(root, Path::new("/other/a.js")), None);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        let err = ExtensionWatcher::new(missing, &WatchConfig::default()).unwrap_err();
        assert!(matches!(err, ExtensionError::ReadDirectory { .. }));
    }

    #[tokio::test]
    async fn test_delivers_relative_batch() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("ui")).unwrap();

        let mut watcher =
            ExtensionWatcher::new(temp.path(), &WatchConfig { debounce_ms: 50 }).unwrap();
        fs::write(temp.path().join("ui").join("main.vue"), "<template><div/></template>").unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), watcher.next_batch())
            .await
            .expect("no batch delivered")
            .expect("watcher closed");
        assert!(batch.contains(&"ui/main.vue".to_string()), "{batch:?}");

        watcher.shutdown().await;
    }
}
