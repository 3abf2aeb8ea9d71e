//! vessel-api: Shared contract types for the vessel extension runtime
//!
//! This crate defines what a host hands to the runtime (file trees, extension
//! identity, disposables) and how the artifacts it produces are addressed.
//! Everything here is single-threaded: handles are shared through `Rc` and the
//! async traits do not require `Send`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::io;
use std::rc::Rc;

/// Opaque identity of one extension instance
///
/// Used purely as a namespacing key; the runtime never parses it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionId(String);

impl ExtensionId {
    /// Create a new extension id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExtensionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ExtensionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Source dialect of an extension script
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptLanguage {
    /// Plain JavaScript, executed as-is
    #[default]
    JavaScript,

    /// TypeScript, stripped of type syntax before execution
    TypeScript,
}

impl ScriptLanguage {
    /// Classify a script by its file name (`.ts` is TypeScript, anything else JavaScript)
    pub fn from_file_name(name: &str) -> Self {
        if name.ends_with(".ts") {
            Self::TypeScript
        } else {
            Self::JavaScript
        }
    }

    /// Classify a `<script lang="...">` attribute value
    pub fn from_lang_attr(lang: &str) -> Self {
        match lang.trim() {
            "ts" | "typescript" => Self::TypeScript,
            _ => Self::JavaScript,
        }
    }
}

/// Kind of a directory child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    File,
}

/// A named directory child as returned by [`FileSystem::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }
}

/// A child handle yielded while enumerating a [`DirectoryHandle`]
#[derive(Clone)]
pub enum Entry {
    Directory(Rc<dyn DirectoryHandle>),
    File(Rc<dyn FileHandle>),
}

impl Entry {
    /// Name of the child inside its parent directory
    pub fn name(&self) -> &str {
        match self {
            Self::Directory(dir) => dir.name(),
            Self::File(file) => file.name(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Directory(_) => EntryKind::Directory,
            Self::File(_) => EntryKind::File,
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// A host-owned, read-only directory node
///
/// Children come back in no particular order.
#[async_trait(?Send)]
pub trait DirectoryHandle {
    fn name(&self) -> &str;

    async fn entries(&self) -> io::Result<Vec<Entry>>;
}

/// A host-owned, read-only file node
#[async_trait(?Send)]
pub trait FileHandle {
    fn name(&self) -> &str;

    /// Read the full text content of the file
    async fn text(&self) -> io::Result<String>;
}

/// Path-addressed view of an extension's file tree
///
/// Paths are `/`-separated and relative to the extension root.
#[async_trait(?Send)]
pub trait FileSystem {
    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    async fn read_file(&self, path: &str) -> io::Result<String>;

    /// Open a directory as an enumerable handle
    async fn directory(&self, path: &str) -> io::Result<Rc<dyn DirectoryHandle>>;
}

/// A resource acquired on behalf of an extension
pub trait Disposable {
    fn dispose(&mut self);
}

/// [`Disposable`] backed by a one-shot closure
pub struct DisposeFn<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> DisposeFn<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Disposable for DisposeFn<F> {
    fn dispose(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Caller-owned list of acquired resources
///
/// Clones share the same list. The runtime only ever appends; iterating and
/// disposing is the host's job.
#[derive(Clone, Default)]
pub struct DisposableList {
    inner: Rc<RefCell<Vec<Box<dyn Disposable>>>>,
}

impl DisposableList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, disposable: impl Disposable + 'static) {
        self.push_boxed(Box::new(disposable));
    }

    pub fn push_boxed(&self, disposable: Box<dyn Disposable>) {
        self.inner.borrow_mut().push(disposable);
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Dispose every held resource, newest first, and empty the list
    ///
    /// Returns the number of disposed resources.
    pub fn dispose_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.inner.borrow_mut());
        let count = drained.len();
        for mut disposable in drained.into_iter().rev() {
            disposable.dispose();
        }
        count
    }
}

impl fmt::Debug for DisposableList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableList")
            .field("len", &self.len())
            .finish()
    }
}

/// Address of a published UI component: the path segments below the UI root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreKey(Vec<String>);

impl StoreKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a `/`-separated key such as `panels/main`
    pub fn parse(key: &str) -> Self {
        Self(split_segments(key))
    }

    /// Derive the key of a component file
    ///
    /// `root` (e.g. `ui`) is removed from the front of `path`, the rest is
    /// split on path separators and `suffix` (e.g. `.vue`) is dropped from the
    /// last segment: `ui/panels/main.vue` becomes `["panels", "main"]`.
    pub fn from_component_path(path: &str, root: &str, suffix: &str) -> Self {
        let relative = path
            .strip_prefix(root)
            .and_then(|rest| rest.strip_prefix(SEPARATORS))
            .unwrap_or(path);

        let mut segments = split_segments(relative);
        if let Some(last) = segments.last_mut() {
            if let Some(stem) = last.strip_suffix(suffix) {
                if !stem.is_empty() {
                    *last = stem.to_string();
                }
            }
        }
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

const SEPARATORS: &[char] = &['/', '\\'];

fn split_segments(path: &str) -> Vec<String> {
    path.split(SEPARATORS)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_language_from_file_name() {
        assert_eq!(ScriptLanguage::from_file_name("main.ts"), ScriptLanguage::TypeScript);
        assert_eq!(ScriptLanguage::from_file_name("main.js"), ScriptLanguage::JavaScript);
        assert_eq!(ScriptLanguage::from_file_name("main.tsx"), ScriptLanguage::JavaScript);
        assert_eq!(ScriptLanguage::from_file_name("README"), ScriptLanguage::JavaScript);
    }

    #[test]
    fn test_language_from_lang_attr() {
        assert_eq!(ScriptLanguage::from_lang_attr("ts"), ScriptLanguage::TypeScript);
        assert_eq!(ScriptLanguage::from_lang_attr("js"), ScriptLanguage::JavaScript);
    }

    #[test]
    fn test_store_key_from_component_path() {
        let key = StoreKey::from_component_path("ui/panels/main.vue", "ui", ".vue");
        assert_eq!(key, StoreKey::new(["panels", "main"]));
        assert_eq!(key.to_string(), "panels/main");

        let nested = StoreKey::from_component_path("ui/a/b/c.vue", "ui", ".vue");
        assert_eq!(nested.segments(), ["a", "b", "c"]);
    }

    #[test]
    fn test_store_key_only_strips_leading_root() {
        let key = StoreKey::from_component_path("ui/build/ui/x.vue", "ui", ".vue");
        assert_eq!(key.segments(), ["build", "ui", "x"]);
    }

    #[test]
    fn test_store_key_parse() {
        assert_eq!(StoreKey::parse("/panels//main"), StoreKey::new(["panels", "main"]));
    }

    #[test]
    fn test_disposable_list_disposes_newest_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let list = DisposableList::new();
        for i in 0..3 {
            let order = order.clone();
            list.push(DisposeFn::new(move || order.borrow_mut().push(i)));
        }

        let shared = list.clone();
        assert_eq!(shared.len(), 3);
        assert_eq!(list.dispose_all(), 3);
        assert!(shared.is_empty());
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn test_dispose_fn_runs_once() {
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let mut disposable = DisposeFn::new(move || counter.set(counter.get() + 1));
        disposable.dispose();
        disposable.dispose();
        assert_eq!(count.get(), 1);
    }
}
