//! File systems for extension trees
//!
//! [`MemoryFs`] keeps a tree of text files in memory; [`NativeFs`] serves a
//! directory on disk through `tokio::fs`. Both address files with
//! `/`-separated paths relative to the extension root.

use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use vessel_api::{DirEntry, DirectoryHandle, Entry, EntryKind, FileHandle, FileSystem};

fn normalize(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file or directory: {path}"))
}

/// In-memory extension tree; clones share the same files
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `(path, text)` pairs
    pub fn from_files<I, P, T>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, T)>,
        P: AsRef<str>,
        T: Into<String>,
    {
        let fs = Self::new();
        for (path, text) in files {
            fs.insert(path.as_ref(), text);
        }
        fs
    }

    pub fn with_file(self, path: &str, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    /// Add or replace a file; parent directories exist implicitly
    pub fn insert(&self, path: &str, text: impl Into<String>) {
        self.files.borrow_mut().insert(normalize(path), text.into());
    }

    pub fn remove(&self, path: &str) -> Option<String> {
        self.files.borrow_mut().remove(&normalize(path))
    }

    pub fn len(&self) -> usize {
        self.files.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.borrow().is_empty()
    }

    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let prefix = format!("{path}/");
        self.files
            .borrow()
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(file, _)| file.starts_with(&prefix))
    }

    /// Immediate children of a normalized directory path
    fn children(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        if !self.is_dir(path) {
            return Err(not_found(path));
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let mut children: BTreeMap<String, DirEntry> = BTreeMap::new();
        for file in self.files.borrow().keys() {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    children
                        .entry(dir.to_string())
                        .or_insert_with(|| DirEntry::directory(dir));
                }
                None => {
                    children.insert(rest.to_string(), DirEntry::file(rest));
                }
            }
        }
        Ok(children.into_values().collect())
    }

    fn text(&self, path: &str) -> io::Result<String> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }
}

#[async_trait(?Send)]
impl FileSystem for MemoryFs {
    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        self.children(&normalize(path))
    }

    async fn read_file(&self, path: &str) -> io::Result<String> {
        self.text(&normalize(path))
    }

    async fn directory(&self, path: &str) -> io::Result<Rc<dyn DirectoryHandle>> {
        let path = normalize(path);
        if !self.is_dir(&path) {
            return Err(not_found(&path));
        }
        Ok(Rc::new(MemoryDirectory {
            fs: self.clone(),
            name: base_name(&path).to_string(),
            path,
        }))
    }
}

struct MemoryDirectory {
    fs: MemoryFs,
    path: String,
    name: String,
}

#[async_trait(?Send)]
impl DirectoryHandle for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn entries(&self) -> io::Result<Vec<Entry>> {
        let entries = self
            .fs
            .children(&self.path)?
            .into_iter()
            .map(|child| {
                let path = join(&self.path, &child.name);
                match child.kind {
                    EntryKind::Directory => Entry::Directory(Rc::new(MemoryDirectory {
                        fs: self.fs.clone(),
                        path,
                        name: child.name,
                    })),
                    EntryKind::File => Entry::File(Rc::new(MemoryFile {
                        fs: self.fs.clone(),
                        path,
                        name: child.name,
                    })),
                }
            })
            .collect();
        Ok(entries)
    }
}

struct MemoryFile {
    fs: MemoryFs,
    path: String,
    name: String,
}

#[async_trait(?Send)]
impl FileHandle for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn text(&self) -> io::Result<String> {
        self.fs.text(&self.path)
    }
}

/// An extension tree on disk
#[derive(Debug, Clone)]
pub struct NativeFs {
    root: PathBuf,
}

impl NativeFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a relative extension path onto the root; `..` is refused
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(&normalize(path)).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("path escapes the extension root: {path}"),
                    ))
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait(?Send)]
impl FileSystem for NativeFs {
    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let mut children = Vec::new();
        for entry in native_entries(&self.resolve(path)?).await? {
            children.push(match entry {
                Entry::Directory(dir) => DirEntry::directory(dir.name()),
                Entry::File(file) => DirEntry::file(file.name()),
            });
        }
        Ok(children)
    }

    async fn read_file(&self, path: &str) -> io::Result<String> {
        tokio::fs::read_to_string(self.resolve(path)?).await
    }

    async fn directory(&self, path: &str) -> io::Result<Rc<dyn DirectoryHandle>> {
        let resolved = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&resolved).await?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a directory: {path}"),
            ));
        }
        Ok(Rc::new(NativeDirectory {
            name: base_name(&normalize(path)).to_string(),
            path: resolved,
        }))
    }
}

/// Children of a directory on disk; symlinks are followed, anything that is
/// neither a file nor a directory is skipped
async fn native_entries(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "Skipping unreadable entry");
                continue;
            }
        };
        if metadata.is_dir() {
            entries.push(Entry::Directory(Rc::new(NativeDirectory { name, path })));
        } else if metadata.is_file() {
            entries.push(Entry::File(Rc::new(NativeFile { name, path })));
        }
    }
    Ok(entries)
}

struct NativeDirectory {
    name: String,
    path: PathBuf,
}

#[async_trait(?Send)]
impl DirectoryHandle for NativeDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn entries(&self) -> io::Result<Vec<Entry>> {
        native_entries(&self.path).await
    }
}

struct NativeFile {
    name: String,
    path: PathBuf,
}

#[async_trait(?Send)]
impl FileHandle for NativeFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn text(&self) -> io::Result<String> {
        tokio::fs::read_to_string(&self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(entries: &[Entry]) -> Vec<&str> {
        let mut names: Vec<&str> = entries.iter().map(Entry::name).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_memory_fs_lists_children() {
        let fs = MemoryFs::from_files([
            ("ui/panels/main.vue", "<template><p/></template>"),
            ("ui/readme.txt", "hi"),
            ("scripts/boot.js", ""),
        ]);

        let root = fs.read_dir("").await.unwrap();
        assert_eq!(root, vec![DirEntry::directory("scripts"), DirEntry::directory("ui")]);

        let ui = fs.directory("ui").await.unwrap();
        assert_eq!(ui.name(), "ui");
        let entries = ui.entries().await.unwrap();
        assert_eq!(names(&entries), vec!["panels", "readme.txt"]);

        let Some(Entry::Directory(panels)) = entries.iter().find(|e| e.name() == "panels") else {
            panic!("panels should be a directory");
        };
        let files = panels.entries().await.unwrap();
        let Entry::File(main) = &files[0] else {
            panic!("main.vue should be a file");
        };
        assert_eq!(main.text().await.unwrap(), "<template><p/></template>");
    }

    #[tokio::test]
    async fn test_memory_fs_missing_paths() {
        let fs = MemoryFs::new().with_file("scripts/a.js", "");
        assert_eq!(fs.directory("ui").await.err().unwrap().kind(), io::ErrorKind::NotFound);
        assert_eq!(fs.read_file("ui/x.vue").await.unwrap_err().kind(), io::ErrorKind::NotFound);
        assert!(fs.directory("").await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_fs_handles_see_updates() {
        let fs = MemoryFs::new().with_file("ui/a.vue", "one");
        let entries = fs.directory("ui").await.unwrap().entries().await.unwrap();
        fs.insert("ui/a.vue", "two");

        let Entry::File(file) = &entries[0] else {
            panic!("expected a file");
        };
        assert_eq!(file.text().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_native_fs_reads_tree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("ui/panels")).unwrap();
        std::fs::write(dir.path().join("ui/panels/main.vue"), "<template/>").unwrap();
        std::fs::write(dir.path().join("ui/top.vue"), "").unwrap();

        let fs = NativeFs::new(dir.path());
        let ui = fs.directory("ui").await.unwrap();
        assert_eq!(names(&ui.entries().await.unwrap()), vec!["panels", "top.vue"]);
        assert_eq!(fs.read_file("ui/panels/main.vue").await.unwrap(), "<template/>");

        let mut listing = fs.read_dir("ui").await.unwrap();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(listing, vec![DirEntry::directory("panels"), DirEntry::file("top.vue")]);
    }

    #[tokio::test]
    async fn test_native_fs_refuses_escape() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFs::new(dir.path());
        let err = fs.read_file("../secret").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(fs.directory("missing").await.is_err());
    }
}
