//! Local Markdown tree: discovery, reads and atomic writes

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::Pattern;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::markdown::{self, LocalDocument};
use crate::util::slugify;

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];
const STATE_DIR: &str = ".mdsync";
const UNTITLED_STEM: &str = "untitled";

/// A local document as read at one point in time
#[derive(Debug, Clone)]
pub struct LocalSnapshot {
    pub path: PathBuf,
    pub local: LocalDocument,
    /// File modification time, when the platform reports one
    pub modified: Option<DateTime<Utc>>,
}

/// Markdown files under a root directory
#[derive(Debug, Clone)]
pub struct LocalFiles {
    root: PathBuf,
    excludes: Vec<Pattern>,
}

impl LocalFiles {
    pub fn new(root: impl Into<PathBuf>, exclude_patterns: &[String]) -> Result<Self> {
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        let excludes = exclude_patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|error| {
                    Error::Config(format!("invalid exclude pattern '{pattern}': {error}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { root, excludes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every Markdown file under the root that no exclude pattern matches,
    /// sorted by path. Hidden directories are skipped.
    pub fn list_documents(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(Error::local_io(
                &self.root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "sync root is not a directory"),
            ));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::warn!("Skipping unreadable entry: {error}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| self.is_candidate(path))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Whether `path` is a Markdown file this tree syncs
    pub fn is_candidate(&self, path: &Path) -> bool {
        let is_markdown = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                MARKDOWN_EXTENSIONS
                    .iter()
                    .any(|known| extension.eq_ignore_ascii_case(known))
            });
        if !is_markdown {
            return false;
        }

        let key = self.key_for(path);
        let relative = Path::new(&key);
        let hidden = relative
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .any(|component| match component {
                Component::Normal(name) => is_hidden(name),
                _ => false,
            });
        !hidden && !self.is_excluded(&key)
    }

    fn is_excluded(&self, key: &str) -> bool {
        let file_name = key.rsplit('/').next().unwrap_or(key);
        self.excludes
            .iter()
            .any(|pattern| pattern.matches(key) || pattern.matches(file_name))
    }

    /// Mapping key for `path`: relative to the root with `/` separators when
    /// it lies under the root, otherwise the path as given.
    pub fn key_for(&self, path: &Path) -> String {
        let absolute = self.absolute(path);
        let resolved = resolve_existing(&absolute);
        match resolved.strip_prefix(&self.root) {
            Ok(relative) => relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string_lossy().replace('\\', "/"),
        }
    }

    /// Path for a mapping key, the inverse of [`Self::key_for`]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let path = Path::new(key);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| self.root.join(path))
        }
    }

    /// Read and parse a document. `Ok(None)` when the file does not exist.
    pub async fn read(&self, path: &Path) -> Result<Option<LocalSnapshot>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(Error::local_io(path, error)),
        };
        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|metadata| metadata.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        let fallback = path
            .file_stem()
            .map_or_else(|| UNTITLED_STEM.to_string(), |stem| stem.to_string_lossy().to_string());
        let local = markdown::parse_document(&content, &fallback)?;
        Ok(Some(LocalSnapshot {
            path: path.to_path_buf(),
            local,
            modified,
        }))
    }

    /// Replace `path` with `content`: written to a sibling temp file first,
    /// then renamed over the target.
    pub async fn write(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| Error::local_io(parent, error))?;
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| Error::InvalidInput(format!("not a file path: {}", path.display())))?;
        let temp = path.with_file_name(format!(".{file_name}.mdsync-tmp"));

        tokio::fs::write(&temp, content)
            .await
            .map_err(|error| Error::local_io(&temp, error))?;
        if let Err(error) = tokio::fs::rename(&temp, path).await {
            tokio::fs::remove_file(&temp).await.ok();
            return Err(Error::local_io(path, error));
        }
        Ok(())
    }

    /// A free `<slug>.md` path in `directory` for a new document.
    ///
    /// Taken names get `-1`, `-2`, ... suffixes; `reserved` holds paths handed
    /// out earlier in the same run.
    pub fn available_path(
        &self,
        directory: &Path,
        title: &str,
        remote_id: &str,
        reserved: &mut HashSet<PathBuf>,
    ) -> PathBuf {
        let mut stem = slugify(title);
        if stem.is_empty() {
            let short: String = remote_id.chars().filter(|c| *c != '-').take(8).collect();
            stem = format!("{UNTITLED_STEM}-{short}");
        }

        let mut candidate = directory.join(format!("{stem}.md"));
        let mut counter = 1;
        while candidate.exists() || reserved.contains(&candidate) {
            candidate = directory.join(format!("{stem}-{counter}.md"));
            counter += 1;
        }
        reserved.insert(candidate.clone());
        candidate
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    let name = name.to_string_lossy();
    name.starts_with('.') || name == STATE_DIR
}

/// Canonical form of the longest existing ancestor, with the rest appended
fn resolve_existing(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => resolve_existing(parent).join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn touch(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn list_documents_filters_and_sorts() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        touch(root, "b.md", "b");
        touch(root, "a.markdown", "a");
        touch(root, "notes/c.md", "c");
        touch(root, "notes/draft.tmp", "x");
        touch(root, "notes/readme.txt", "x");
        touch(root, "node_modules/pkg/readme.md", "x");
        touch(root, ".mdsync/ignored.md", "x");
        touch(root, ".git/HEAD.md", "x");

        let files =
            LocalFiles::new(root, &["*.tmp".to_string(), "node_modules/**".to_string()]).unwrap();
        let keys: Vec<String> = files
            .list_documents()
            .unwrap()
            .iter()
            .map(|path| files.key_for(path))
            .collect();

        assert_eq!(keys, vec!["a.markdown", "b.md", "notes/c.md"]);
    }

    #[test]
    fn list_documents_requires_root() {
        let tmp = tempdir().unwrap();
        let files = LocalFiles::new(tmp.path().join("missing"), &[]).unwrap();
        assert!(matches!(files.list_documents(), Err(Error::LocalIo { .. })));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let tmp = tempdir().unwrap();
        let result = LocalFiles::new(tmp.path(), &["[".to_string()]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn keys_are_relative_to_root() {
        let tmp = tempdir().unwrap();
        let files = LocalFiles::new(tmp.path(), &[]).unwrap();
        let path = files.root().join("notes").join("new.md");

        assert_eq!(files.key_for(&path), "notes/new.md");
        assert_eq!(files.path_for("notes/new.md"), path);
        assert!(files.is_candidate(&path));
        assert!(!files.is_candidate(&files.root().join(".hidden").join("x.md")));
    }

    #[tokio::test]
    async fn read_missing_file_is_none() {
        let tmp = tempdir().unwrap();
        let files = LocalFiles::new(tmp.path(), &[]).unwrap();
        assert!(files.read(&tmp.path().join("nope.md")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_then_read() {
        let tmp = tempdir().unwrap();
        let files = LocalFiles::new(tmp.path(), &[]).unwrap();
        let path = tmp.path().join("deep").join("plan.md");

        files.write(&path, "# Plan\n\nBody\n").await.unwrap();
        let snapshot = files.read(&path).await.unwrap().unwrap();

        assert_eq!(snapshot.local.document.title(), "Plan");
        assert!(snapshot.modified.is_some());
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".mdsync-tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn available_path_avoids_collisions() {
        let tmp = tempdir().unwrap();
        let files = LocalFiles::new(tmp.path(), &[]).unwrap();
        touch(tmp.path(), "roadmap.md", "taken");

        let mut reserved = HashSet::new();
        let first = files.available_path(tmp.path(), "Roadmap", "id-1", &mut reserved);
        let second = files.available_path(tmp.path(), "Roadmap", "id-2", &mut reserved);
        let untitled = files.available_path(
            tmp.path(),
            "???",
            "1429989f-e8ac-4eff-bc8f-57f56486db54",
            &mut reserved,
        );

        assert_eq!(first, tmp.path().join("roadmap-1.md"));
        assert_eq!(second, tmp.path().join("roadmap-2.md"));
        assert_eq!(untitled, tmp.path().join("untitled-1429989f.md"));
    }
}
