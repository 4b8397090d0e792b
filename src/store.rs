//! Fragment store
//!
//! Holds the entry document and the latest content of every fragment it
//! includes, keyed by the fragment's resolved path.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Captures;

use crate::include::{find_markers, marker_regex};

/// A fragment file referenced by one or more markers in the entry document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Marker texts that resolve to this file
    pub markers: Vec<String>,
    /// Most recently read file content
    pub content: String,
}

/// Entry document plus the fragments it includes
#[derive(Debug, Clone, Default)]
pub struct FragmentStore {
    entry: String,
    fragments: HashMap<PathBuf, Fragment>,
}

impl FragmentStore {
    /// Build a store directly from in-memory text (useful for testing)
    pub fn from_parts(entry: impl Into<String>, fragments: HashMap<PathBuf, Fragment>) -> Self {
        Self {
            entry: entry.into(),
            fragments,
        }
    }

    /// Read the entry document and every fragment it includes.
    ///
    /// Fragment paths are resolved against `root`. A missing or unreadable
    /// file is an error.
    pub async fn load(root: &Path, entry_path: &Path) -> Result<Self> {
        log::info!("Loading api blueprint files from {}", entry_path.display());

        let entry = tokio::fs::read_to_string(entry_path)
            .await
            .with_context(|| format!("Failed to read entry file: {}", entry_path.display()))?;

        let mut fragments: HashMap<PathBuf, Fragment> = HashMap::new();
        for marker in find_markers(&entry) {
            let path = resolve_fragment_path(root, &marker.path).await?;

            if let Some(fragment) = fragments.get_mut(&path) {
                if !fragment.markers.contains(&marker.text) {
                    fragment.markers.push(marker.text);
                }
                continue;
            }

            let content = read_fragment(&path).await?;
            log::debug!("Loaded fragment {}", path.display());
            fragments.insert(
                path,
                Fragment {
                    markers: vec![marker.text],
                    content,
                },
            );
        }

        log::info!("Loaded {} api blueprint fragments", fragments.len());

        Ok(Self { entry, fragments })
    }

    /// Re-read a single fragment from disk.
    ///
    /// Returns `Ok(false)` when `path` is not one of the stored fragments or
    /// the file is currently missing; the last read content is kept until
    /// the file reappears.
    pub async fn refresh(&mut self, path: &Path) -> Result<bool> {
        let Some(fragment) = self.fragments.get_mut(path) else {
            return Ok(false);
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                fragment.content = content;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("Fragment {} is missing, keeping last content", path.display());
                Ok(false)
            }
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read included file: {}", path.display()))
            }
        }
    }

    /// Produce the merged document.
    ///
    /// The entry text is scanned once; inserted fragment content is never
    /// scanned for further markers. Markers without a stored fragment are
    /// left untouched.
    pub fn render(&self) -> String {
        let by_marker: HashMap<&str, &str> = self
            .fragments
            .values()
            .flat_map(|fragment| {
                fragment
                    .markers
                    .iter()
                    .map(move |marker| (marker.as_str(), fragment.content.as_str()))
            })
            .collect();

        marker_regex()
            .replace_all(&self.entry, |caps: &Captures| {
                let marker = &caps[0];
                by_marker
                    .get(marker)
                    .map(|content| content.to_string())
                    .unwrap_or_else(|| marker.to_string())
            })
            .into_owned()
    }

    /// Paths of all stored fragments
    pub fn paths(&self) -> Vec<PathBuf> {
        self.fragments.keys().cloned().collect()
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }
}

/// Resolve a marker path against the root into a canonical file path
async fn resolve_fragment_path(root: &Path, marker_path: &str) -> Result<PathBuf> {
    let joined = root.join(marker_path.trim());
    tokio::fs::canonicalize(&joined)
        .await
        .with_context(|| format!("Failed to resolve included file: {}", joined.display()))
}

async fn read_fragment(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read included file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(entry: &str, fragments: &[(&str, &str, &str)]) -> FragmentStore {
        let fragments = fragments
            .iter()
            .map(|(path, marker, content)| {
                (
                    PathBuf::from(*path),
                    Fragment {
                        markers: vec![marker.to_string()],
                        content: content.to_string(),
                    },
                )
            })
            .collect();
        FragmentStore::from_parts(entry, fragments)
    }

    #[test]
    fn test_render_replaces_markers_in_place() {
        let store = store_with(
            "FORMAT: 1A\n<!-- include(a.apib) -->\n--\n<!-- include(b.apib) -->\n",
            &[
                ("/a.apib", "<!-- include(a.apib) -->", "## A"),
                ("/b.apib", "<!-- include(b.apib) -->", "## B"),
            ],
        );
        assert_eq!(store.render(), "FORMAT: 1A\n## A\n--\n## B\n");
    }

    #[test]
    fn test_render_is_single_pass() {
        let store = store_with(
            "<!-- include(a.apib) -->",
            &[(
                "/a.apib",
                "<!-- include(a.apib) -->",
                "nested <!-- include(a.apib) -->",
            )],
        );
        assert_eq!(store.render(), "nested <!-- include(a.apib) -->");
    }

    #[test]
    fn test_render_replaces_repeated_marker() {
        let store = store_with(
            "<!-- include(a.apib) -->\n<!-- include(a.apib) -->",
            &[("/a.apib", "<!-- include(a.apib) -->", "x")],
        );
        assert_eq!(store.render(), "x\nx");
    }

    #[test]
    fn test_render_keeps_replacement_text_literal() {
        let store = store_with(
            "<!-- include(a.apib) -->",
            &[("/a.apib", "<!-- include(a.apib) -->", "costs $1 and $& more")],
        );
        assert_eq!(store.render(), "costs $1 and $& more");
    }

    #[test]
    fn test_render_leaves_unknown_markers() {
        let store = store_with("<!-- include(missing.apib) -->", &[]);
        assert_eq!(store.render(), "<!-- include(missing.apib) -->");
    }

    fn write_project(root: &Path) {
        std::fs::write(
            root.join("index.apib"),
            "<!-- include(a.apib) -->\n<!-- include(b.apib) -->",
        )
        .expect("write entry");
        std::fs::write(root.join("a.apib"), "A1").expect("write a");
        std::fs::write(root.join("b.apib"), "B1").expect("write b");
    }

    #[tokio::test]
    async fn test_refresh_unknown_path() {
        let mut store = store_with("", &[]);
        assert!(!store.refresh(Path::new("/nope.apib")).await.expect("refresh"));
    }

    #[tokio::test]
    async fn test_refresh_changes_only_that_region() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        write_project(dir.path());

        let mut store = FragmentStore::load(dir.path(), &dir.path().join("index.apib"))
            .await
            .expect("load");
        std::fs::write(dir.path().join("b.apib"), "B2").expect("edit b");

        let b = std::fs::canonicalize(dir.path().join("b.apib")).expect("canonicalize");
        assert!(store.refresh(&b).await.expect("refresh"));
        assert_eq!(store.render(), "A1\nB2");
    }

    #[tokio::test]
    async fn test_refresh_missing_file_keeps_content() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        write_project(dir.path());

        let mut store = FragmentStore::load(dir.path(), &dir.path().join("index.apib"))
            .await
            .expect("load");
        let a = std::fs::canonicalize(dir.path().join("a.apib")).expect("canonicalize");
        std::fs::remove_file(&a).expect("remove a");

        assert!(!store.refresh(&a).await.expect("missing file is skipped"));
        assert_eq!(store.render(), "A1\nB1");
    }
}
