//! Generated document output
//!
//! The merged blueprint is written to a temporary file that the mock server
//! reads. It is removed again when the tool is interrupted.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};

/// Write the merged document, creating parent directories as needed
pub async fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write generated file: {}", path.display()))?;

    log::info!("Generated api blueprint file {}", path.display());
    Ok(())
}

/// Remove the merged document.
///
/// Returns `Ok(false)` if the file was already gone.
pub async fn remove_output(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log::info!("Removed api blueprint temp file {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("Generated file {} was already removed", path.display());
            Ok(false)
        }
        Err(e) => Err(e)
            .with_context(|| format!("Failed to remove generated file: {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested/out/drakov.apib");

        write_output(&path, "FORMAT: 1A").await.expect("write");

        let written = tokio::fs::read_to_string(&path).await.expect("read back");
        assert_eq!(written, "FORMAT: 1A");
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("drakov.apib");

        write_output(&path, "first").await.expect("write");
        write_output(&path, "second").await.expect("rewrite");

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_remove_output() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("drakov.apib");
        write_output(&path, "x").await.expect("write");

        assert!(remove_output(&path).await.expect("remove"));
        assert!(!path.exists());
        assert!(!remove_output(&path).await.expect("remove again"));
    }
}
