//! Fragment file watching
//!
//! Fragment parent directories are watched rather than the files
//! themselves, so saves that replace the file via rename are still seen.
//! Events are forwarded into a tokio channel; the receiving side owns all
//! state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Events from the fragment watcher
#[derive(Debug)]
pub enum WatchEvent {
    /// A fragment was created or modified
    Changed(PathBuf),
    /// The underlying watcher reported an error
    Error(notify::Error),
}

/// Keeps the OS watcher alive; dropping it stops event delivery
pub struct FragmentWatcher {
    _watcher: RecommendedWatcher,
}

impl FragmentWatcher {
    /// Start watching the given fragment files
    pub fn start(paths: &[PathBuf]) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracked: HashSet<PathBuf> = paths.iter().cloned().collect();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if is_content_change(&event.kind) {
                        for path in event.paths {
                            if tracked.contains(&path) {
                                let _ = tx.send(WatchEvent::Changed(path));
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(WatchEvent::Error(e));
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;

        let dirs = watch_dirs(paths);
        for dir in &dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch directory: {}", dir.display()))?;
            log::debug!("Watching {}", dir.display());
        }

        log::info!(
            "Watching {} fragment files in {} directories",
            paths.len(),
            dirs.len()
        );

        Ok((Self { _watcher: watcher }, rx))
    }
}

/// Whether an event may have left new content at the event path.
///
/// The source side of a rename only means the file went away.
fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Unique parent directories of the given files, in first-seen order
fn watch_dirs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .filter_map(|p| p.parent().map(Path::to_path_buf))
        .filter(|dir| seen.insert(dir.clone()))
        .collect()
}
