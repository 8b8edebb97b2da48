// SPDX-License-Identifier: MIT OR Apache-2.0
//! File system watcher for reference graph files.
//!
//! Bindings loaded from a `refFilePath` reload when that file changes on
//! disk. Events are debounced, then turned into [`HostRequest::Reload`]
//! requests for the owning binding.

use notify_debouncer_full::{
    new_debouncer,
    notify::{self, EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use parking_lot::RwLock;
use plugbridge_core::{BindingId, HostRequest};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// A file was created
    Created(PathBuf),
    /// A file was modified
    Modified(PathBuf),
    /// A file was deleted
    Deleted(PathBuf),
    /// An error occurred
    Error(String),
}

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct FileWatcherConfig {
    /// Debounce duration for events
    pub debounce_duration: Duration,
    /// File extensions to watch (empty = watch all)
    pub extensions: HashSet<String>,
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(250),
            extensions: HashSet::new(),
        }
    }
}

impl FileWatcherConfig {
    /// Watch graph state files with the given debounce window
    pub fn for_references(debounce_ms: u64) -> Self {
        Self {
            debounce_duration: Duration::from_millis(debounce_ms),
            extensions: ["json", "graph"].iter().map(|e| (*e).to_string()).collect(),
        }
    }
}

/// Watches reference files and maps their changes to bindings
pub struct FileWatcher {
    watcher: Debouncer<RecommendedWatcher, RecommendedCache>,
    event_rx: Receiver<FileEvent>,
    /// Watched directories
    watched_dirs: Arc<RwLock<HashSet<PathBuf>>>,
    /// Reference file → owning binding
    files: HashMap<PathBuf, BindingId>,
}

impl FileWatcher {
    /// Create a new file watcher with the given configuration
    pub fn new(config: FileWatcherConfig) -> Result<Self, notify::Error> {
        let (event_tx, event_rx) = mpsc::channel();
        let extensions = config.extensions;

        let watcher = new_debouncer(
            config.debounce_duration,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        let paths = event.paths.iter().filter(|p| {
                            extensions.is_empty()
                                || p.extension()
                                    .and_then(|e| e.to_str())
                                    .is_some_and(|e| extensions.contains(&e.to_lowercase()))
                        });
                        let make: fn(PathBuf) -> FileEvent = match event.kind {
                            EventKind::Create(_) => FileEvent::Created,
                            EventKind::Modify(_) => FileEvent::Modified,
                            EventKind::Remove(_) => FileEvent::Deleted,
                            EventKind::Any | EventKind::Access(_) | EventKind::Other => continue,
                        };
                        for path in paths {
                            let _ = event_tx.send(make(path.clone()));
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        let _ = event_tx.send(FileEvent::Error(error.to_string()));
                    }
                }
            },
        )?;

        Ok(Self {
            watcher,
            event_rx,
            watched_dirs: Arc::new(RwLock::new(HashSet::new())),
            files: HashMap::new(),
        })
    }

    /// Watch the reference file of a binding
    ///
    /// The parent directory is watched so editors that replace the file on
    /// save are still seen.
    pub fn watch_file(&mut self, path: impl AsRef<Path>, binding: BindingId) -> Result<(), notify::Error> {
        let path = normalize(path.as_ref());
        let dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        if !self.is_watching(&dir) {
            self.watcher.watch(&dir, RecursiveMode::NonRecursive)?;
            self.watched_dirs.write().insert(dir.clone());
            tracing::info!("Watching directory for changes: {:?}", dir);
        }
        self.files.insert(path, binding);
        Ok(())
    }

    /// Check if a directory is being watched
    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_dirs.read().contains(path)
    }

    /// Poll for pending file events (non-blocking)
    pub fn poll_events(&self) -> Vec<FileEvent> {
        let mut events = Vec::new();
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("File watcher channel disconnected");
                    break;
                }
            }
        }
        events
    }

    /// Reload requests for watched files touched since the last poll
    pub fn poll_reload_requests(&self) -> Vec<HostRequest> {
        let events = self.poll_events();
        self.reload_requests(&events)
    }

    fn reload_requests(&self, events: &[FileEvent]) -> Vec<HostRequest> {
        let mut requests: Vec<HostRequest> = Vec::new();
        for event in events {
            match event {
                FileEvent::Created(path) | FileEvent::Modified(path) => {
                    let Some(binding) = self.files.get(&normalize(path)) else {
                        continue;
                    };
                    let request = HostRequest::Reload { binding: *binding };
                    if !requests.contains(&request) {
                        requests.push(request);
                    }
                }
                FileEvent::Deleted(path) => {
                    if self.files.contains_key(&normalize(path)) {
                        tracing::warn!("Reference file removed: {:?}", path);
                    }
                }
                FileEvent::Error(e) => tracing::warn!("File watcher error: {e}"),
            }
        }
        requests
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_for_references() {
        let config = FileWatcherConfig::for_references(40);
        assert_eq!(config.debounce_duration, Duration::from_millis(40));
        assert!(config.extensions.contains("json"));
        assert!(FileWatcherConfig::default().extensions.is_empty());
    }

    #[test]
    fn test_events_map_to_reload_requests() {
        let dir = std::env::temp_dir().join(format!("plugbridge-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("graph.json");
        std::fs::write(&file, "{}").unwrap();

        let mut watcher = FileWatcher::new(FileWatcherConfig::default()).unwrap();
        watcher.watch_file(&file, BindingId::new(4)).unwrap();
        assert!(watcher.is_watching(&normalize(&dir)));

        let events = vec![
            FileEvent::Modified(file.clone()),
            FileEvent::Created(file.clone()),
            FileEvent::Modified(dir.join("other.json")),
        ];
        assert_eq!(
            watcher.reload_requests(&events),
            vec![HostRequest::Reload {
                binding: BindingId::new(4)
            }]
        );
        assert!(watcher.reload_requests(&events[2..]).is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
