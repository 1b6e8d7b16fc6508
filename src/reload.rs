// Shader hot reload
//
// Watches the directories holding the shader sources (editors often replace
// files instead of writing in place) and reports when one of the watched
// files was created or modified.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

pub struct ShaderWatcher {
    // Dropping the watcher stops its thread
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    files: Vec<PathBuf>,
}

impl ShaderWatcher {
    pub fn new(paths: &[PathBuf]) -> Result<Self> {
        let (tx, events) = channel();
        let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;

        let files = paths
            .iter()
            .map(|p| absolute(p))
            .collect::<Result<Vec<_>>>()?;

        let mut dirs: Vec<&Path> = files.iter().filter_map(|f| f.parent()).collect();
        dirs.sort();
        dirs.dedup();

        for dir in dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {:?}", dir))?;
            log::info!("Watching {:?} for shader changes", dir);
        }

        Ok(Self {
            _watcher: watcher,
            events,
            files,
        })
    }

    /// Drain pending events; true if any watched file changed since last call.
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;
        for event in self.events.try_iter() {
            match event {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                        && event.paths.iter().any(|p| self.files.contains(p))
                    {
                        log::debug!("Shader change: {:?}", event.paths);
                        changed = true;
                    }
                }
                Err(e) => log::warn!("File watcher error: {}", e),
            }
        }
        changed
    }
}

/// Absolute path of `path`; the file itself need not exist yet.
fn absolute(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Not a file path: {:?}", path))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = parent
        .canonicalize()
        .with_context(|| format!("Shader directory not found: {:?}", parent))?;
    Ok(parent.join(file_name))
}
