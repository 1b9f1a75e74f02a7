use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;
use tracing::{debug, warn};

/// A file discovered on disk, with the modified time the reconciliation
/// diff compares against the index snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub path: PathBuf,
    pub modified_ms: i64,
    pub size: u64,
}

/// Recursive directory walker with include/exclude glob matching and a
/// realpath cycle guard for followed symlinks.
pub struct DirectoryWalker {
    includes: Vec<glob::Pattern>,
    excludes: Vec<glob::Pattern>,
    follow_symlinks: bool,
}

impl DirectoryWalker {
    pub fn new(
        include_globs: &[String],
        exclude_globs: &[String],
        follow_symlinks: bool,
    ) -> anyhow::Result<Self> {
        let includes = compile(include_globs)?;
        let excludes = compile(exclude_globs)?;
        Ok(Self {
            includes,
            excludes,
            follow_symlinks,
        })
    }

    /// Walks one root. A candidate must match at least one include glob
    /// and no exclude glob.
    pub fn walk(&self, root: &Path) -> Vec<WalkedFile> {
        let visited: Mutex<HashSet<PathBuf>> = Mutex::new(HashSet::new());
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .hidden(true)
            .follow_links(self.follow_symlinks)
            .filter_entry(move |entry| {
                if !entry.path_is_symlink() {
                    return true;
                }
                // cycle guard keyed by realpath
                match std::fs::canonicalize(entry.path()) {
                    Ok(real) => visited.lock().unwrap().insert(real),
                    Err(_) => false,
                }
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "walk error, skipping entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if !self.matches(path) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                debug!(path = %path.display(), "no metadata, skipping");
                continue;
            };
            files.push(WalkedFile {
                path: path.to_path_buf(),
                modified_ms: modified_millis(&metadata),
                size: metadata.len(),
            });
        }
        files
    }

    /// Include/exclude verdict for one path; also used by watch mode on
    /// event paths.
    pub fn matches(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let included = self
            .includes
            .iter()
            .any(|p| p.matches_path(path) || p.matches(&name));
        if !included {
            return false;
        }
        !self
            .excludes
            .iter()
            .any(|p| p.matches_path(path) || p.matches(&name))
    }
}

fn compile(globs: &[String]) -> anyhow::Result<Vec<glob::Pattern>> {
    globs
        .iter()
        .map(|g| glob::Pattern::new(g).map_err(|e| anyhow::anyhow!("bad glob {g}: {e}")))
        .collect()
}

pub fn modified_millis(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn created_millis(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .created()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(|| modified_millis(metadata))
}
