use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Comma-separated absolute paths. When set, it supersedes the config
/// file and the add/remove tools are refused.
pub const CRAWLER_DIRECTORIES_ENV: &str = "LUCENE_CRAWLER_DIRECTORIES";

#[derive(thiserror::Error, Debug)]
pub enum StateError {
    #[error("crawl directories are fixed by {CRAWLER_DIRECTORIES_ENV}")]
    Locked,

    #[error("crawl root must be an absolute path")]
    NonAbsoluteRoot,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("bad config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RuntimeState {
    #[serde(default)]
    pub crawl_directories: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_crawl: Option<LastCrawl>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LastCrawl {
    pub last_completion_time_ms: i64,
    pub last_document_count: u64,
    pub last_crawl_mode: CrawlMode,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    Full,
    Incremental,
}

/// The runtime configuration file: crawl roots plus last-crawl state,
/// stored as YAML. An environment override freezes the root list.
pub struct StateSource {
    config_path: PathBuf,
    env_override: Option<Vec<PathBuf>>,
    state: Mutex<RuntimeState>,
}

impl StateSource {
    pub fn default_config_path() -> PathBuf {
        match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(".mcplucene").join("config.yaml"),
            None => PathBuf::from(".mcplucene/config.yaml"),
        }
    }

    pub fn load(config_path: PathBuf) -> Result<Self, StateError> {
        let env_override = std::env::var(CRAWLER_DIRECTORIES_ENV)
            .ok()
            .map(|raw| parse_env_override(&raw));
        if env_override.is_some() {
            info!("crawl directories overridden by {CRAWLER_DIRECTORIES_ENV}");
        }

        let state = if config_path.exists() {
            let raw = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&raw)?
        } else {
            RuntimeState::default()
        };

        Ok(Self {
            config_path,
            env_override,
            state: Mutex::new(state),
        })
    }

    pub fn directories_locked(&self) -> bool {
        self.env_override.is_some()
    }

    /// Effective crawl roots: the env override when present, the config
    /// file otherwise.
    pub fn directories(&self) -> Vec<PathBuf> {
        match &self.env_override {
            Some(paths) => paths.clone(),
            None => self.state.lock().unwrap().crawl_directories.clone(),
        }
    }

    pub fn add_directory(&self, path: &Path) -> Result<(), StateError> {
        if self.directories_locked() {
            return Err(StateError::Locked);
        }
        if !path.is_absolute() {
            return Err(StateError::NonAbsoluteRoot);
        }
        if !path.is_dir() {
            warn!(path = %path.display(), "crawl root does not exist yet");
        }
        let mut state = self.state.lock().unwrap();
        if !state.crawl_directories.iter().any(|p| p == path) {
            state.crawl_directories.push(path.to_path_buf());
            self.persist(&state)?;
        }
        Ok(())
    }

    /// Returns whether the path was present.
    pub fn remove_directory(&self, path: &Path) -> Result<bool, StateError> {
        if self.directories_locked() {
            return Err(StateError::Locked);
        }
        let mut state = self.state.lock().unwrap();
        let before = state.crawl_directories.len();
        state.crawl_directories.retain(|p| p != path);
        let removed = state.crawl_directories.len() != before;
        if removed {
            self.persist(&state)?;
        }
        Ok(removed)
    }

    pub fn last_crawl(&self) -> Option<LastCrawl> {
        self.state.lock().unwrap().last_crawl
    }

    pub fn record_last_crawl(&self, last: LastCrawl) {
        let mut state = self.state.lock().unwrap();
        state.last_crawl = Some(last);
        if let Err(err) = self.persist(&state) {
            warn!(error = %err, "failed to persist last-crawl state");
        }
    }

    fn persist(&self, state: &RuntimeState) -> Result<(), StateError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_yaml::to_string(state)?;
        std::fs::write(&self.config_path, raw)?;
        Ok(())
    }
}

fn parse_env_override(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(dir: &Path) -> StateSource {
        StateSource {
            config_path: dir.join("config.yaml"),
            env_override: None,
            state: Mutex::new(RuntimeState::default()),
        }
    }

    #[test]
    fn add_then_remove_restores_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = source(dir.path());
        let root = dir.path().join("docs");
        std::fs::create_dir_all(&root).unwrap();

        state.add_directory(&root).unwrap();
        assert_eq!(state.directories(), vec![root.clone()]);
        assert!(state.remove_directory(&root).unwrap());
        assert!(state.directories().is_empty());
        assert!(!state.remove_directory(&root).unwrap());
    }

    #[test]
    fn add_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let state = source(dir.path());
        let root = dir.path().to_path_buf();
        state.add_directory(&root).unwrap();
        state.add_directory(&root).unwrap();
        assert_eq!(state.directories().len(), 1);
    }

    #[test]
    fn relative_roots_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = source(dir.path());
        assert!(matches!(
            state.add_directory(Path::new("relative/docs")),
            Err(StateError::NonAbsoluteRoot)
        ));
    }

    #[test]
    fn env_override_locks_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateSource {
            config_path: dir.path().join("config.yaml"),
            env_override: Some(vec![PathBuf::from("/fixed")]),
            state: Mutex::new(RuntimeState {
                crawl_directories: vec![PathBuf::from("/from-file")],
                last_crawl: None,
            }),
        };
        assert_eq!(state.directories(), vec![PathBuf::from("/fixed")]);
        assert!(matches!(
            state.add_directory(Path::new("/other")),
            Err(StateError::Locked)
        ));
        assert!(matches!(
            state.remove_directory(Path::new("/fixed")),
            Err(StateError::Locked)
        ));
    }

    #[test]
    fn state_round_trips_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        {
            let state = StateSource {
                config_path: path.clone(),
                env_override: None,
                state: Mutex::new(RuntimeState::default()),
            };
            state.add_directory(dir.path()).unwrap();
            state.record_last_crawl(LastCrawl {
                last_completion_time_ms: 123,
                last_document_count: 42,
                last_crawl_mode: CrawlMode::Incremental,
            });
        }
        let reloaded = StateSource::load(path).unwrap();
        assert_eq!(reloaded.directories(), vec![dir.path().to_path_buf()]);
        let last = reloaded.last_crawl().unwrap();
        assert_eq!(last.last_document_count, 42);
        assert_eq!(last.last_crawl_mode, CrawlMode::Incremental);
    }

    #[test]
    fn env_parsing_splits_and_trims() {
        assert_eq!(
            parse_env_override("/a, /b ,,/c"),
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
    }
}
