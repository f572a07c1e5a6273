//! Application state with a shared [`Laboratory`].
//!
//! The laboratory sits behind `Arc<tokio::sync::Mutex<_>>`: handlers await
//! the lock, and a refresh pass holds it until the pass concludes, so
//! passes triggered by independent requests run one after another.

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;

use dysart_engine::{ConfigError, Laboratory};
use dysart_storage::SqliteStore;

use crate::config::ServerConfig;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub lab: Arc<tokio::sync::Mutex<Laboratory>>,
    /// Project name -> file, for `POST /project`.
    pub projects: Arc<IndexMap<String, PathBuf>>,
}

impl AppState {
    /// Opens the SQLite store and loads the startup project, if any.
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        let store = SqliteStore::new(&config.db_path)?;
        let mut lab = Laboratory::with_store(Box::new(store));
        if let Some(path) = &config.project {
            lab.load_project_file(path)?;
        }
        Ok(Self::from_lab(lab, config.projects.clone()))
    }

    /// An empty laboratory over an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, ApiError> {
        let store = SqliteStore::in_memory()?;
        Ok(Self::from_lab(
            Laboratory::with_store(Box::new(store)),
            IndexMap::new(),
        ))
    }

    pub fn from_lab(lab: Laboratory, projects: IndexMap<String, PathBuf>) -> Self {
        AppState {
            lab: Arc::new(tokio::sync::Mutex::new(lab)),
            projects: Arc::new(projects),
        }
    }

    pub fn project_path(&self, name: &str) -> Result<&PathBuf, ApiError> {
        self.projects
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProject(name.to_string()).into())
    }
}
