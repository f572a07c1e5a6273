//! Server configuration from environment variables.
//!
//! - `DYSART_DB_PATH`: SQLite database file (default `dysart.db`)
//! - `DYSART_PORT`: listen port (default `8000`)
//! - `DYSART_PROJECT`: project file loaded at startup
//! - `DYSART_PROJECTS`: `name=path,name=path` list for `POST /project`

use std::path::PathBuf;

use indexmap::IndexMap;

#[derive(Debug, thiserror::Error)]
pub enum ServerConfigError {
    #[error("invalid DYSART_PORT '{0}'")]
    InvalidPort(String),

    #[error("invalid DYSART_PROJECTS entry '{0}', expected name=path")]
    InvalidProjectEntry(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub db_path: String,
    pub port: u16,
    pub project: Option<PathBuf>,
    pub projects: IndexMap<String, PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            db_path: "dysart.db".to_string(),
            port: 8000,
            project: None,
            projects: IndexMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ServerConfigError> {
        let mut config = ServerConfig::default();
        if let Some(path) = lookup("DYSART_DB_PATH") {
            config.db_path = path;
        }
        if let Some(port) = lookup("DYSART_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ServerConfigError::InvalidPort(port.clone()))?;
        }
        config.project = lookup("DYSART_PROJECT")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        if let Some(list) = lookup("DYSART_PROJECTS") {
            config.projects = parse_projects(&list)?;
        }
        Ok(config)
    }
}

fn parse_projects(list: &str) -> Result<IndexMap<String, PathBuf>, ServerConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
                Ok((name.trim().to_string(), PathBuf::from(path.trim())))
            }
            _ => Err(ServerConfigError::InvalidProjectEntry(entry.to_string())),
        })
        .collect()
}
