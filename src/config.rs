use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid bind address '{0}'")]
    Bind(String),
}

/// Settings as they appear in `config.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    server_url: Option<String>,
    share_url: Option<String>,
    bind: Option<String>,
    database: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Where the client sends API calls.
    pub server_url: String,
    /// Prefix of the links shown for sharing a list.
    pub share_url: String,
    pub bind: SocketAddr,
    pub database: PathBuf,
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("todolist").join("config.toml"))
}

pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("todolist")
}

impl Config {
    /// Loads the config file (if any), then applies environment overrides.
    /// `server_url` comes from the command line and beats both.
    pub fn load(server_url: Option<String>) -> Result<Config, ConfigError> {
        let file = match config_path() {
            Some(path) if path.is_file() => read_file(&path)?,
            _ => FileConfig::default(),
        };
        Config::resolve(file, server_url, |key| env::var(key).ok())
    }

    pub fn from_file(path: &Path, server_url: Option<String>) -> Result<Config, ConfigError> {
        Config::resolve(read_file(path)?, server_url, |key| env::var(key).ok())
    }

    // Share links default to the server URL after every override is applied.
    fn resolve(
        file: FileConfig,
        server_url: Option<String>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Config, ConfigError> {
        let server_url = server_url
            .or_else(|| var("TODOLIST_SERVER_URL"))
            .or(file.server_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let share_url = var("TODOLIST_SHARE_URL")
            .or(file.share_url)
            .unwrap_or_else(|| server_url.clone());
        let bind = var("TODOLIST_BIND")
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind.parse().map_err(|_| ConfigError::Bind(bind.clone()))?;
        let database = var("TODOLIST_DATABASE")
            .map(PathBuf::from)
            .or(file.database)
            .unwrap_or_else(|| data_dir().join("todolist.sqlite"));

        Ok(Config {
            server_url,
            share_url,
            bind,
            database,
        })
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(FileConfig::default(), None, no_env).unwrap();
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.share_url, DEFAULT_SERVER_URL);
        assert_eq!(config.bind, DEFAULT_BIND.parse::<SocketAddr>().unwrap());
        assert!(config.database.ends_with("todolist.sqlite"));
    }

    #[test]
    fn test_file_values() {
        let file: FileConfig = toml::from_str(
            r#"
            server_url = "http://todo.internal:8080"
            bind = "0.0.0.0:8080"
            database = "/var/lib/todolist/db.sqlite"
            "#,
        )
        .unwrap();
        let config = Config::resolve(file, None, no_env).unwrap();
        assert_eq!(config.server_url, "http://todo.internal:8080");
        assert_eq!(config.share_url, "http://todo.internal:8080");
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.database, PathBuf::from("/var/lib/todolist/db.sqlite"));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = FileConfig {
            server_url: Some("http://from-file".to_string()),
            ..Default::default()
        };
        let env: HashMap<&str, &str> = [
            ("TODOLIST_SERVER_URL", "http://from-env"),
            ("TODOLIST_SHARE_URL", "https://todo.example.com"),
        ]
        .into_iter()
        .collect();
        let config =
            Config::resolve(file, None, |key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.server_url, "http://from-env");
        assert_eq!(config.share_url, "https://todo.example.com");
    }

    #[test]
    fn test_cli_server_also_moves_share_links() {
        let file = FileConfig {
            server_url: Some("http://from-file".to_string()),
            ..Default::default()
        };
        let config = Config::resolve(file, Some("http://x".to_string()), |key| {
            (key == "TODOLIST_SERVER_URL").then(|| "http://from-env".to_string())
        })
        .unwrap();
        assert_eq!(config.server_url, "http://x");
        assert_eq!(config.share_url, "http://x");

        let file = FileConfig {
            share_url: Some("https://todo.example.com".to_string()),
            ..Default::default()
        };
        let config = Config::resolve(file, Some("http://x".to_string()), no_env).unwrap();
        assert_eq!(config.share_url, "https://todo.example.com");
    }

    #[test]
    fn test_bad_bind() {
        let file = FileConfig {
            bind: Some("not an address".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Config::resolve(file, None, no_env),
            Err(ConfigError::Bind(_))
        ));
    }

    #[test]
    fn test_unknown_file_is_read_error() {
        let err = Config::from_file(Path::new("/definitely/not/here.toml"), None).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
