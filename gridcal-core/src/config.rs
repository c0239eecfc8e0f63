//! Configuration loading.
//!
//! The config file lives at `~/.config/gridcal/config.toml`; prior state is
//! partitioned per source under the data directory. The remote-store key is
//! only ever read from the environment, never from the file, and a missing
//! key is fatal before any work starts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{GridCalError, GridCalResult};
use crate::event::DateWindow;
use crate::interpret::{Convention, default_precedence};

/// Environment variable holding the pre-shared key for the remote store.
pub const AUTH_KEY_VAR: &str = "GRIDCAL_AUTH_KEY";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub term: TermConfig,

    #[serde(default)]
    pub interpreter: InterpreterConfig,

    /// Remote event-store endpoint; only required for `sync`.
    #[serde(default)]
    pub api: Option<ApiConfig>,

    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

/// Academic-term boundary: the validity window for every event.
#[derive(Debug, Deserialize)]
pub struct TermConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct InterpreterConfig {
    /// Cell-convention precedence: when a cell matches two conventions, the
    /// first one listed here wins.
    #[serde(default = "default_precedence")]
    pub precedence: Vec<Convention>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            precedence: default_precedence(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub url: String,
}

/// One schedule source: a grid file (JSON interchange format or CSV).
#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    pub grid: String,
}

/// The subset of configuration the pure engine stages need.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub window: DateWindow,
    pub precedence: Vec<Convention>,
}

impl Config {
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            window: DateWindow {
                start: self.term.start,
                end: self.term.end,
            },
            precedence: self.interpreter.precedence.clone(),
        }
    }

    fn validate(&self) -> GridCalResult<()> {
        if self.term.start > self.term.end {
            return Err(GridCalError::Config(format!(
                "term start {} is after term end {}",
                self.term.start, self.term.end
            )));
        }
        if self.interpreter.precedence.is_empty() {
            return Err(GridCalError::Config(
                "interpreter precedence list must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_toml(contents: &str) -> GridCalResult<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| GridCalError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

/// Get the config directory path (~/.config/gridcal)
pub fn config_dir() -> GridCalResult<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| GridCalError::Config("could not determine config directory".to_string()))?
        .join("gridcal");
    Ok(dir)
}

/// Get the config file path (~/.config/gridcal/config.toml)
pub fn config_path() -> GridCalResult<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Per-source prior-state file (~/.local/share/gridcal/state/<source>.json)
pub fn state_path(source: &str) -> GridCalResult<PathBuf> {
    let dir = dirs::data_dir()
        .ok_or_else(|| GridCalError::Config("could not determine data directory".to_string()))?
        .join("gridcal")
        .join("state");
    Ok(dir.join(format!("{source}.json")))
}

/// Load config from ~/.config/gridcal/config.toml
pub fn load_config() -> GridCalResult<Config> {
    let path = config_path()?;

    if !path.exists() {
        return Err(GridCalError::Config(format!(
            "config file not found at {}\n\n\
             Create it with the term window and at least one source:\n\n\
             [term]\n\
             start = \"2026-08-25\"\n\
             end = \"2026-12-20\"\n\n\
             [sources.core-courses]\n\
             grid = \"~/schedules/core-courses.json\"",
            path.display()
        )));
    }

    let contents = std::fs::read_to_string(&path)?;
    Config::from_toml(&contents)
}

/// Read the pre-shared remote-store key from the environment.
pub fn auth_key() -> GridCalResult<String> {
    match std::env::var(AUTH_KEY_VAR) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(GridCalError::Config(format!(
            "{AUTH_KEY_VAR} is not set; the remote store requires a pre-shared key"
        ))),
    }
}

/// Expand ~ in paths to the home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config = Config::from_toml(
            r#"
            [term]
            start = "2026-08-25"
            end = "2026-12-20"

            [sources.core-courses]
            grid = "~/schedules/core.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.interpreter.precedence, default_precedence());
        assert!(config.api.is_none());
        assert_eq!(config.sources.len(), 1);
        assert_eq!(
            config.engine().window.start,
            NaiveDate::from_ymd_opt(2026, 8, 25).unwrap()
        );
    }

    #[test]
    fn test_precedence_is_configurable() {
        let config = Config::from_toml(
            r#"
            [term]
            start = "2026-08-25"
            end = "2026-12-20"

            [interpreter]
            precedence = ["meeting", "exception"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.interpreter.precedence,
            vec![Convention::Meeting, Convention::Exception]
        );
    }

    #[test]
    fn test_inverted_term_window_is_rejected() {
        let result = Config::from_toml(
            r#"
            [term]
            start = "2026-12-20"
            end = "2026-08-25"
            "#,
        );
        assert!(matches!(result, Err(GridCalError::Config(_))));
    }
}
