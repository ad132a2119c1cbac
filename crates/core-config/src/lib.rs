//! Configuration loading and parsing.
//!
//! Parse `tycho.toml` (or an override path provided by the binary) for the
//! command-archive artifact paths, the events database path, and the default
//! initial-state lookback sequence. Unknown fields are ignored (TOML
//! deserialization tolerance) so the file can grow without breaking older
//! builds. A missing or unparseable file falls back to defaults.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::warn;

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    /// Command archive file (date-sorted command records).
    #[serde(default = "ArchiveConfig::default_commands")]
    pub commands: PathBuf,
    /// Parameter dictionary file (frozen tuple -> idx pairs).
    #[serde(default = "ArchiveConfig::default_params")]
    pub params: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            commands: Self::default_commands(),
            params: Self::default_params(),
        }
    }
}

impl ArchiveConfig {
    fn default_commands() -> PathBuf {
        PathBuf::from("archive/cmds.json")
    }
    fn default_params() -> PathBuf {
        PathBuf::from("archive/pars.json")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    #[serde(default = "EventsConfig::default_database")]
    pub database: PathBuf,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            database: Self::default_database(),
        }
    }
}

impl EventsConfig {
    fn default_database() -> PathBuf {
        PathBuf::from("events.db3")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct State0Config {
    /// Lookback windows (days) tried in ascending order by the
    /// initial-state resolver.
    #[serde(default = "State0Config::default_lookbacks")]
    pub lookbacks: Vec<f64>,
}

impl Default for State0Config {
    fn default() -> Self {
        Self {
            lookbacks: Self::default_lookbacks(),
        }
    }
}

impl State0Config {
    fn default_lookbacks() -> Vec<f64> {
        vec![7.0, 30.0, 180.0, 1000.0]
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub state0: State0Config,
}

#[derive(Debug, Default, Clone)]
pub struct Config {
    pub raw: Option<String>, // original file string (optional)
    pub file: ConfigFile,    // parsed (or default) data
}

/// Best-effort config path following platform conventions (XDG / AppData
/// Roaming). Prefers a local working-directory `tycho.toml`.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("tycho.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("tycho").join("tycho.toml");
    }
    // Final fallback relative filename.
    PathBuf::from("tycho.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => Ok(Config {
                raw: Some(content),
                file,
            }),
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed");
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert_eq!(cfg.file.archive.commands, PathBuf::from("archive/cmds.json"));
        assert_eq!(cfg.file.state0.lookbacks, vec![7.0, 30.0, 180.0, 1000.0]);
    }

    #[test]
    fn parses_archive_paths() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[archive]\ncommands = \"/data/cmds.json\"\nparams = \"/data/pars.json\"\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.archive.commands, PathBuf::from("/data/cmds.json"));
        assert_eq!(cfg.file.archive.params, PathBuf::from("/data/pars.json"));
        // Untouched sections keep defaults.
        assert_eq!(cfg.file.events.database, PathBuf::from("events.db3"));
    }

    #[test]
    fn parses_lookbacks_and_tolerates_unknown_fields() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[state0]\nlookbacks = [3, 10]\nfuture_knob = true\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.state0.lookbacks, vec![3.0, 10.0]);
    }

    #[test]
    fn parse_error_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[archive\nnot toml at all").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(cfg.raw.is_none());
        assert_eq!(cfg.file.events.database, PathBuf::from("events.db3"));
    }
}
