//! `cartilla.toml` and pressure table files.
//!
//! # Example
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "json"
//!
//! [table]
//! path = "psi_gph.json"
//! ```
//!
//! Table files are either a JSON array of `{psi, gph}` objects or a TOML
//! document with one `[[entry]]` per calibration point.

use std::path::{Path, PathBuf};

use cartilla_core::{PressureFlowEntry, PressureTable};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "cartilla.toml";

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub table: TableConfig,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `CARTILLA_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `[table]` section. Without a path the built-in calibration table is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct TomlTable {
    entry: Vec<PressureFlowEntry>,
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Load the configuration.
///
/// An explicit `path` must exist. Otherwise `cartilla.toml` in the working
/// directory is read when present, and defaults apply when it is not.
/// A relative table path is resolved against the config file's directory.
pub fn load(path: Option<&Path>) -> Result<Config, String> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    if !required && !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    let mut config: Config = toml::from_str(&content)
        .map_err(|e| format!("could not parse '{}': {}", path.display(), e))?;

    if let (Some(table), Some(dir)) = (config.table.path.as_mut(), path.parent()) {
        if table.is_relative() {
            *table = dir.join(&*table);
        }
    }
    Ok(config)
}

/// Read and validate a pressure table file.
pub fn read_table(path: &Path) -> Result<PressureTable, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;

    let entries = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_json(&content),
        Some("toml") => parse_toml(&content),
        _ => parse_json(&content).or_else(|json_err| {
            parse_toml(&content)
                .map_err(|toml_err| format!("neither JSON ({json_err}) nor TOML ({toml_err})"))
        }),
    }
    .map_err(|e| format!("could not parse '{}': {}", path.display(), e))?;

    PressureTable::new(entries).map_err(|e| format!("{}: {}", path.display(), e))
}

/// The table a command should use: an explicit file, then the configured
/// file, then the built-in table.
pub fn resolve_table(explicit: Option<&Path>, config: &Config) -> Result<PressureTable, String> {
    match explicit.or(config.table.path.as_deref()) {
        Some(path) => {
            let table = read_table(path)?;
            tracing::debug!(path = %path.display(), entries = table.len(), "loaded pressure table");
            Ok(table)
        }
        None => Ok(PressureTable::default()),
    }
}

fn parse_json(content: &str) -> Result<Vec<PressureFlowEntry>, String> {
    serde_json::from_str(content).map_err(|e| e.to_string())
}

fn parse_toml(content: &str) -> Result<Vec<PressureFlowEntry>, String> {
    toml::from_str::<TomlTable>(content)
        .map(|t| t.entry)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("absent.toml");
        assert!(load(Some(&explicit)).is_err());

        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.table.path, None);
    }

    #[test]
    fn config_sections_parse_and_table_path_is_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cartilla.toml");
        fs::write(
            &path,
            "[logging]\nlevel = \"debug\"\nformat = \"json\"\n\n[table]\npath = \"psi.json\"\n",
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.table.path, Some(dir.path().join("psi.json")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cartilla.toml");
        fs::write(&path, "[logging]\nlevl = \"debug\"\n").unwrap();
        assert!(load(Some(&path)).unwrap_err().contains("could not parse"));
    }

    #[test]
    fn json_and_toml_tables_read_the_same() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("t.json");
        fs::write(&json, r#"[{"psi": 16, "gph": 3.8}, {"psi": 17, "gph": 3.9}]"#).unwrap();
        let toml = dir.path().join("t.toml");
        fs::write(
            &toml,
            "[[entry]]\npsi = 16\ngph = 3.8\n\n[[entry]]\npsi = 17\ngph = 3.9\n",
        )
        .unwrap();
        let sniffed = dir.path().join("t.cfg");
        fs::write(&sniffed, fs::read_to_string(&toml).unwrap()).unwrap();

        let expected = PressureTable::from_pairs(&[(16.0, 3.8), (17.0, 3.9)]).unwrap();
        assert_eq!(read_table(&json).unwrap(), expected);
        assert_eq!(read_table(&toml).unwrap(), expected);
        assert_eq!(read_table(&sniffed).unwrap(), expected);
    }

    #[test]
    fn unsorted_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        fs::write(&path, r#"[{"psi": 20, "gph": 4.3}, {"psi": 16, "gph": 3.8}]"#).unwrap();
        assert!(read_table(&path)
            .unwrap_err()
            .contains("invalid pressure table"));
    }

    #[test]
    fn explicit_table_wins_over_configured_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        fs::write(&path, r#"[{"psi": 10, "gph": 1.0}]"#).unwrap();
        let config = Config {
            table: TableConfig {
                path: Some(dir.path().join("missing.json")),
            },
            ..Default::default()
        };
        assert_eq!(resolve_table(Some(&path), &config).unwrap().len(), 1);
        assert!(resolve_table(None, &config).is_err());
        assert_eq!(resolve_table(None, &Config::default()).unwrap().len(), 33);
    }
}
