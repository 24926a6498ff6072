//! Configuration schema (sqlbind.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Database engine a package is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// PostgreSQL: `$N` placeholders, `public` default schema
    #[serde(alias = "postgres")]
    PostgreSql,

    /// MySQL: `?` placeholders, `#` comments
    MySql,

    /// SQLite: `?` placeholders, `main` default schema
    Sqlite,
}

impl Engine {
    /// Schema used for unqualified table names
    pub fn default_schema(&self) -> &'static str {
        match self {
            Self::PostgreSql | Self::MySql => "public",
            Self::Sqlite => "main",
        }
    }

    /// Whether positional parameters are written `$N`
    pub fn uses_dollar_params(&self) -> bool {
        matches!(self, Self::PostgreSql)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::PostgreSql
    }
}

impl std::fmt::Display for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PostgreSql => write!(f, "postgresql"),
            Self::MySql => write!(f, "mysql"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// One schema + queries package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlPackage {
    /// Package name, unique within the config
    pub name: String,

    /// Target engine
    #[serde(default)]
    pub engine: Engine,

    /// Schema files or directories
    pub schema: Vec<PathBuf>,

    /// Query files or directories
    pub queries: Vec<PathBuf>,
}

impl SqlPackage {
    /// Schema paths resolved against `root`
    pub fn schema_paths(&self, root: &Path) -> Vec<PathBuf> {
        self.schema.iter().map(|p| root.join(p)).collect()
    }

    /// Query paths resolved against `root`
    pub fn query_paths(&self, root: &Path) -> Vec<PathBuf> {
        self.queries.iter().map(|p| root.join(p)).collect()
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Packages to compile
    #[serde(default, rename = "sql")]
    pub packages: Vec<SqlPackage>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.project_root = std::env::current_dir().unwrap_or_default();
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Check package list invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packages.is_empty() {
            return Err(ConfigError::Invalid("no [[sql]] packages configured".to_string()));
        }

        let mut seen = HashSet::new();
        for package in &self.packages {
            if !seen.insert(package.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicated package name: {}",
                    package.name
                )));
            }
            if package.schema.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "package {}: no schema paths",
                    package.name
                )));
            }
            if package.queries.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "package {}: no query paths",
                    package.name
                )));
            }
        }

        Ok(())
    }

    /// Look up a package by name
    pub fn package(&self, name: &str) -> Option<&SqlPackage> {
        self.packages.iter().find(|p| p.name == name)
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[sql]]
name = "app"
engine = "postgresql"
schema = ["schema"]
queries = ["queries/users.sql"]

[[sql]]
name = "legacy"
engine = "mysql"
schema = ["legacy/schema.sql"]
queries = ["legacy/queries"]
"#;

    #[test]
    fn parse_packages() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.packages.len(), 2);
        assert_eq!(config.packages[0].engine, Engine::PostgreSql);
        assert_eq!(config.package("legacy").unwrap().engine, Engine::MySql);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn engine_defaults_to_postgresql() {
        let config = Config::from_toml("[[sql]]\nname = \"a\"\nschema = [\"s\"]\nqueries = [\"q\"]\n").unwrap();
        assert_eq!(config.packages[0].engine, Engine::PostgreSql);
        assert_eq!(config.packages[0].engine.default_schema(), "public");
    }

    #[test]
    fn duplicate_package_names_rejected() {
        let toml = "[[sql]]\nname = \"a\"\nschema = [\"s\"]\nqueries = [\"q\"]\n\n[[sql]]\nname = \"a\"\nschema = [\"s\"]\nqueries = [\"q\"]\n";
        let config = Config::from_toml(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicated package name: a"));
    }

    #[test]
    fn empty_config_is_invalid() {
        let config = Config::from_toml("").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn paths_resolve_against_root() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let paths = config.packages[0].query_paths(Path::new("/project"));
        assert_eq!(paths, vec![PathBuf::from("/project/queries/users.sql")]);
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let toml = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&toml).unwrap();
        assert_eq!(config.packages, parsed.packages);
    }
}
