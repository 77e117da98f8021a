//! Configuration file parser for ~/.config/coursecat/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning for each so
//! typos do not go unnoticed.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::category::{cache::DEFAULT_RECORD_CAPACITY, DEFAULT_CATEGORY_NAME};
use crate::tree::{DisplayOptions, PagingOptions, ShowCourses};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration. Any subset of keys may be given.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file; `None` uses `coursecat.db` in the config directory.
    pub database_path: Option<PathBuf>,

    /// Name of the category created when the tree is found empty.
    pub default_category_name: String,

    /// Number of category records kept in the in-memory cache.
    pub cache_capacity: usize,

    /// Tracing filter used when `RUST_LOG` is not set (e.g. "info",
    /// "coursecat=debug").
    pub log_level: Option<String>,

    pub tree: TreeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            default_category_name: DEFAULT_CATEGORY_NAME.to_string(),
            cache_capacity: DEFAULT_RECORD_CAPACITY,
            log_level: None,
            tree: TreeConfig::default(),
        }
    }
}

/// The `[tree]` table: defaults for rendering the category tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Levels loaded below the rendered root; 0 loads everything.
    pub subcategory_depth: i64,
    pub show_courses: ShowCourses,
    /// 0 disables paging.
    pub categories_per_page: usize,
    /// 0 disables paging.
    pub courses_per_page: usize,
    pub summary_width: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            subcategory_depth: 2,
            show_courses: ShowCourses::Collapsed,
            categories_per_page: 20,
            courses_per_page: 20,
            summary_width: 200,
        }
    }
}

impl TreeConfig {
    pub fn display_options(&self) -> DisplayOptions {
        let paging = |per_page: usize| PagingOptions {
            limit: (per_page > 0).then_some(per_page),
            ..PagingOptions::default()
        };
        DisplayOptions {
            show_courses: self.show_courses,
            subcategory_depth: self.subcategory_depth,
            categories: paging(self.categories_per_page),
            courses: paging(self.courses_per_page),
            summary_width: self.summary_width,
            ..DisplayOptions::default()
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "database_path",
        "default_category_name",
        "cache_capacity",
        "log_level",
        "tree",
    ];

    const KNOWN_TREE_KEYS: [&'static str; 5] = [
        "subcategory_depth",
        "show_courses",
        "categories_per_page",
        "courses_per_page",
        "summary_width",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in unknown_keys(&raw) {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::debug!(
            show_courses = %config.tree.show_courses,
            subcategory_depth = config.tree.subcategory_depth,
            "Loaded configuration"
        );
        Ok(config)
    }
}

fn unknown_keys(raw: &toml::Table) -> Vec<String> {
    let mut unknown: Vec<String> = raw
        .keys()
        .filter(|key| !Config::KNOWN_KEYS.contains(&key.as_str()))
        .cloned()
        .collect();
    if let Some(toml::Value::Table(tree)) = raw.get("tree") {
        unknown.extend(
            tree.keys()
                .filter(|key| !Config::KNOWN_TREE_KEYS.contains(&key.as_str()))
                .map(|key| format!("tree.{key}")),
        );
    }
    unknown
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_category_name, "Miscellaneous");
        assert_eq!(config.cache_capacity, 512);
        assert!(config.database_path.is_none());
        assert_eq!(config.tree.subcategory_depth, 2);
        assert_eq!(config.tree.show_courses, ShowCourses::Collapsed);
        assert_eq!(config.tree.courses_per_page, 20);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/coursecat_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_whitespace_only_returns_default() {
        assert_eq!(Config::parse("   \n  \n").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_tree_table() {
        let config = Config::parse(
            r#"
default_category_name = "General"

[tree]
show_courses = "expanded-with-category-label"
subcategory_depth = 0
"#,
        )
        .unwrap();
        assert_eq!(config.default_category_name, "General");
        assert_eq!(config.tree.show_courses, ShowCourses::ExpandedWithCategoryLabel);
        assert_eq!(config.tree.subcategory_depth, 0);
        assert_eq!(config.tree.categories_per_page, 20);
    }

    #[test]
    fn test_display_options_from_tree_config() {
        let tree = TreeConfig {
            courses_per_page: 0,
            ..TreeConfig::default()
        };
        let options = tree.display_options();
        assert_eq!(options.categories.limit, Some(20));
        assert_eq!(options.courses.limit, None);
        assert_eq!(options.subcategory_depth, 2);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::parse("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_show_courses_mode_rejected() {
        let err = Config::parse("[tree]\nshow_courses = \"everything\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_keys_reported_and_accepted() {
        let content = r#"
cache_capacity = 64
totally_fake_key = "x"

[tree]
depth = 3
"#;
        let raw: toml::Table = content.parse().unwrap();
        assert_eq!(
            unknown_keys(&raw),
            vec!["totally_fake_key".to_string(), "tree.depth".to_string()]
        );

        let config = Config::parse(content).unwrap();
        assert_eq!(config.cache_capacity, 64);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("coursecat_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("coursecat_config_test_load");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "database_path = \"/var/lib/coursecat.db\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/var/lib/coursecat.db"))
        );

        std::fs::remove_dir_all(&dir).ok();
    }
}
