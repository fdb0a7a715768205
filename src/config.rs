//! Query configuration files.
//!
//! ```yaml
//! root:
//!   - ~/Music
//! query:
//!   - - name=NAME1
//!   - - name=NAME2
//!     - artist=ARTIST
//! ```
//!
//! The same document may be written as JSON. `query` is a list of OR groups,
//! each a list of AND-combined `key=value` tokens.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SiftError;
use crate::query::{expand_env, parse_groups};
use crate::selector::OrSelector;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub root: Vec<String>,

    #[serde(default)]
    pub query: Vec<Vec<String>>,
}

impl Config {
    /// Parse a config document, trying JSON first and YAML second, then
    /// validate it.
    pub fn parse(src: &str) -> Result<Self, SiftError> {
        let config: Config = match serde_json::from_str(src) {
            Ok(c) => c,
            Err(json_err) => serde_yaml::from_str(src).map_err(|yaml_err| {
                SiftError::Config(format!("not JSON ({}) nor YAML ({})", json_err, yaml_err))
            })?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_reader(mut r: impl Read) -> Result<Self, SiftError> {
        let mut src = String::new();
        r.read_to_string(&mut src)
            .map_err(|e| SiftError::Config(format!("failed to read config: {}", e)))?;
        Self::parse(&src)
    }

    pub fn from_path(path: &Path) -> Result<Self, SiftError> {
        let src = fs::read_to_string(path).map_err(|e| {
            SiftError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&src)
    }

    /// At least one root, at least one query group, and no empty group.
    pub fn validate(&self) -> Result<(), SiftError> {
        if self.root.is_empty() {
            return Err(SiftError::Config("no root".into()));
        }
        if self.query.is_empty() {
            return Err(SiftError::Config("no query".into()));
        }
        if let Some(i) = self.query.iter().position(Vec::is_empty) {
            return Err(SiftError::Config(format!("empty query at index {}", i)));
        }
        Ok(())
    }

    pub fn selector(&self) -> Result<OrSelector, SiftError> {
        parse_groups(&self.query)
    }

    /// Roots with environment variables expanded.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.root.iter().map(|r| PathBuf::from(expand_env(r))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected() -> Config {
        Config {
            root:  vec!["ROOT".into()],
            query: vec![vec!["name=NAME".into()]],
        }
    }

    #[test]
    fn parses_json() {
        let src = r#"{
  "root": ["ROOT"],
  "query": [["name=NAME"]]
}"#;
        assert_eq!(Config::parse(src).unwrap(), expected());
    }

    #[test]
    fn parses_yaml() {
        let src = "root:\n- ROOT\nquery:\n- - name=NAME\n";
        assert_eq!(Config::from_reader(src.as_bytes()).unwrap(), expected());
    }

    #[test]
    fn rejects_empty_group() {
        let src = "root:\n- ROOT\nquery:\n- - name=NAME\n- []\n";
        assert!(matches!(Config::parse(src), Err(SiftError::Config(_))));

        let null_group = "root:\n- ROOT\nquery:\n- - name=NAME\n-\n";
        assert!(matches!(Config::parse(null_group), Err(SiftError::Config(_))));
    }

    #[test]
    fn rejects_missing_query_or_root() {
        assert!(matches!(Config::parse("root:\n- ROOT\n"), Err(SiftError::Config(_))));
        assert!(matches!(Config::parse("query:\n- - name=NAME\n"), Err(SiftError::Config(_))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(Config::parse("[unclosed"), Err(SiftError::Config(_))));
    }

    #[test]
    fn builds_or_of_groups() {
        let config = Config {
            root:  vec!["$METASIFT_CONFIG_TEST_ROOT/music".into()],
            query: vec![vec!["name=a".into()], vec!["name=b".into(), "ext=mp3".into()]],
        };
        assert_eq!(config.selector().unwrap().len(), 2);

        std::env::set_var("METASIFT_CONFIG_TEST_ROOT", "/data");
        assert_eq!(config.roots(), vec![PathBuf::from("/data/music")]);
    }

    #[test]
    fn bad_pattern_in_config_fails() {
        let config = Config {
            root:  vec!["r".into()],
            query: vec![vec!["name=(".into()]],
        };
        assert!(matches!(config.selector(), Err(SiftError::InvalidPattern { .. })));
    }
}
