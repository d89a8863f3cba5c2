use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{NamespaceError, Result};
use crate::namespace::NamespaceConfig;

/// Top-level configuration file: a list of namespaces
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            NamespaceError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Namespace names must be present and unique
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (index, namespace) in self.namespaces.iter().enumerate() {
            if namespace.name.is_empty() {
                return Err(NamespaceError::Config(format!(
                    "namespace #{} has no name",
                    index
                )));
            }
            if !seen.insert(namespace.name.as_str()) {
                return Err(NamespaceError::Config(format!(
                    "namespace '{}' is defined more than once",
                    namespace.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_namespaces() {
        let config = Config::from_toml_str(
            r#"
            [[namespaces]]
            name = "edge"

            [[namespaces]]
            name = "api"
            source = { syslog = { listen_address = "udp://127.0.0.1:5531", tags = ["nginx"] } }
            "#,
        )
        .unwrap();

        assert_eq!(config.namespaces.len(), 2);
        let syslog = config.namespaces[1].source_data.syslog.as_ref().unwrap();
        assert_eq!(syslog.listen_address, "udp://127.0.0.1:5531");
        assert_eq!(syslog.tags, vec!["nginx"]);
    }

    #[test]
    fn test_duplicate_namespace_rejected() {
        let err = Config::from_toml_str(
            r#"
            [[namespaces]]
            name = "edge"

            [[namespaces]]
            name = "edge"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("defined more than once"));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            Config::from_toml_str("namespaces = 3"),
            Err(NamespaceError::Toml(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/nginxlog.toml"),
            Err(NamespaceError::Config(_))
        ));
    }
}
