use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{AuditError, Result};

const DEFAULT_API_URL: &str = "https://api.bitbucket.org/2.0";

/// Audit configuration read from the YAML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(rename = "user")]
    pub username: String,
    #[serde(rename = "passwd", default)]
    pub password: String,
    pub owner: String,
    /// Base directory that repositories are cloned into
    #[serde(rename = "clone")]
    pub clone_dir: PathBuf,
    /// Substring identifying configuration files
    pub pattern: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl AuditConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuditError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: AuditConfig = serde_yaml::from_str(content)
            .map_err(|e| AuditError::Config(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("user", self.username.is_empty()),
            ("owner", self.owner.is_empty()),
            ("clone", self.clone_dir.as_os_str().is_empty()),
            ("pattern", self.pattern.is_empty()),
        ];
        if let Some((key, _)) = required.iter().find(|(_, empty)| *empty) {
            return Err(AuditError::Config(format!("`{}` must not be empty", key)));
        }
        Ok(())
    }
}

/// File locations taken from the process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub result_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        let var = |key: &str, default: &str| {
            PathBuf::from(std::env::var(key).unwrap_or_else(|_| default.into()))
        };
        Self {
            config_path: var("AUDIT_CONFIG", "config.yml"),
            checkpoint_path: var("AUDIT_CHECKPOINT", "check.txt"),
            result_dir: var("AUDIT_RESULT_DIR", "result"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = "user: alice\npasswd: secret\nowner: acme\nclone: /tmp/audit\npattern: conf\n";
        let config = AuditConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.username, "alice");
        assert_eq!(config.password, "secret");
        assert_eq!(config.owner, "acme");
        assert_eq!(config.clone_dir, PathBuf::from("/tmp/audit"));
        assert_eq!(config.pattern, "conf");
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let yaml = "user: alice\nowner: acme\nclone: /tmp/audit\npattern: \"\"\n";
        let err = AuditConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, AuditError::Config(ref m) if m.contains("pattern")));
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(
            AuditConfig::from_yaml("user: [unterminated"),
            Err(AuditError::Config(_))
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AuditConfig::load(&dir.path().join("config.yml")).unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }
}
