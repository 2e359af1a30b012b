use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::errors::RigError;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "scriptrig.yaml";

/// Suite settings. Every field is optional in the YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub test_root: PathBuf,
    pub extensions: Vec<String>,
    /// Per-script wall-clock limit; `0` disables it.
    pub timeout_ms: u64,
    pub max_depth: usize,
    /// Engine options applied to every script before its own `@option`s.
    pub default_options: Vec<String>,
    pub golden_suffix: String,
    pub use_colors: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            test_root: PathBuf::from("tests/scripts"),
            extensions: vec!["js".to_string()],
            timeout_ms: 10_000,
            max_depth: 200,
            default_options: Vec::new(),
            golden_suffix: ".EXPECTED".to_string(),
            use_colors: atty::is(atty::Stream::Stdout),
        }
    }
}

impl HarnessConfig {
    pub fn from_yaml(text: &str) -> Result<Self, RigError> {
        serde_yaml::from_str(text).map_err(|e| RigError::Config {
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, RigError> {
        let text = std::fs::read_to_string(path).map_err(|e| RigError::io(path.display(), e))?;
        Self::from_yaml(&text)
    }

    /// Loads `scriptrig.yaml` from `dir` when it exists, defaults otherwise.
    pub fn discover(dir: &Path) -> Result<Self, RigError> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "loading configuration");
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// `foo.js` → `foo.js.EXPECTED`.
    pub fn golden_path(&self, script: &Path) -> PathBuf {
        let mut name = script.as_os_str().to_os_string();
        name.push(&self.golden_suffix);
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = HarnessConfig::from_yaml("timeout_ms: 50\ndefault_options: [-scripting]\n").unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_millis(50)));
        assert_eq!(config.default_options, vec!["-scripting"]);
        assert_eq!(config.extensions, vec!["js"]);
        assert_eq!(config.max_depth, 200);
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        let err = HarnessConfig::from_yaml("timeout: 5\n").unwrap_err();
        assert!(matches!(err, RigError::Config { .. }));
    }

    #[test]
    fn zero_timeout_disables_the_limit() {
        let config = HarnessConfig {
            timeout_ms: 0,
            ..HarnessConfig::default()
        };
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn golden_files_sit_next_to_scripts() {
        let config = HarnessConfig::default();
        assert_eq!(
            config.golden_path(Path::new("a/b.js")),
            PathBuf::from("a/b.js.EXPECTED")
        );
    }
}
