//! Daemon configuration.
//!
//! ```yaml
//! watchers:
//!   - name: science
//!     root: /data/dr/science
//!     scan_interval_secs: 30
//!     move_to_processing: true
//!     manifest_suffixes: ["_sdnm.xml"]
//! ```
//!
//! Default location is `~/.dr/dr.yaml`. Loading always validates.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dr_core::MANIFEST_SUFFIXES;

use crate::error::{io_err, DaemonError};
use crate::paths::WatcherPaths;

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub watchers: Vec<WatcherConfig>,
}

/// One monitored directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub name: String,
    /// Holds `incoming/`, `processing/` and `state/`.
    pub root: PathBuf,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// `false` copies listed files into processing instead of moving them.
    #[serde(default = "default_true")]
    pub move_to_processing: bool,
    #[serde(default = "default_manifest_suffixes")]
    pub manifest_suffixes: Vec<String>,
}

fn default_scan_interval_secs() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

fn default_manifest_suffixes() -> Vec<String> {
    MANIFEST_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

impl WatcherConfig {
    /// Watcher over `root` with every default applied.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            move_to_processing: true,
            manifest_suffixes: default_manifest_suffixes(),
        }
    }

    pub fn paths(&self) -> WatcherPaths {
        WatcherPaths::new(&self.root)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn accepts(&self, manifest_name: &str) -> bool {
        self.manifest_suffixes
            .iter()
            .any(|suffix| manifest_name.ends_with(suffix.as_str()))
    }
}

impl DaemonConfig {
    /// Read and validate the config at `path`.
    pub fn load_at(path: &Path) -> Result<Self, DaemonError> {
        if !path.exists() {
            return Err(DaemonError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let config: Self =
            serde_yaml::from_str(&contents).map_err(|source| DaemonError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.watchers.is_empty() {
            return Err(DaemonError::InvalidConfig(
                "at least one watcher is required".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for watcher in &self.watchers {
            if watcher.name.trim().is_empty() {
                return Err(DaemonError::InvalidConfig("watcher name is empty".to_string()));
            }
            if !names.insert(watcher.name.as_str()) {
                return Err(DaemonError::InvalidConfig(format!(
                    "duplicate watcher name '{}'",
                    watcher.name
                )));
            }
            if watcher.scan_interval_secs == 0 {
                return Err(DaemonError::InvalidConfig(format!(
                    "watcher '{}': scan_interval_secs must be greater than zero",
                    watcher.name
                )));
            }
            if watcher.manifest_suffixes.is_empty() {
                return Err(DaemonError::InvalidConfig(format!(
                    "watcher '{}': no manifest suffixes",
                    watcher.name
                )));
            }
        }
        Ok(())
    }

    pub fn watcher(&self, name: &str) -> Option<&WatcherConfig> {
        self.watchers.iter().find(|w| w.name == name)
    }

    /// First watcher whose suffixes accept `manifest_name`.
    pub fn watcher_for_manifest(&self, manifest_name: &str) -> Option<&WatcherConfig> {
        self.watchers.iter().find(|w| w.accepts(manifest_name))
    }
}

/// `<home>/.dr/dr.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".dr").join("dr.yaml")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write(dir: &TempDir, yaml: &str) -> PathBuf {
        let path = dir.path().join("dr.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[test]
    fn defaults_are_applied() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "watchers:\n  - name: science\n    root: /data/science\n");
        let config = DaemonConfig::load_at(&path).unwrap();
        let watcher = &config.watchers[0];
        assert_eq!(watcher.scan_interval(), Duration::from_secs(30));
        assert!(watcher.move_to_processing);
        assert_eq!(watcher.manifest_suffixes.len(), MANIFEST_SUFFIXES.len());
        assert_eq!(watcher, &WatcherConfig::new("science", "/data/science"));
    }

    #[test]
    fn missing_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = DaemonConfig::load_at(&tmp.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, DaemonError::ConfigNotFound { .. }));
    }

    #[test]
    fn malformed_yaml_names_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "watchers: [ {name: ");
        let err = DaemonConfig::load_at(&path).unwrap_err();
        assert!(matches!(err, DaemonError::ConfigParse { .. }));
        assert!(err.to_string().contains("dr.yaml"));
    }

    #[test]
    fn duplicate_names_and_zero_interval_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let dup = write(
            &tmp,
            "watchers:\n  - {name: a, root: /x}\n  - {name: a, root: /y}\n",
        );
        assert!(matches!(
            DaemonConfig::load_at(&dup),
            Err(DaemonError::InvalidConfig(_))
        ));

        let zero = write(&tmp, "watchers:\n  - {name: a, root: /x, scan_interval_secs: 0}\n");
        assert!(matches!(
            DaemonConfig::load_at(&zero),
            Err(DaemonError::InvalidConfig(_))
        ));

        let empty = write(&tmp, "watchers: []\n");
        assert!(matches!(
            DaemonConfig::load_at(&empty),
            Err(DaemonError::InvalidConfig(_))
        ));
    }

    #[test]
    fn watcher_selection_by_suffix() {
        let config = DaemonConfig {
            watchers: vec![
                WatcherConfig {
                    manifest_suffixes: vec!["_tlnm.xml".into()],
                    ..WatcherConfig::new("targets", "/t")
                },
                WatcherConfig::new("science", "/s"),
            ],
        };
        assert_eq!(
            config.watcher_for_manifest("kplr1_tlnm.xml").unwrap().name,
            "targets"
        );
        assert_eq!(
            config.watcher_for_manifest("kplr1_sdnm.xml").unwrap().name,
            "science"
        );
        assert!(config.watcher_for_manifest("notes.txt").is_none());
        assert_eq!(config.watcher("science").unwrap().root, PathBuf::from("/s"));
    }

    #[test]
    fn config_path_is_under_home() {
        assert_eq!(
            config_path_at(Path::new("/home/op")),
            PathBuf::from("/home/op/.dr/dr.yaml")
        );
    }
}
