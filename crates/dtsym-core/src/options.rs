//! Generation options

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Knobs controlling how symbols are named and comments rendered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenOptions {
    /// Prefix of every symbol
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Width the symbol name is padded to in `#define` lines
    #[serde(default = "default_name_width")]
    pub name_width: usize,
    /// Paths below this directory are shown relative to it in comments
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Placeholder shown in place of `base_dir`
    #[serde(default = "default_base_dir_label")]
    pub base_dir_label: String,
    /// Also emit node-scoped facts under the `PATH_<path>` identifier
    #[serde(default)]
    pub path_identifiers: bool,
    /// When set, `<COMPAT>_<ALIAS>` aliases are annotated as deprecated
    /// with this note
    #[serde(default)]
    pub compat_alias_deprecation: Option<String>,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            name_width: default_name_width(),
            base_dir: None,
            base_dir_label: default_base_dir_label(),
            path_identifiers: false,
            compat_alias_deprecation: None,
        }
    }
}

fn default_prefix() -> String {
    "DT_".to_string()
}

fn default_name_width() -> usize {
    40
}

fn default_base_dir_label() -> String {
    "$ZEPHYR_BASE".to_string()
}

impl GenOptions {
    /// Show `path` relative to `base_dir` when it lies below it
    pub fn relativize(&self, path: &str) -> String {
        let Some(base) = &self.base_dir else {
            return path.to_string();
        };
        match Path::new(path).strip_prefix(base) {
            Ok(rel) => Path::new(&self.base_dir_label)
                .join(rel)
                .display()
                .to_string(),
            Err(_) => path.to_string(),
        }
    }
}
