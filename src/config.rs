//! On-disk configuration for `lading`, loaded from `<root>/lading.toml`.
//!
//! An absent file is equivalent to an empty document (every field at its
//! default). Unknown top-level keys are rejected, surfaced as
//! [`LadingError::Config`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LadingError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields, default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bump: BumpConfig,
    pub publish: PublishConfig,
    pub preflight: PreflightConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields, default)]
#[serde(rename_all = "kebab-case")]
pub struct BumpConfig {
    pub exclude: Vec<String>,
    pub documentation: DocumentationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields, default)]
#[serde(rename_all = "kebab-case")]
pub struct DocumentationConfig {
    pub globs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields, default)]
#[serde(rename_all = "kebab-case")]
pub struct PublishConfig {
    pub exclude: Vec<String>,
    pub order: Option<Vec<String>>,
    pub strip_patches: StripPatches,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StripPatches {
    All,
    PerCrate,
    None,
}

impl Default for StripPatches {
    fn default() -> Self {
        StripPatches::PerCrate
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
#[serde(rename_all = "kebab-case")]
pub struct PreflightConfig {
    pub test_exclude: Vec<String>,
    pub unit_tests_only: bool,
    pub aux_build: Vec<Vec<String>>,
    pub compiletest_extern: BTreeMap<String, PathBuf>,
    pub env: BTreeMap<String, String>,
    pub stderr_tail_lines: usize,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            test_exclude: Vec::new(),
            unit_tests_only: false,
            aux_build: Vec::new(),
            compiletest_extern: BTreeMap::new(),
            env: BTreeMap::new(),
            stderr_tail_lines: 40,
        }
    }
}

impl Config {
    pub fn from_defaults() -> Self {
        Self::default()
    }

    /// Resolve configuration by loading `<root>/lading.toml`. An absent file
    /// yields the default configuration.
    pub fn load(root: &Path) -> Result<Self, LadingError> {
        let path = root.join("lading.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(LadingError::Io)?;
        toml::from_str(&text)
            .map_err(|e| LadingError::Config(format!("{}: {}", path.display(), e)))
    }
}
