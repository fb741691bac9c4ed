use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::tag::FrameLayout;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENV_PREFIX: &str = "AUTOTAGFS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `<artist>/<album>/<title>` library.
    pub source: String,
    pub fuse: FuseConfig,
    pub cache: CacheConfig,
    pub tag: TagConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuseConfig {
    pub mount_point: String,
    pub allow_other: bool,
    /// Let root (in addition to the mounting user) access the mount.
    pub allow_root: bool,
    pub auto_unmount: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    pub layout: FrameLayout,
    /// File extensions that receive a synthetic tag; `*` matches every file.
    pub extensions: Vec<String>,
}

impl Default for FuseConfig {
    fn default() -> Self {
        Self {
            mount_point: "/mnt/autotagfs".to_string(),
            allow_other: false,
            allow_root: false,
            auto_unmount: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: DEFAULT_MAX_ENTRIES }
    }
}

impl Default for TagConfig {
    fn default() -> Self {
        Self { layout: FrameLayout::Compact, extensions: vec!["mp3".to_string()] }
    }
}

impl TagConfig {
    pub fn is_tagged(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return self.extensions.iter().any(|e| e == "*");
        };
        self.extensions.iter().any(|e| e == "*" || e.eq_ignore_ascii_case(ext))
    }
}

impl Config {
    /// Load defaults, then `file` (or `autotagfs.toml` in the working
    /// directory when absent), then `AUTOTAGFS_*` environment variables.
    ///
    /// Nested keys use `__`, e.g. `AUTOTAGFS_CACHE__MAX_ENTRIES=500`.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();

        builder = match file {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name("autotagfs").required(false)),
        };

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("tag.extensions")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        config.try_deserialize().context("Invalid configuration")
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}
