use std::{
    collections::HashMap,
    num::NonZeroU32,
    path::{Path, PathBuf},
};

use anyhow::bail;
use config::{Config, ConfigError, Environment, File, FileFormat};
use home::home_dir;
use serde::Deserialize;

use crate::report::ReportStyle;

const DEFAULT_MEMBER_PAGE_SIZE: NonZeroU32 = match NonZeroU32::new(100) {
    Some(size) => size,
    None => panic!(),
};
const CONFIG_FILE_NAME: &str = ".labcache.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabcacheConfig {
    /// Page size requested when sweeping repository members.
    pub member_page_size: NonZeroU32,
    pub report: ReportStyle,
}

impl Default for LabcacheConfig {
    fn default() -> Self {
        LabcacheConfig {
            member_page_size: DEFAULT_MEMBER_PAGE_SIZE,
            report: ReportStyle::default(),
        }
    }
}

impl LabcacheConfig {
    /// Loads `$HOME/.labcache.toml`, if present, overridden by `LABCACHE_*` variables.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(default_config_file().as_deref())
    }

    pub fn load_from(file: Option<&Path>) -> anyhow::Result<Self> {
        Self::from_raw(RawConfig::load(file, None)?)
    }

    fn from_raw(raw_config: RawConfig) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let member_page_size = match raw_config.paging.members {
            Some(size) => match NonZeroU32::new(size) {
                Some(size) => size,
                None => bail!("Member page size must be greater than zero"),
            },
            None => defaults.member_page_size,
        };

        Ok(Self {
            member_page_size,
            report: ReportStyle {
                separator: raw_config
                    .report
                    .separator
                    .unwrap_or(defaults.report.separator),
                prefix: raw_config.report.prefix.unwrap_or(defaults.report.prefix),
                suffix: raw_config.report.suffix.unwrap_or(defaults.report.suffix),
            },
        })
    }
}

fn default_config_file() -> Option<PathBuf> {
    home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    paging: PagingConfig,
    #[serde(default)]
    report: ReportConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct PagingConfig {
    members: Option<u32>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ReportConfig {
    separator: Option<String>,
    prefix: Option<String>,
    suffix: Option<String>,
}

impl RawConfig {
    fn load(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix("LABCACHE")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
