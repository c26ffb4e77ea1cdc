//! Job configuration, loaded from TOML.
//!
//! ```toml
//! path_attribute = "source-path"
//! uri_scheme = "file"
//!
//! [rules]
//! max_length = 104857600
//!
//! [[rules.scope]]
//! path = "/docs"
//!
//! [[rules.scope.rule]]
//! action = "include"
//! filespec = "*.pdf"
//! kind = "file"
//!
//! [security]
//! entry = { mode = "native" }
//! container = { mode = "forced", tokens = ["S-1-1-0"] }
//!
//! [[uri_remap]]
//! pattern = "^/docs/(.*)$"
//! replacement = "https://intranet/docs/$1"
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::fault::RetryPolicy;
use crate::rules::{RemapSpec, RemapTable, RuleTree};
use crate::version::{AclPolicy, UriMapping, VersionEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclMode {
    #[default]
    Off,
    Native,
    Forced,
}

/// Security setting for one ACL group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AclSetting {
    #[serde(default)]
    pub mode: AclMode,
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl AclSetting {
    pub fn policy(&self) -> Result<AclPolicy> {
        match self.mode {
            AclMode::Off => Ok(AclPolicy::Disabled),
            AclMode::Native => Ok(AclPolicy::Native),
            AclMode::Forced if self.tokens.is_empty() => {
                bail!("Forced security requires at least one token")
            }
            AclMode::Forced => Ok(AclPolicy::Forced(self.tokens.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    pub entry: AclSetting,
    pub container: AclSetting,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlSettings {
    /// Concurrent entry tasks; defaults to the number of CPUs.
    pub workers: Option<usize>,
    /// Where fingerprint scratch copies go; defaults to the system temp dir.
    pub scratch_dir: Option<PathBuf>,
}

impl CrawlSettings {
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_scheme() -> String {
    "file".to_string()
}

/// Everything needed to run crawl passes for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    #[serde(default)]
    pub rules: RuleTree,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub path_attribute: Option<String>,
    #[serde(default = "default_scheme")]
    pub uri_scheme: String,
    #[serde(default)]
    pub path_remap: Vec<RemapSpec>,
    #[serde(default)]
    pub file_name_remap: Vec<RemapSpec>,
    #[serde(default)]
    pub uri_remap: Vec<RemapSpec>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub crawl: CrawlSettings,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            rules: RuleTree::default(),
            security: SecurityConfig::default(),
            path_attribute: None,
            uri_scheme: default_scheme(),
            path_remap: Vec::new(),
            file_name_remap: Vec::new(),
            uri_remap: Vec::new(),
            retry: RetryPolicy::default(),
            crawl: CrawlSettings::default(),
        }
    }
}

impl JobConfig {
    /// Read and validate a job file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid job config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: JobConfig = toml::from_str(text).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.rules.validate()?;
        self.security.entry.policy().context("[security.entry]")?;
        self.security.container.policy().context("[security.container]")?;
        self.mapping()?;
        if self.uri_scheme.is_empty() {
            bail!("uri_scheme must not be empty");
        }
        if self.retry.max_attempts == 0 || self.retry.max_consecutive == 0 {
            bail!("[retry] budgets must be at least 1");
        }
        Ok(())
    }

    /// Path attribute and URI settings with compiled remap tables.
    pub fn mapping(&self) -> Result<UriMapping> {
        Ok(UriMapping {
            path_attribute: self.path_attribute.clone(),
            path_remap: RemapTable::from_specs(&self.path_remap).context("[[path_remap]]")?,
            file_name_remap: RemapTable::from_specs(&self.file_name_remap)
                .context("[[file_name_remap]]")?,
            uri_remap: RemapTable::from_specs(&self.uri_remap).context("[[uri_remap]]")?,
            scheme: self.uri_scheme.clone(),
        })
    }

    pub fn encoder(&self) -> Result<VersionEncoder> {
        Ok(VersionEncoder::new(
            self.security.container.policy()?,
            self.security.entry.policy()?,
            self.mapping()?,
        ))
    }
}

/// `<config dir>/sharecrawl/job.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sharecrawl").join("job.toml"))
}
