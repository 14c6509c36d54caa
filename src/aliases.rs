//! Alias table configuration.
//!
//! Aliases are grouped into categories in `aliasrack.toml`; each alias maps
//! a name to a command template and a description. Templates may vary per
//! platform. A small built-in table is used when no file exists.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::debug;
use serde::Deserialize;

use crate::pipeline::AliasLookup;

const CONFIG_FILE: &str = "aliasrack.toml";
const CONFIG_ENV: &str = "ALIASRACK_CONFIG";

const DEFAULT_TABLE: &str = r#"
[git]
gco = { template = "git checkout ${1:`git branch --show-current`}", description = "check out a branch, defaulting to the current one" }
gps = { template = "git push origin ${1:`git branch --show-current`}", description = "push a branch, defaulting to the current one" }
gcm = { template = "git commit -m $*", description = "commit with a message" }
glg = { template = "git log --oneline -n ${1:20}", description = "recent commits, 20 by default" }
grb = { template = "git rebase ${1:main}", description = "rebase onto a branch, main by default" }
gdf = { template = "git diff ${1*:`git branch --show-current`}", description = "diff against refs, or the current branch" }

[files]
ff = { template = "find . -name $1", description = "find files by name" }
lt = { template = { linux = "ls -la --color=auto $*", macos = "ls -laG $*", windows = "dir $*" }, description = "long listing" }
"#;

/// Template body as written in the file: one string for every platform, or
/// per-platform variants.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TemplateSource {
    Uniform(String),
    PerPlatform {
        linux: Option<String>,
        macos: Option<String>,
        windows: Option<String>,
    },
}

impl TemplateSource {
    fn for_current_platform(&self) -> Option<&str> {
        match self {
            TemplateSource::Uniform(template) => Some(template),
            TemplateSource::PerPlatform {
                linux,
                macos,
                windows,
            } => {
                if cfg!(target_os = "macos") {
                    macos.as_deref()
                } else if cfg!(windows) {
                    windows.as_deref()
                } else {
                    linux.as_deref()
                }
            }
        }
    }
}

/// One alias entry as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AliasConfig {
    pub template: TemplateSource,
    pub description: Option<String>,
}

/// A resolved alias ready for expansion.
#[derive(Debug, Clone)]
pub struct Alias {
    pub name: String,
    pub category: String,
    pub template: String,
    pub description: String,
}

/// The full alias catalog, indexed by name.
#[derive(Debug, Default)]
pub struct AliasTable {
    aliases: BTreeMap<String, Alias>,
    categories: BTreeMap<String, Vec<String>>,
}

type RawTable = BTreeMap<String, BTreeMap<String, AliasConfig>>;

impl AliasTable {
    /// Loads the table from the override path, the environment, or the
    /// config directory; falls back to the built-in table.
    pub fn load(path_override: Option<&Path>) -> Result<Self> {
        match locate(path_override) {
            Some(path) => Self::load_file(&path),
            None => Self::from_toml(DEFAULT_TABLE).context("invalid built-in alias table"),
        }
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read alias table {}", path.display()))?;
        Self::from_toml(&raw)
            .with_context(|| format!("invalid alias table {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let parsed: RawTable = toml::from_str(raw).context("failed to parse alias table")?;
        let mut aliases = BTreeMap::new();
        let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (category, entries) in parsed {
            for (name, entry) in entries {
                let Some(template) = entry.template.for_current_platform() else {
                    debug!("alias {} has no template for this platform", name);
                    continue;
                };
                let alias = Alias {
                    name: name.clone(),
                    category: category.clone(),
                    template: template.to_string(),
                    description: entry.description.unwrap_or_default(),
                };
                if aliases.insert(name.clone(), alias).is_some() {
                    bail!("duplicate alias name {:?}", name);
                }
                categories.entry(category.clone()).or_default().push(name);
            }
        }
        Ok(AliasTable {
            aliases,
            categories,
        })
    }

    pub fn resolve(&self, name: &str) -> Option<&Alias> {
        self.aliases.get(name)
    }

    /// Category name plus its aliases, both in sorted order.
    pub fn by_category(&self) -> impl Iterator<Item = (&str, Vec<&Alias>)> {
        self.categories.iter().map(|(category, names)| {
            let aliases = names
                .iter()
                .filter_map(|name| self.aliases.get(name))
                .collect();
            (category.as_str(), aliases)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl AliasLookup for AliasTable {
    fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }
}

fn locate(path_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = path_override {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    config_dir()
        .map(|dir| dir.join("aliasrack").join(CONFIG_FILE))
        .filter(|path| path.exists())
}

fn config_dir() -> Option<PathBuf> {
    if let Ok(path) = env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(path));
    }
    if cfg!(windows) {
        return env::var("APPDATA").ok().map(PathBuf::from);
    }
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}
