//! Workspace configuration (`cairn.toml`)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cairn_merge::MergeOptions;
use cairn_parser::SourceUnit;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "cairn.toml";

/// Missing file → all defaults.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CairnConfig {
    /// Globs, relative to the root, selecting source units.
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Parser pool size. Defaults to the available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub merge: MergeOptions,
}

impl Default for CairnConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            workers: None,
            merge: MergeOptions::default(),
        }
    }
}

fn default_include() -> Vec<String> {
    vec!["**/*.nacl".to_owned()]
}

impl CairnConfig {
    /// Load `<root>/cairn.toml`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("could not read {}", path.display())),
        };
        Self::parse(&contents).with_context(|| format!("invalid {}", path.display()))
    }

    pub fn parse(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn source_matcher(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.include {
            builder.add(Glob::new(pattern).with_context(|| format!("invalid include glob `{}`", pattern))?);
        }
        Ok(builder.build()?)
    }

    /// Every source unit under `root` matching `include`. Hidden and ignored
    /// files are skipped. Unit ids are root-relative paths with `/`
    /// separators.
    pub fn discover(&self, root: &Path) -> Result<Vec<SourceUnit>> {
        let matcher = self.source_matcher()?;
        let walker = WalkBuilder::new(root).standard_filters(true).follow_links(false).build();

        let mut units = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Some(origin) = unit_id(root, entry.path()) else {
                continue;
            };
            if !matcher.is_match(&origin) {
                continue;
            }
            let content = std::fs::read_to_string(entry.path())
                .with_context(|| format!("could not read {}", entry.path().display()))?;
            units.push(SourceUnit::new(origin, content));
        }
        units.sort_by(|a, b| a.origin.cmp(&b.origin));
        tracing::debug!(units = units.len(), "Discovered source units");
        Ok(units)
    }
}

fn unit_id(root: &Path, path: &Path) -> Option<String> {
    let relative: PathBuf = path.strip_prefix(root).ok()?.to_path_buf();
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!segments.is_empty()).then(|| segments.join("/"))
}
