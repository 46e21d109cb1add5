use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

/// One catalog project: its display name and the drive folder holding the
/// `产品图`/`场景图` image subfolders. Extra keys in the file are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub display_name: String,
    pub drive_folder: String,
}

pub type Projects = BTreeMap<String, ProjectConfig>;

/// Load the project registry. A missing file is not fatal; pipelines still
/// run, they just cannot match images.
pub fn load_projects(path: &Path) -> Result<Projects> {
    if !path.exists() {
        warn!("config file {} not found; no projects available", path.display());
        return Ok(Projects::new());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config in {}", path.display()))
}
