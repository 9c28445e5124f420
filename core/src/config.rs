use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub scihub_domain: String,
    /// Papers directory, relative to the library root.
    pub library_path: String,
    pub highlight_colors: Vec<String>,
    pub default_highlight_color: String,
    pub remember_last_color: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scihub_domain: "sci-hub.se".to_string(),
            library_path: "papers".to_string(),
            highlight_colors: vec![
                "yellow".to_string(),
                "green".to_string(),
                "red".to_string(),
                "blue".to_string(),
            ],
            default_highlight_color: "yellow".to_string(),
            remember_last_color: true,
        }
    }
}

pub fn config_path(library_root: &Path) -> PathBuf {
    library_root.join("config.json")
}

/// Load config.json from the library root, writing defaults on first run.
pub fn load_config(library_root: &Path) -> Result<Config> {
    let path = config_path(library_root);
    if !path.exists() {
        let config = Config::default();
        save_config(library_root, &config)?;
        return Ok(config);
    }
    let data = fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

pub fn save_config(library_root: &Path, config: &Config) -> Result<()> {
    fs::create_dir_all(library_root)?;
    let json = serde_json::to_string_pretty(config)?;
    fs::write(config_path(library_root), json)?;
    Ok(())
}

/// Absolute papers directory for the configured library.
pub fn papers_dir(library_root: &Path) -> Result<PathBuf> {
    let config = load_config(library_root)?;
    let dir = library_root.join(&config.library_path);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}
