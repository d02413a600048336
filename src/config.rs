use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::docx::images::ImageOptions;
use crate::docx::sanitize::SanitizeRules;
use crate::generator::{RenderOptions, SanitizeMode};
use crate::template::PlaceholderRenderer;

pub const CONFIG_FILE_NAME: &str = "docxgen.toml";
pub const CONFIG_ENV_VAR: &str = "DOCXGEN_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub sanitize: SanitizeRules,
    #[serde(default)]
    pub images: ImageOptions,
    #[serde(default)]
    pub workspace: WorkspaceSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RenderSection {
    /// Sanitizer placement: "off", "before" or "after" substitution.
    #[serde(default)]
    pub sanitize: Option<String>,
    #[serde(default)]
    pub escape_ampersands: Option<bool>,
    #[serde(default)]
    pub escape_values: Option<bool>,
    #[serde(default)]
    pub keep_unknown: Option<bool>,
    #[serde(default)]
    pub verify_markup: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct WorkspaceSection {
    /// Parent directory for temporary workspaces.
    /// Can be absolute or relative to the config file directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub keep: Option<bool>,
}

impl AppConfig {
    /// Builds render options; relative paths resolve against `config_dir`.
    pub fn render_options(&self, config_dir: Option<&Path>) -> anyhow::Result<RenderOptions> {
        let defaults = RenderOptions::default();
        let sanitize = match self.render.sanitize.as_deref() {
            Some(s) => SanitizeMode::parse(s)
                .ok_or_else(|| anyhow!("invalid [render].sanitize: {s} (off|before|after)"))?,
            None => defaults.sanitize,
        };
        let workspace_root = self.workspace.root.as_ref().map(|root| match config_dir {
            Some(dir) if root.is_relative() => dir.join(root),
            _ => root.clone(),
        });
        Ok(RenderOptions {
            sanitize,
            rules: self.sanitize.clone(),
            escape_ampersands: self
                .render
                .escape_ampersands
                .unwrap_or(defaults.escape_ampersands),
            verify_markup: self.render.verify_markup.unwrap_or(defaults.verify_markup),
            images: self.images.clone(),
            workspace_root,
            keep_workspace: self.workspace.keep.unwrap_or(defaults.keep_workspace),
        })
    }

    pub fn renderer(&self) -> PlaceholderRenderer {
        let defaults = PlaceholderRenderer::default();
        PlaceholderRenderer {
            escape_values: self.render.escape_values.unwrap_or(defaults.escape_values),
            keep_unknown: self.render.keep_unknown.unwrap_or(defaults.keep_unknown),
        }
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    find_file_upwards(workdir, filename, 8)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

/// Loads the explicit config, else `DOCXGEN_CONFIG`, else the nearest
/// `docxgen.toml`. Returns defaults with no path when none is found.
pub fn resolve_config(
    explicit: Option<&Path>,
    workdir: &Path,
) -> anyhow::Result<(AppConfig, Option<PathBuf>)> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => match std::env::var_os(CONFIG_ENV_VAR) {
            Some(v) if !v.is_empty() => Some(PathBuf::from(v)),
            _ => find_default_config(workdir, CONFIG_FILE_NAME),
        },
    };
    match path {
        Some(p) => {
            let cfg = load_config(&p)?;
            log::debug!("loaded config {}", p.display());
            Ok((cfg, Some(p)))
        }
        None => Ok((AppConfig::default(), None)),
    }
}
