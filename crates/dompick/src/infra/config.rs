//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".dompick/config.toml";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub picker: Picker,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub report: Report,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Picker {
    #[serde(default = "Picker::default_cursor")]
    pub cursor: String,
    #[serde(default = "Picker::default_highlight")]
    pub highlight: bool,
    #[serde(default = "Picker::default_highlight_class")]
    pub highlight_class: String,
    /// Attribute marking the tool's own chrome inside the host page.
    #[serde(default = "Picker::default_chrome_marker")]
    pub chrome_marker: String,
}

impl Picker {
    fn default_cursor() -> String {
        "crosshair".into()
    }

    fn default_highlight() -> bool {
        true
    }

    fn default_highlight_class() -> String {
        "dompick-highlight".into()
    }

    fn default_chrome_marker() -> String {
        "data-dompick".into()
    }
}

impl Default for Picker {
    fn default() -> Self {
        Self {
            cursor: Self::default_cursor(),
            highlight: Self::default_highlight(),
            highlight_class: Self::default_highlight_class(),
            chrome_marker: Self::default_chrome_marker(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    /// Attributes considered stable enough to anchor a rule, in preference order.
    #[serde(default = "Filters::default_attributes")]
    pub attributes: Vec<String>,
    #[serde(default = "Filters::default_noise_prefixes")]
    pub noise_prefixes: Vec<String>,
    #[serde(default = "Filters::default_noise_min_length")]
    pub noise_min_length: usize,
    #[serde(default = "Filters::default_text_limit")]
    pub text_limit: usize,
}

impl Filters {
    fn default_attributes() -> Vec<String> {
        ["data-testid", "aria-label", "name", "title", "data-cy"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn default_noise_prefixes() -> Vec<String> {
        ["css-", "sc-", "jsx-", "svelte-", "emotion-"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn default_noise_min_length() -> usize {
        20
    }

    fn default_text_limit() -> usize {
        50
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            attributes: Self::default_attributes(),
            noise_prefixes: Self::default_noise_prefixes(),
            noise_min_length: Self::default_noise_min_length(),
            text_limit: Self::default_text_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ui {
    #[serde(default = "Ui::default_theme")]
    pub theme: String,
    /// Filter domain used when a snapshot carries no document URL.
    #[serde(default)]
    pub default_domain: Option<String>,
}

impl Ui {
    fn default_theme() -> String {
        "base16-ocean.dark".into()
    }
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            theme: Self::default_theme(),
            default_domain: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    template: Option<String>,
}

impl Report {
    fn default_format() -> &'static str {
        "markdown"
    }

    fn default_template() -> &'static str {
        "inspect_markdown"
    }

    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or(Self::default_format())
    }

    pub fn template(&self) -> String {
        self.template
            .clone()
            .unwrap_or_else(|| Self::default_template().to_owned())
    }
}

impl Default for Report {
    fn default() -> Self {
        Self {
            format: Some(Self::default_format().to_owned()),
            template: Some(Self::default_template().to_owned()),
        }
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    domain: Option<String>,
    theme: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            domain: env::var("DOMPICK_DOMAIN").ok().filter(|v| !v.is_empty()),
            theme: env::var("DOMPICK_THEME").ok().filter(|v| !v.is_empty()),
        }
    }

    #[cfg(test)]
    fn for_tests(domain: &str, theme: &str) -> Self {
        Self {
            domain: Some(domain.to_owned()),
            theme: Some(theme.to_owned()),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    /// Like [`Config::load`], with an explicit file replacing the workspace layer.
    pub fn load_with_override(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        Self::load_with_layers(
            global_config_path(),
            Some(path.to_path_buf()),
            EnvOverrides::from_env(),
        )
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            tracing::debug!(path = %global_path.display(), "loading user config");
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            tracing::debug!(path = %workspace_path.display(), "loading workspace config");
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            picker: merge_picker(self.picker, other.picker),
            filters: merge_filters(self.filters, other.filters),
            ui: merge_ui(self.ui, other.ui),
            report: merge_report(self.report, other.report),
        }
    }
}

fn merge_picker(base: Picker, overlay: Picker) -> Picker {
    Picker {
        cursor: choose(base.cursor, overlay.cursor, Picker::default_cursor),
        highlight: if overlay.highlight != Picker::default_highlight() {
            overlay.highlight
        } else {
            base.highlight
        },
        highlight_class: choose(
            base.highlight_class,
            overlay.highlight_class,
            Picker::default_highlight_class,
        ),
        chrome_marker: choose(
            base.chrome_marker,
            overlay.chrome_marker,
            Picker::default_chrome_marker,
        ),
    }
}

fn merge_filters(base: Filters, overlay: Filters) -> Filters {
    let attributes = if overlay.attributes != Filters::default_attributes() {
        overlay.attributes
    } else {
        base.attributes
    };

    let mut noise_prefixes = base.noise_prefixes;
    for prefix in overlay.noise_prefixes {
        if !noise_prefixes.contains(&prefix) {
            noise_prefixes.push(prefix);
        }
    }

    Filters {
        attributes,
        noise_prefixes,
        noise_min_length: if overlay.noise_min_length != Filters::default_noise_min_length() {
            overlay.noise_min_length
        } else {
            base.noise_min_length
        },
        text_limit: if overlay.text_limit != Filters::default_text_limit() {
            overlay.text_limit
        } else {
            base.text_limit
        },
    }
}

fn merge_ui(base: Ui, overlay: Ui) -> Ui {
    Ui {
        theme: choose(base.theme, overlay.theme, Ui::default_theme),
        default_domain: overlay.default_domain.or(base.default_domain),
    }
}

fn merge_report(mut base: Report, overlay: Report) -> Report {
    if let Some(value) = overlay.format {
        base.format = Some(value);
    }
    if let Some(value) = overlay.template {
        base.template = Some(value);
    }
    base
}

fn choose(base: String, overlay: String, default_fn: fn() -> String) -> String {
    if overlay != default_fn() {
        overlay
    } else {
        base
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("dompick/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(domain) = env.domain {
        config.ui.default_domain = Some(domain);
    }
    if let Some(theme) = env.theme {
        config.ui.theme = theme;
    }
    config
}
