//! Rendering of picked-element reports.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::app::filters::FilterSynthesizer;
use crate::app::selector;
use crate::domain::document::Document;
use crate::domain::model::{FilterCandidate, NodeId};
use crate::infra::config::Config;

const MARKDOWN_TEMPLATE_NAME: &str = "inspect_markdown";
const PLAIN_TEMPLATE_NAME: &str = "inspect_plain";

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum ReportFormat {
    /// Markdown document with fenced selector and markup blocks.
    Markdown,
    /// Plain text report.
    Plain,
    Json,
    Yaml,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "markdown",
            ReportFormat::Plain => "plain",
            ReportFormat::Json => "json",
            ReportFormat::Yaml => "yaml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Plain => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Yaml => "yaml",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ReportFormatParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "plain" | "text" | "txt" => Ok(ReportFormat::Plain),
            "json" => Ok(ReportFormat::Json),
            "yaml" | "yml" => Ok(ReportFormat::Yaml),
            other => Err(ReportFormatParseError::UnknownFormat(other.to_string())),
        }
    }
}

/// Error returned when parsing a [`ReportFormat`] fails.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ReportFormatParseError {
    #[error("unknown report format '{0}'")]
    UnknownFormat(String),
}

/// Everything known about one picked element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementReport {
    pub domain: String,
    pub node: NodeId,
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub path: String,
    pub filters: Vec<FilterCandidate>,
    pub markup: String,
    pub generated_at: String,
}

impl ElementReport {
    /// Collect the report for `node`, retargeting non-element nodes to their parent element.
    ///
    /// Returns `None` when no element is involved.
    pub fn build(
        document: &Document,
        node: NodeId,
        domain: &str,
        synthesizer: &FilterSynthesizer,
    ) -> Result<Option<Self>> {
        let Some(element) = document.nearest_element(node) else {
            return Ok(None);
        };
        let highlight_class = synthesizer.options().highlight_class.as_str();

        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("failed to format report timestamp")?;

        Ok(Some(Self {
            domain: domain.to_owned(),
            node: element,
            tag: document.tag_name(element).unwrap_or_default().to_owned(),
            id: document.element_id(element).map(str::to_owned),
            classes: document
                .class_list(element)
                .into_iter()
                .filter(|class| *class != highlight_class)
                .map(str::to_owned)
                .collect(),
            path: selector::css_path(document, element),
            filters: synthesizer.synthesize(document, element, domain),
            markup: document.outer_html(element),
            generated_at,
        }))
    }
}

/// Runtime options controlling report output.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub format: ReportFormat,
    /// Built-in template name or path to a template file; used by the text formats.
    pub template: String,
    pub output_path: Option<PathBuf>,
}

impl ReportOptions {
    pub fn from_config(config: &Config) -> Self {
        let format =
            <ReportFormat as FromStr>::from_str(config.report.format()).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to markdown reports");
                ReportFormat::Markdown
            });
        Self {
            format,
            template: config.report.template(),
            output_path: None,
        }
    }

    fn template_name(&self) -> &str {
        match self.format {
            ReportFormat::Plain if self.template == MARKDOWN_TEMPLATE_NAME => PLAIN_TEMPLATE_NAME,
            _ => &self.template,
        }
    }
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            format: ReportFormat::Markdown,
            template: MARKDOWN_TEMPLATE_NAME.to_owned(),
            output_path: None,
        }
    }
}

/// Result of writing a report.
#[derive(Debug, Clone)]
pub struct ReportOutput {
    pub rendered: String,
    pub output_path: Option<PathBuf>,
}

/// Renders [`ElementReport`]s and writes them out.
pub struct Reporter {
    env: Environment<'static>,
}

impl Reporter {
    /// Create a reporter with the built-in templates loaded.
    pub fn new() -> Result<Self> {
        Ok(Self {
            env: default_environment()?,
        })
    }

    pub fn render(&self, report: &ElementReport, options: &ReportOptions) -> Result<String> {
        match options.format {
            ReportFormat::Json => {
                serde_json::to_string_pretty(report).context("failed to serialize report as JSON")
            }
            ReportFormat::Yaml => {
                serde_yaml::to_string(report).context("failed to serialize report as YAML")
            }
            ReportFormat::Markdown | ReportFormat::Plain => {
                self.render_with_template(report, options.template_name())
            }
        }
    }

    /// Render and, when an output path is configured, write the result to disk.
    pub fn write(&self, report: &ElementReport, options: &ReportOptions) -> Result<ReportOutput> {
        let rendered = self.render(report, options)?;

        if let Some(path) = &options.output_path {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create report directory: {}", parent.display())
                })?;
            }
            fs::write(path, &rendered)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            tracing::info!(
                path = %path.display(),
                format = options.format.as_str(),
                "report written"
            );
        }

        Ok(ReportOutput {
            rendered,
            output_path: options.output_path.clone(),
        })
    }

    fn render_with_template(&self, report: &ElementReport, template_name: &str) -> Result<String> {
        if let Ok(template) = self.env.get_template(template_name) {
            return template
                .render(report)
                .map_err(|err| anyhow!("failed to render template '{template_name}': {err}"));
        }

        let template_path = Path::new(template_name);
        if template_path.exists() {
            let source = fs::read_to_string(template_path).with_context(|| {
                format!(
                    "failed to load template from path {}",
                    template_path.display()
                )
            })?;
            let mut env = Environment::new();
            env.set_trim_blocks(true);
            env.set_lstrip_blocks(true);
            return env
                .render_str(&source, report)
                .map_err(|err| anyhow!("failed to render template '{template_name}': {err}"));
        }

        Err(anyhow!(
            "template '{}' not found (built-in or filesystem)",
            template_name
        ))
    }
}

fn default_environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template(MARKDOWN_TEMPLATE_NAME, DEFAULT_MARKDOWN_TEMPLATE)
        .map_err(|err| anyhow!("failed to register default markdown template: {err}"))?;
    env.add_template(PLAIN_TEMPLATE_NAME, DEFAULT_PLAIN_TEMPLATE)
        .map_err(|err| anyhow!("failed to register default plain template: {err}"))?;
    Ok(env)
}

const DEFAULT_MARKDOWN_TEMPLATE: &str = r#"# <{{ tag }}>{{ " on " ~ domain if domain else "" }}

Generated at: {{ generated_at }}

{% if id %}
- Id: `{{ id }}`
{% endif %}
{% if classes %}
- Classes: {% for class in classes %}`{{ class }}`{% if not loop.last %}, {% endif %}{% endfor %}

{% endif %}
- Path: `{{ path }}`

## Filters

{% for filter in filters %}
{{ loop.index }}. {{ filter.description }}: `{{ filter.rule }}`
{% endfor %}

## Markup

```html
{{ markup }}
```
"#;

const DEFAULT_PLAIN_TEMPLATE: &str = r#"<{{ tag }}>{{ " on " ~ domain if domain else "" }} (generated at {{ generated_at }})
{% if id %}
id: {{ id }}
{% endif %}
{% if classes %}
classes: {{ classes | join(" ") }}
{% endif %}
path: {{ path }}

filters:
{% for filter in filters %}
  {{ filter.rule }}  [{{ filter.description }}]
{% endfor %}

markup:
{{ markup }}
"#;
