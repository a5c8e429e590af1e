//! Command line interface.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::Value;
use url::Url;

use crate::app::filters::FilterSynthesizer;
use crate::app::prefs::{PreferenceStore, WriteMode};
use crate::app::report::{ElementReport, ReportFormat, ReportOptions, Reporter};
use crate::app::selector;
use crate::domain::document::Document;
use crate::domain::model::NodeId;
use crate::infra::config::Config;
use crate::infra::logging::{self, LogTarget};
use crate::infra::snapshot;
use crate::infra::storage::{JsonFileBackend, MemoryBackend, PreferenceBackend};
use crate::ui::app::UiApp;
use crate::ui::panels;

#[derive(Debug, Parser)]
#[command(name = "dompick", version)]
#[command(about = "Pick elements from DOM snapshots and derive selectors, filters and markup")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Config file to use instead of the workspace `.dompick/config.toml`
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory holding persisted preferences
    #[arg(long, global = true, value_name = "DIR")]
    prefs_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Target {
    /// Snapshot JSON file, or `-` to read stdin
    snapshot: PathBuf,
    /// Node index or canonical selector path (for example `#main > ul > li:nth-of-type(2)`)
    #[arg(short, long)]
    node: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the canonical selector path of a node
    Path {
        #[command(flatten)]
        target: Target,
    },
    /// List cosmetic filter candidates for a node
    Filters {
        #[command(flatten)]
        target: Target,
        /// Filter domain; defaults to the snapshot URL host
        #[arg(long)]
        domain: Option<String>,
        /// Emit candidates as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the outer HTML of a node
    Markup {
        #[command(flatten)]
        target: Target,
    },
    /// Render a full element report
    Inspect {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        domain: Option<String>,
        #[arg(short, long, value_enum)]
        format: Option<ReportFormat>,
        /// Built-in template name or template file path
        #[arg(long)]
        template: Option<String>,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Pick elements interactively
    Pick {
        /// Snapshot JSON file
        snapshot: PathBuf,
        #[arg(long)]
        domain: Option<String>,
        /// Log file; defaults to the user cache directory
        #[arg(long, value_name = "FILE")]
        log_file: Option<PathBuf>,
        /// Directory for reports written from the UI
        #[arg(long, value_name = "DIR", default_value = ".")]
        report_dir: PathBuf,
    },
    /// Inspect or edit persisted preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsCommand,
        /// Work on an in-memory copy; nothing is read from or written to disk
        #[arg(long)]
        no_persist: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum PrefsCommand {
    /// Print the merged preference tree
    Show,
    /// Print the value at a dotted key such as `components.filters.enabled`
    Get { key: String },
    /// Store a value at a dotted key; the value is parsed as JSON, falling back to a string
    Set { key: String, value: String },
    /// Restore the defaults
    Reset,
}

/// Parse the process arguments and run the selected command.
pub fn run() -> Result<()> {
    Cli::parse().execute()
}

impl Cli {
    pub fn execute(self) -> Result<()> {
        let target = match &self.command {
            Command::Pick { log_file, .. } => log_file
                .clone()
                .map(LogTarget::File)
                .unwrap_or_else(LogTarget::default_file),
            _ => LogTarget::Stderr,
        };
        logging::init(self.verbose, target)?;

        let config = match &self.config {
            Some(path) => Config::load_with_override(path)?,
            None => Config::load()?,
        };
        tracing::debug!(command = ?self.command, "dispatching");

        let mut stdout = io::stdout().lock();
        match self.command {
            Command::Path { target } => {
                let (document, node) = load_target(&target)?;
                let element = document
                    .nearest_element(node)
                    .with_context(|| format!("node {node} is not inside an element"))?;
                writeln!(stdout, "{}", selector::css_path(&document, element))?;
            }
            Command::Filters {
                target,
                domain,
                json,
            } => {
                let (document, node) = load_target(&target)?;
                let domain = resolve_domain(domain, &document, &config);
                let candidates =
                    FilterSynthesizer::from_config(&config).synthesize(&document, node, &domain);
                if json {
                    writeln!(stdout, "{}", serde_json::to_string_pretty(&candidates)?)?;
                } else {
                    for candidate in &candidates {
                        writeln!(stdout, "{}\t{}", candidate.rule, candidate.description)?;
                    }
                }
            }
            Command::Markup { target } => {
                let (document, node) = load_target(&target)?;
                let element = document
                    .nearest_element(node)
                    .with_context(|| format!("node {node} is not inside an element"))?;
                writeln!(stdout, "{}", document.outer_html(element))?;
            }
            Command::Inspect {
                target,
                domain,
                format,
                template,
                output,
            } => {
                let (document, node) = load_target(&target)?;
                let domain = resolve_domain(domain, &document, &config);
                let synthesizer = FilterSynthesizer::from_config(&config);
                let report = ElementReport::build(&document, node, &domain, &synthesizer)?
                    .with_context(|| format!("node {node} is not inside an element"))?;

                let mut options = ReportOptions::from_config(&config);
                if let Some(format) = format {
                    options.format = format;
                }
                if let Some(template) = template {
                    options.template = template;
                }
                options.output_path = output;

                let result = Reporter::new()?.write(&report, &options)?;
                match result.output_path {
                    Some(path) => writeln!(stdout, "Report written to {}", path.display())?,
                    None => write!(stdout, "{}", result.rendered)?,
                }
            }
            Command::Pick {
                snapshot,
                domain,
                report_dir,
                ..
            } => {
                let document = snapshot::load(&snapshot)?;
                let domain = resolve_domain(domain, &document, &config);
                let prefs = PreferenceStore::new(
                    preference_backend(self.prefs_dir.as_deref(), false)?,
                    panels::panel_ids(),
                );
                drop(stdout);
                UiApp::new(document, domain, config, prefs)?
                    .with_report_dir(report_dir)
                    .run()?;
            }
            Command::Prefs { action, no_persist } => {
                let backend = preference_backend(self.prefs_dir.as_deref(), no_persist)?;
                let mut prefs = PreferenceStore::new(backend, panels::panel_ids())
                    .with_write_mode(WriteMode::Blocking);
                prefs.load();
                match action {
                    PrefsCommand::Show => {
                        writeln!(stdout, "{}", serde_json::to_string_pretty(prefs.prefs())?)?;
                    }
                    PrefsCommand::Get { key } => {
                        let value = prefs
                            .get(&key)
                            .with_context(|| format!("no preference at '{key}'"))?;
                        writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?;
                    }
                    PrefsCommand::Set { key, value } => {
                        prefs.set(&key, parse_pref_value(&value));
                    }
                    PrefsCommand::Reset => prefs.reset(),
                }
            }
            Command::Completions { shell } => {
                clap_complete::generate(shell, &mut Cli::command(), "dompick", &mut stdout);
            }
        }
        Ok(())
    }
}

fn load_target(target: &Target) -> Result<(Document, NodeId)> {
    let document = snapshot::load(&target.snapshot)?;
    let node = resolve_node(&document, &target.node)?;
    Ok((document, node))
}

/// A decimal node index, or a selector path in the form produced by [`selector::css_path`].
fn resolve_node(document: &Document, spec: &str) -> Result<NodeId> {
    if let Ok(index) = spec.trim().parse::<usize>() {
        let node = NodeId::from_index(index);
        if !document.contains(node) {
            bail!(
                "node {index} is out of range (snapshot has {} nodes)",
                document.len()
            );
        }
        return Ok(node);
    }
    selector::resolve_path(document, spec).with_context(|| format!("no element at path '{spec}'"))
}

/// `--domain`, then the snapshot URL host, then `ui.default_domain`.
fn resolve_domain(explicit: Option<String>, document: &Document, config: &Config) -> String {
    explicit
        .filter(|domain| !domain.trim().is_empty())
        .or_else(|| document.url().and_then(url_host))
        .or_else(|| config.ui.default_domain.clone())
        .unwrap_or_default()
}

fn url_host(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()?
        .host_str()
        .map(str::to_owned)
}

fn preference_backend(dir: Option<&Path>, in_memory: bool) -> Result<Arc<dyn PreferenceBackend>> {
    if in_memory {
        return Ok(Arc::new(MemoryBackend::new()));
    }
    let backend = match dir {
        Some(dir) => JsonFileBackend::new(dir),
        None => JsonFileBackend::user_default()
            .context("no user config directory; pass --prefs-dir or --no-persist")?,
    };
    Ok(Arc::new(backend))
}

fn parse_pref_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document() -> Document {
        snapshot::parse(
            r##"{
                "nodeType": 9, "nodeName": "#document",
                "documentURL": "https://www.example.com/page",
                "children": [{
                    "nodeType": 1, "nodeName": "HTML",
                    "children": [{
                        "nodeType": 1, "nodeName": "BODY",
                        "children": [
                            { "nodeType": 1, "nodeName": "P", "children": [] },
                            { "nodeType": 1, "nodeName": "P", "children": [] }
                        ]
                    }]
                }]
            }"##,
        )
        .unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_inspect_flags() {
        let cli = Cli::try_parse_from([
            "dompick",
            "-vv",
            "inspect",
            "page.json",
            "--node",
            "#main",
            "--format",
            "yaml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Inspect { target, format, .. } => {
                assert_eq!(target.node, "#main");
                assert_eq!(format, Some(ReportFormat::Yaml));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn resolves_nodes_by_index_and_path() {
        let document = document();
        let second = resolve_node(&document, "html > body > p:nth-of-type(2)").unwrap();
        assert_eq!(document.tag_name(second), Some("p"));
        assert_eq!(resolve_node(&document, &second.index().to_string()).unwrap(), second);
        assert!(resolve_node(&document, "9999").is_err());
        assert!(resolve_node(&document, "html > body > p").is_err());
    }

    #[test]
    fn domain_precedence() {
        let document = document();
        let mut config = Config::default();
        config.ui.default_domain = Some("fallback.test".into());

        assert_eq!(
            resolve_domain(Some("explicit.test".into()), &document, &config),
            "explicit.test"
        );
        assert_eq!(resolve_domain(None, &document, &config), "www.example.com");
        assert_eq!(
            resolve_domain(None, &Document::new(), &config),
            "fallback.test"
        );
        assert_eq!(resolve_domain(None, &Document::new(), &Config::default()), "");
    }

    #[test]
    fn pref_values_parse_as_json_first() {
        assert_eq!(parse_pref_value("42"), json!(42));
        assert_eq!(parse_pref_value("true"), json!(true));
        assert_eq!(parse_pref_value("light"), json!("light"));
        assert_eq!(parse_pref_value("{\"a\":1}"), json!({"a": 1}));
    }
}
