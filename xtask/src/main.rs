use anyhow::{Context, Result, bail};
use cargo_metadata::MetadataCommand;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(author, version, about = "Project automation commands", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cargo nextest with default configuration
    Nextest {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        release: bool,
    },
    /// Check snapshot fixtures and bundled config files
    Fixtures,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Nextest { profile, release } => run_nextest(profile, release)?,
        Commands::Fixtures => check_fixtures()?,
    }
    Ok(())
}

fn run_nextest(profile: Option<String>, release: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("nextest").arg("run").arg("--workspace");
    if let Some(profile) = profile {
        cmd.arg("--profile").arg(profile);
    }
    if release {
        cmd.arg("--release");
    }
    let status = cmd.status()?;
    if !status.success() {
        bail!("cargo nextest run failed");
    }
    Ok(())
}

fn check_fixtures() -> Result<()> {
    let metadata = MetadataCommand::new()
        .no_deps()
        .exec()
        .context("failed to read cargo metadata")?;
    let root: PathBuf = metadata.workspace_root.into();

    let mut checked = 0usize;
    let mut failures = Vec::new();
    for entry in WalkDir::new(root.join("crates"))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        let dir_name = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str());
        let outcome = match (dir_name, path.extension().and_then(|ext| ext.to_str())) {
            (Some("fixtures"), Some("json")) => check_snapshot(path),
            (Some("assets"), Some("toml")) => check_config(path),
            _ => continue,
        };
        checked += 1;
        if let Err(err) = outcome {
            failures.push(format!("{}: {err:#}", path.display()));
        }
    }

    if !failures.is_empty() {
        for failure in &failures {
            eprintln!("{failure}");
        }
        bail!("{} of {checked} files failed validation", failures.len());
    }
    println!("{checked} files ok");
    Ok(())
}

fn check_snapshot(path: &Path) -> Result<()> {
    let data = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&data).context("invalid JSON")?;
    let root = value.get("root").unwrap_or(&value);
    check_node(root, "root")
}

fn check_node(node: &Value, at: &str) -> Result<()> {
    let Some(node_type) = node.get("nodeType").and_then(Value::as_u64) else {
        bail!("{at}: missing numeric nodeType");
    };
    if node_type == 1 && node.get("nodeName").and_then(Value::as_str).is_none() {
        bail!("{at}: element without nodeName");
    }
    if let Some(attributes) = node.get("attributes").and_then(Value::as_array)
        && attributes.len() % 2 != 0
    {
        bail!("{at}: attributes must come in name/value pairs");
    }
    if let Some(children) = node.get("children").and_then(Value::as_array) {
        for (index, child) in children.iter().enumerate() {
            check_node(child, &format!("{at}.children[{index}]"))?;
        }
    }
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let data = fs::read_to_string(path)?;
    data.parse::<toml::Table>().context("invalid TOML")?;
    Ok(())
}
