//! pkgreport CLI - annotate and inspect rendered package report pages

#![deny(warnings)]

// Global invariants enforced:
// - Identical input yields byte-for-byte identical output
// - Diagnostics go to stderr, documents and summaries to stdout or --output

use anyhow::Context;
use clap::{Parser, Subcommand};
use pkgreport_core::config;
use pkgreport_core::{
    annotate_file, page_trackers, Document, DomQuery, Page, ResolvedConfig, Selector,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pkgreport")]
#[command(about = "Link issue references and drive show/hide controls in package report pages")]
#[command(version = env!("PKGREPORT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link issue references in a report and fill the issues summary
    Annotate {
        /// Path to the rendered report page
        file: PathBuf,

        /// Path to config file (default: auto-discover, then the page's issue_ref)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the annotated page here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "html")]
        format: OutputFormat,
    },
    /// Dispatch a click on an element and print the resulting page
    Click {
        /// Path to the rendered report page
        file: PathBuf,

        /// Selector of the element to click
        #[arg(long)]
        selector: String,

        /// Which match to click (0-based)
        #[arg(long, default_value = "0")]
        nth: usize,

        /// Path to config file (default: auto-discover, then the page's issue_ref)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without annotating anything
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Html,
    Json,
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Annotate {
            file,
            config: config_path,
            output,
            format,
        } => {
            let resolved = load_config(config_path.as_deref())?;
            let (html, annotation) = annotate_file(&file, resolved)?;

            match format {
                OutputFormat::Html => {
                    if let Some(output_path) = output {
                        write_html_report(&output_path, &html)?;
                        eprintln!("Annotated report written to: {}", output_path.display());
                    } else {
                        print!("{}", html);
                    }
                }
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&annotation)
                        .context("failed to serialize annotation summary")?;
                    println!("{}", json);
                }
            }
        }
        Commands::Click {
            file,
            selector,
            nth,
            config: config_path,
        } => {
            let selector = Selector::parse(&selector)?;
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read report: {}", file.display()))?;
            let document = Document::parse(&html);
            let resolved = load_config(config_path.as_deref())?;
            let trackers = page_trackers(&document, &resolved)?;

            let mut page = Page::new(document, trackers, resolved.settings)?;
            page.ready();

            let Some(node) = page.find(&selector, nth) else {
                let found = page.document().query_all(&selector).len();
                anyhow::bail!(
                    "no element #{} matches '{}' ({} found)",
                    nth,
                    selector,
                    found
                );
            };
            tracing::debug!(selector = %selector, nth, node = node.0, "dispatching click");
            let outcome = page.click(node);
            eprintln!(
                "handled: {}, default prevented: {}, toggled: {}, checked: {}",
                outcome.handled,
                outcome.default_prevented,
                outcome.toggled.len(),
                outcome.checked.len()
            );
            print!("{}", page.document().to_html());
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                match config::load_and_resolve(&project_root, path.as_deref()) {
                    Ok(Some(resolved)) => {
                        if let Some(ref p) = resolved.config_path {
                            println!("Config valid: {}", p.display());
                        }
                        for skipped in &resolved.trackers.skipped {
                            println!(
                                "  Warning: tracker '{}' will be skipped: {}",
                                skipped.name, skipped.reason
                            );
                        }
                    }
                    Ok(None) => {
                        println!("No config file found. Using defaults.");
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let resolved = load_config(path.as_deref())?;

                println!("Configuration:");
                if let Some(ref p) = resolved.config_path {
                    println!("  Source: {}", p.display());
                } else {
                    println!("  Source: defaults (no config file found)");
                }
                println!();
                println!("Annotator:");
                println!("  highlight: {}", resolved.settings.highlight);
                println!("  changelog selector: {}", resolved.settings.changelog);
                println!("  issues selector: {}", resolved.settings.issues);
                println!();
                println!("Trackers:");
                if resolved.trackers.is_empty() {
                    println!("  (none; the page's issue_ref list is used)");
                }
                for t in resolved.trackers.iter() {
                    println!(
                        "  {}: {} -> {} (display group {}, id group {})",
                        t.name,
                        t.regex.as_str(),
                        t.url,
                        t.display_group,
                        t.id_group
                    );
                }
                for skipped in &resolved.trackers.skipped {
                    println!("  {}: skipped ({})", skipped.name, skipped.reason);
                }
            }
        },
    }

    Ok(())
}

/// Log to stderr, filtered by RUST_LOG (default: warn)
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load config from `--config` or discover it in the working directory
fn load_config(config_path: Option<&Path>) -> anyhow::Result<ResolvedConfig> {
    let project_root = std::env::current_dir()?;
    let resolved = config::load_and_resolve(&project_root, config_path)
        .context("failed to load configuration")?;

    match resolved {
        Some(resolved) => {
            if let Some(path) = &resolved.config_path {
                eprintln!("Using config: {}", path.display());
            }
            Ok(resolved)
        }
        None => ResolvedConfig::defaults(),
    }
}

/// Write the annotated page with atomic write pattern
fn write_html_report(path: &Path, html: &str) -> anyhow::Result<()> {
    use std::fs;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    // Atomic write (temp + rename pattern)
    let temp_path = path.with_extension("html.tmp");
    fs::write(&temp_path, html)
        .with_context(|| format!("Failed to write temporary file: {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temporary file to: {}", path.display()))?;

    Ok(())
}
