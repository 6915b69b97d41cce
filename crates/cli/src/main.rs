use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use epub_unmangle_core::archive::Archive;
use epub_unmangle_core::audit::{audit, describe_extension, AuditReport};
use epub_unmangle_core::config::{config_path, load_config, AppConfig};
use epub_unmangle_core::manifest::{build_mapping, ManifestMapping};
use epub_unmangle_core::output::fix_file;
use epub_unmangle_core::report::{Level, Reporter, Stage, TracingReporter};
use epub_unmangle_core::toc::TocOutcome;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "epub-unmangle")]
#[command(about = "Repair EPUB files whose internal file names were obfuscated")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Repair an obfuscated EPUB
    Fix {
        /// Input file (prompted for when omitted)
        input: Option<String>,

        /// Output file (default: prefixed copy next to the input)
        #[arg(short, long)]
        output: Option<String>,

        /// Do not wait for Enter before exiting in interactive mode
        #[arg(long)]
        no_pause: bool,
    },

    /// Report references that are still obfuscated
    Audit {
        /// Input file
        #[arg(required = true)]
        input: String,
    },

    /// Print the obfuscated path → canonical name mapping
    Mapping {
        /// Input file
        #[arg(required = true)]
        input: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init,
    /// Show current configuration
    Show,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Fix {
            input,
            output,
            no_pause,
        } => run_fix(input.as_deref(), output.as_deref(), *no_pause, cli.json),
        Commands::Audit { input } => run_audit(input, cli.json),
        Commands::Mapping { input } => run_mapping(input, cli.json),
        Commands::Config { action } => run_config(action, cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Prints `[*]`/`[+]`/`[-]`/`[!]` status lines above a bar over the stages.
struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    fn new() -> Self {
        let bar = ProgressBar::new(Stage::ALL.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/dim}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━━╸"),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, stage: Stage, level: Level, message: &str) {
        let marker = match level {
            Level::Start | Level::Info => "*",
            Level::Success => "+",
            Level::Error => "-",
            Level::Warning => "!",
        };
        match level {
            Level::Start => self.bar.set_message(stage.label()),
            Level::Success => {
                if let Some(i) = Stage::ALL.iter().position(|s| *s == stage) {
                    self.bar.set_position(i as u64 + 1);
                }
            }
            _ => {}
        }
        let line = format!("[{marker}] {message}");
        // A hidden bar (no terminal) swallows println.
        if self.bar.is_hidden() {
            println!("{line}");
        } else {
            self.bar.println(line);
        }
    }
}

/// Drag-and-drop terminals wrap paths in quotes.
fn clean_input_path(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '"' || c == '\'')
}

fn prompt_input_path() -> Result<String, std::io::Error> {
    print!("Enter EPUB path or drag the EPUB file into this window: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(clean_input_path(&line).to_string())
}

fn pause(message: &str) {
    print!("{message}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}

#[derive(Serialize)]
struct FixSummary<'a> {
    input: &'a Path,
    output: &'a Path,
    obfuscation_detected: bool,
    mapping: &'a ManifestMapping,
    toc: &'a TocOutcome,
    audit: &'a AuditReport,
}

fn run_fix(input: Option<&str>, output: Option<&str>, no_pause: bool, json: bool) -> CliResult {
    let interactive = input.is_none();
    let input = match input {
        Some(i) => PathBuf::from(clean_input_path(i)),
        None => PathBuf::from(prompt_input_path()?),
    };
    if !input.is_file() {
        return Err(format!("Input file not found: {}", input.display()).into());
    }

    let cfg = load_config();
    let layout = cfg.layout();
    let limits = cfg.security_limits();
    let output = output.map(Path::new);

    let fixed = if json {
        fix_file(&input, output, &layout, &limits, &TracingReporter)?
    } else {
        let console = ConsoleReporter::new();
        let result = fix_file(&input, output, &layout, &limits, &console);
        console.finish();
        result?
    };

    if json {
        let p = &fixed.pipeline;
        let summary = FixSummary {
            input: &input,
            output: &fixed.output_path,
            obfuscation_detected: p.obfuscation_detected,
            mapping: &p.mapping,
            toc: &p.toc,
            audit: &p.audit,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !fixed.pipeline.obfuscation_detected {
        println!(
            "[-] No fake DRM encryption detected, {} is an unchanged copy",
            fixed.output_path.display()
        );
        if interactive && !no_pause {
            pause("Press Enter to exit");
        }
    } else if interactive && !no_pause {
        pause("Conversion completed, press Enter to exit");
    }
    Ok(())
}

fn read_archive(input: &str) -> Result<Archive, Box<dyn std::error::Error + Send + Sync>> {
    let path = Path::new(input);
    if !path.is_file() {
        return Err(format!("Input file not found: {}", path.display()).into());
    }
    let bytes = std::fs::read(path)?;
    Ok(Archive::from_bytes(&bytes, &load_config().security_limits())?)
}

fn run_audit(input: &str, json: bool) -> CliResult {
    let archive = read_archive(input)?;
    let report = audit(&archive, &load_config().layout());

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if report.is_clean() {
        println!("[+] No unresolved references");
        return Ok(());
    }
    for f in &report.findings {
        let ext = if f.extension.is_empty() {
            "(none)"
        } else {
            f.extension.as_str()
        };
        println!(
            "[!] {}: {} unresolved .{} reference(s) [{}] - {}",
            f.entry,
            f.count,
            ext,
            f.severity,
            describe_extension(&f.extension)
        );
    }
    if let Some(worst) = report.worst() {
        println!("{} unresolved reference(s), worst severity: {}", report.total(), worst);
    }
    Ok(())
}

fn run_mapping(input: &str, json: bool) -> CliResult {
    let archive = read_archive(input)?;
    let mapping = build_mapping(&archive, &load_config().layout())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&mapping)?);
        return Ok(());
    }
    if mapping.is_empty() {
        println!("[-] Unable to identify encryption, possibly no fake DRM encryption");
        return Ok(());
    }
    for (decoded, entry) in mapping.iter() {
        println!("{} -> {}", decoded, entry.canonical);
    }
    Ok(())
}

fn run_config(action: &ConfigAction, json: bool) -> CliResult {
    match action {
        ConfigAction::Init => {
            let path = config_path().ok_or("Could not determine config directory")?;
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let toml = toml::to_string_pretty(&AppConfig::with_defaults())?;
            std::fs::write(&path, toml)?;
            if json {
                println!("{}", serde_json::json!({ "path": path }));
            } else {
                println!("Wrote default config to {}", path.display());
            }
        }
        ConfigAction::Show => {
            let cfg = load_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
    }
    Ok(())
}
