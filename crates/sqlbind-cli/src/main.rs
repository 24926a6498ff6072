use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sqlbind_core::{Config, Report, Severity};
use sqlbind_compiler::{compile_package, CompileResult};

/// sqlbind - typed query compiler front-end
#[derive(Parser)]
#[command(name = "sqlbind")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "sqlbind.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every package and write the typed queries as JSON
    Compile {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only compile this package
        #[arg(short, long)]
        package: Option<String>,
    },

    /// Compile every package and write a diagnostics report
    Check {
        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    config.validate()?;

    if cli.verbose {
        eprintln!(
            "{} {} package(s) from {}",
            "Using".cyan(),
            config.packages.len(),
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Compile { output, package } => {
            compile_command(&config, output.as_deref(), package.as_deref(), cli.verbose)
        }
        Commands::Check { output } => check_command(&config, &output, cli.verbose),
    }
}

/// Compile command - emit the typed queries of each package
fn compile_command(
    config: &Config,
    output: Option<&Path>,
    package: Option<&str>,
    verbose: bool,
) -> Result<()> {
    if let Some(name) = package {
        if config.package(name).is_none() {
            anyhow::bail!("No package named {} in config", name);
        }
    }

    let mut results: BTreeMap<&str, CompileResult> = BTreeMap::new();
    let mut report = Report::new();

    for pkg in &config.packages {
        if package.is_some_and(|name| name != pkg.name) {
            continue;
        }
        if verbose {
            eprintln!("  {} {}...", "Compiling".cyan(), pkg.name);
        }

        match compile_package(pkg, &config.project_root) {
            Ok(result) => {
                report.compiled(pkg, result.queries.len());
                results.insert(pkg.name.as_str(), result);
            }
            Err(err) => report.failed(pkg, err.to_diagnostics()),
        }
    }

    if report.has_errors() {
        print_report_summary(&report);
        std::process::exit(1);
    }

    let json = serde_json::to_string_pretty(&results).context("Failed to serialize compile result")?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if verbose {
                eprintln!("{} {}", "Result saved to:".green(), path.display());
            }
        }
        None => println!("{}", json),
    }

    Ok(())
}

/// Check command - compile everything and report diagnostics
fn check_command(config: &Config, output: &Path, verbose: bool) -> Result<()> {
    let mut report = Report::new();

    for pkg in &config.packages {
        if verbose {
            eprintln!("  {} {}...", "Checking".cyan(), pkg.name);
        }
        match compile_package(pkg, &config.project_root) {
            Ok(result) => report.compiled(pkg, result.queries.len()),
            Err(err) => report.failed(pkg, err.to_diagnostics()),
        }
    }

    report.save_to_file(output)?;

    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    print_report_summary(&report);

    // Exit with error code if there are errors
    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "sqlbind Check Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("sqlbind {} at {}", report.sqlbind_version, report.generated_at);
    println!();

    println!("{}", "Packages:".bold());
    for outcome in &report.packages {
        let status = if outcome.errors == 0 {
            format!("{} queries", outcome.queries).green()
        } else {
            format!("{} error(s)", outcome.errors).red()
        };
        println!("  {} ({}): {}", outcome.name, outcome.engine, status);
    }
    println!();

    println!("{}", "Summary:".bold());
    println!("  Packages: {}", report.summary.packages);
    println!("  Queries:  {}", report.summary.queries);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
        return;
    }

    println!("{}", "Diagnostics:".bold());
    for diag in &report.diagnostics {
        let severity_str = match diag.severity {
            Severity::Error => "ERROR".red().bold(),
            Severity::Warn => "WARN".yellow().bold(),
            Severity::Info => "INFO".cyan(),
        };

        println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

        if let Some(loc) = &diag.location {
            print!("    at {}", loc.file);
            if let (Some(line), Some(column)) = (loc.line, loc.column) {
                print!(":{}:{}", line, column);
            }
            println!();
        }
        if let Some(snippet) = &diag.snippet {
            println!("    {}", snippet.dimmed());
        }
    }
}
