//! dbmlflow CLI: compile DBML to a node/edge graph, lint it, or list completions.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbmlflow::compile::{CompileOptions, compile};
use dbmlflow::complete::complete;
use dbmlflow::dialect::Dialect;
use dbmlflow::insight::{DocumentInsight, ParserInsight};
use dbmlflow::lint::Severity;
use dbmlflow::parser::parse;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "dbmlflow", version, about = "Compile DBML schemas into ER graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile a DBML document to graph JSON.
    Compile {
        /// Input file path or "-" for stdin
        #[arg(default_value = "-")]
        input: String,

        /// Dialect: dbml, dbmlv2
        #[arg(short, long)]
        dialect: Option<String>,

        /// Fail on unknown partial references
        #[arg(long)]
        strict: bool,

        /// JSON file with compile options
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file path. If omitted, writes to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Report bracket and parse diagnostics. Exits non-zero on errors.
    Lint {
        /// Input file path or "-" for stdin
        #[arg(default_value = "-")]
        input: String,

        /// Dialect: dbml, dbmlv2
        #[arg(short, long)]
        dialect: Option<String>,
    },

    /// List completions for a prefix.
    Complete {
        /// Input file path or "-" for stdin
        input: String,

        /// Text typed so far
        #[arg(default_value = "")]
        prefix: String,

        /// Suggest even for an empty prefix
        #[arg(long)]
        explicit: bool,
    },
}

#[derive(Serialize)]
struct CompileOutput<'a> {
    #[serde(flatten)]
    graph: &'a dbmlflow::graph::Graph,
    warnings: Vec<String>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Compile {
            input,
            dialect,
            strict,
            config,
            output,
            pretty,
        } => cmd_compile(
            &input,
            dialect.as_deref(),
            strict,
            config.as_ref(),
            output.as_ref(),
            pretty,
        ),
        Command::Lint { input, dialect } => cmd_lint(&input, dialect.as_deref()),
        Command::Complete {
            input,
            prefix,
            explicit,
        } => cmd_complete(&input, &prefix, explicit),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .try_init();
}

fn parse_dialect(name: Option<&str>) -> Result<Dialect> {
    match name {
        None => Ok(Dialect::default()),
        Some(name) => Dialect::from_str(name)
            .with_context(|| format!("Unknown dialect: {name} (expected dbml or dbmlv2)")),
    }
}

fn load_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read file: {input}"))
    }
}

fn load_options(path: Option<&PathBuf>) -> Result<CompileOptions> {
    let Some(path) = path else {
        return Ok(CompileOptions::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid config: {}", path.display()))
}

fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to: {}", path.display()))?;
            info!("Wrote output to: {}", path.display());
        }
        None => {
            let mut stdout = io::stdout();
            stdout
                .write_all(content.as_bytes())
                .and_then(|()| stdout.write_all(b"\n"))
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

fn cmd_compile(
    input: &str,
    dialect: Option<&str>,
    strict: bool,
    config: Option<&PathBuf>,
    output: Option<&PathBuf>,
    pretty: bool,
) -> Result<ExitCode> {
    let source = load_input(input)?;
    let dialect = parse_dialect(dialect)?;
    let mut options = load_options(config)?;
    options.strict_group_resolution |= strict;

    let doc = parse(&source, dialect).context("Parse failed")?;
    let compiled = compile(&doc, &options).context("Compile failed")?;
    for warning in &compiled.warnings {
        warn!("{warning}");
    }

    let out = CompileOutput {
        graph: &compiled.graph,
        warnings: compiled.warnings.iter().map(ToString::to_string).collect(),
    };
    let json = if pretty {
        serde_json::to_string_pretty(&out)?
    } else {
        serde_json::to_string(&out)?
    };
    write_output(output, &json)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_lint(input: &str, dialect: Option<&str>) -> Result<ExitCode> {
    let source = load_input(input)?;
    let insight = ParserInsight::new(parse_dialect(dialect)?, CompileOptions::default());
    let diagnostics = insight.diagnostics(&source);

    for d in &diagnostics {
        let level = match d.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        println!("{input}:{}: {level}: {}", d.line, d.message);
    }

    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn cmd_complete(input: &str, prefix: &str, explicit: bool) -> Result<ExitCode> {
    let source = load_input(input)?;
    for item in complete(prefix, explicit, &source) {
        match item.info {
            Some(info) => println!("{}\t{}\t{info}", item.label, kind_name(item.kind)),
            None => println!("{}\t{}", item.label, kind_name(item.kind)),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn kind_name(kind: dbmlflow::complete::CompletionKind) -> &'static str {
    use dbmlflow::complete::CompletionKind;
    match kind {
        CompletionKind::Keyword => "keyword",
        CompletionKind::Table => "table",
        CompletionKind::Field => "field",
    }
}
