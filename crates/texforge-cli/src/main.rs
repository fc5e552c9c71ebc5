//! texforge - convergent LaTeX builds with structured diagnostics
//!
//! ## Commands
//!
//! - `build`: compile a document until it converges
//! - `check`: show the build plan and any missing executables
//! - `parse-log`: classify an existing engine log
//!
//! Exit codes: 0 success, 1 build or log reported failure, 2 could not start.

mod render;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use texforge_core::engine::document_dir;
use texforge_core::{
    build_document, check_document, BuildConfig, BuildContext, BuildError, BuildMetadata,
    BuildRequest, Severity,
};
use texforge_log::{needs_rerun, parse_log, read_log, MessageCounts};
use tracing::{debug, Level};

use render::{CheckReport, Format, LogReport};

const EXIT_FAILED: u8 = 1;
const EXIT_NOT_STARTED: u8 = 2;

#[derive(Parser)]
#[command(name = "texforge")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Convergent LaTeX builds with structured diagnostics", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a document until it converges
    Build {
        #[command(flatten)]
        plan: PlanArgs,

        /// Maximum primary passes
        #[arg(long, env = "TEXFORGE_RERUN_BUDGET")]
        rerun_budget: Option<u32>,

        /// Kill any single process after this many seconds (0 = never)
        #[arg(long)]
        timeout: Option<u64>,

        /// Persistent cache root (default: temporary per build)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Show the build plan and report missing executables
    Check {
        #[command(flatten)]
        plan: PlanArgs,

        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Parse an engine log file into diagnostics
    ParseLog {
        /// Log file to parse
        log: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct PlanArgs {
    /// Document to compile
    document: PathBuf,

    /// Engine: `tectonic`, `pdflatex`, `xelatex`, `lualatex` or `auto`
    #[arg(short, long, env = "TEXFORGE_ENGINE")]
    engine: Option<String>,

    /// Build metadata JSON written by the document generator
    #[arg(short, long)]
    metadata: Option<PathBuf>,

    /// Config file (default: texforge.toml next to the document)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tool path override, repeatable
    #[arg(long = "tool", value_name = "NAME=PATH")]
    tools: Vec<String>,

    /// Use tectonic from PATH instead of the bundled binary
    #[arg(long, env = "TEXFORGE_SYSTEM_TECTONIC")]
    system_tectonic: bool,

    /// Document has a bibliography
    #[arg(long)]
    bibliography: bool,

    /// Document has an index
    #[arg(long)]
    index: bool,

    /// Document has a glossary
    #[arg(long)]
    glossary: bool,

    /// Document needs shell escape
    #[arg(long)]
    shell_escape: bool,
}

#[derive(Args)]
struct OutputArgs {
    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    format: Format,

    /// Lowest severity shown in text reports
    #[arg(long, value_enum, default_value = "warning")]
    min_severity: MinSeverity,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MinSeverity {
    Info,
    Warning,
    Error,
}

impl From<MinSeverity> for Severity {
    fn from(value: MinSeverity) -> Self {
        match value {
            MinSeverity::Info => Severity::Info,
            MinSeverity::Warning => Severity::Warning,
            MinSeverity::Error => Severity::Error,
        }
    }
}

impl PlanArgs {
    fn load_config(&self) -> Result<BuildConfig> {
        let mut config = BuildConfig::discover(self.config.as_deref(), &document_dir(&self.document))
            .context("Failed to load configuration")?;
        if let Some(engine) = &self.engine {
            config.engine = Some(engine.clone());
        }
        if self.system_tectonic {
            config.prefer_system_tectonic = true;
        }
        for spec in &self.tools {
            config.add_tool_override(spec)?;
        }
        Ok(config)
    }

    fn request(&self) -> Result<BuildRequest> {
        let mut metadata = match &self.metadata {
            Some(path) => BuildMetadata::load(path)
                .with_context(|| format!("Failed to read metadata {}", path.display()))?,
            None => BuildMetadata::default(),
        };
        metadata.bibliography |= self.bibliography;
        metadata.index |= self.index;
        metadata.glossary |= self.glossary;
        metadata.shell_escape |= self.shell_escape;

        Ok(BuildRequest::new(&self.document).with_metadata(metadata))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    texforge_core::telemetry::init_tracing(cli.json, level);

    match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("texforge: {err:#}");
            ExitCode::from(EXIT_NOT_STARTED)
        }
    }
}

async fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Build {
            plan,
            rerun_budget,
            timeout,
            cache_dir,
            output,
        } => cmd_build(&plan, rerun_budget, timeout, cache_dir, &output).await,
        Commands::Check { plan, format } => cmd_check(&plan, format),
        Commands::ParseLog { log, output } => cmd_parse_log(&log, &output),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_build(
    args: &PlanArgs,
    rerun_budget: Option<u32>,
    timeout: Option<u64>,
    cache_dir: Option<PathBuf>,
    output: &OutputArgs,
) -> Result<ExitCode> {
    let mut config = args.load_config()?;
    if let Some(budget) = rerun_budget {
        config.rerun_budget = budget;
    }
    if let Some(secs) = timeout {
        config.process_timeout_secs = secs;
    }
    if cache_dir.is_some() {
        config.cache_dir = cache_dir;
    }
    config.validate()?;
    debug!(?config, "effective configuration");

    let request = args.request()?;
    let context = BuildContext::system(config);

    let result = match build_document(&request, &context).await {
        Ok(result) => result,
        Err(BuildError::MissingDependencies(missing)) => {
            eprintln!("texforge: cannot build, missing executables:");
            for name in &missing {
                eprintln!("  {name}");
            }
            return Ok(ExitCode::from(EXIT_NOT_STARTED));
        }
        Err(err) => return Err(err.into()),
    };

    match output.format {
        Format::Json => print_json(&result)?,
        Format::Text => print!("{}", render::build_report(&result, output.min_severity.into())),
    }

    Ok(if result.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}

fn cmd_check(args: &PlanArgs, format: Format) -> Result<ExitCode> {
    let config = args.load_config()?;
    let request = args.request()?;
    let context = BuildContext::system(config);
    let (plan, missing) = check_document(&request, &context);

    match format {
        Format::Json => print_json(&CheckReport {
            plan: &plan,
            missing: &missing,
        })?,
        Format::Text => print!("{}", render::plan_report(&plan, &missing)),
    }

    Ok(if missing.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_NOT_STARTED)
    })
}

fn cmd_parse_log(path: &Path, output: &OutputArgs) -> Result<ExitCode> {
    let text = read_log(path)?;
    let messages = parse_log(&text);
    let counts = MessageCounts::tally(&messages);

    match output.format {
        Format::Json => print_json(&LogReport {
            messages: &messages,
            counts,
            rerun_requested: needs_rerun(&text),
        })?,
        Format::Text => {
            print!("{}", render::message_tree(&messages, output.min_severity.into()));
            println!("{}", render::counts_line(&counts));
        }
    }

    Ok(if counts.errors == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}
