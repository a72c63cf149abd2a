//! CLI Argument Structures
//!
//! All argument definitions and command structures used by the suitecheck
//! binary.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use suitecheck_rs::io::reports::OutputFormat;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Test suite quality and coverage analysis
#[derive(Parser)]
#[command(name = "suitecheck")]
#[command(version = VERSION)]
#[command(about = "suitecheck - quality and coverage review for newly written tests")]
#[command(long_about = "
Evaluate candidate tests against an existing suite: near-duplicates,
redundant or outdated tests, coverage gained, and what is still uncovered.

Common Usage:

  # Review a new test file against the rest of the suite
  suitecheck analyze --candidate tests/test_reset.py --existing tests

  # Offline similarity and pre-generated coverage reports
  suitecheck analyze --candidate tests/test_reset.py --local-embeddings \\
      --baseline-report cov-before.json --candidate-report cov-after.json

  # Run pytest-cov / jest twice and write a JSON report
  suitecheck analyze --candidate tests/test_reset.py --run-coverage --format json --out report.json

  # Write a starter configuration
  suitecheck init-config
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze candidate tests
    Analyze(Box<AnalyzeArgs>),

    /// Print default configuration in YAML format
    #[command(name = "print-default-config")]
    PrintDefaultConfig,

    /// Initialize a configuration file with defaults
    #[command(name = "init-config")]
    InitConfig(InitConfigArgs),

    /// Validate a suitecheck configuration file
    #[command(name = "validate-config")]
    ValidateConfig(ValidateConfigArgs),

    /// List supported languages, test frameworks and coverage tools
    #[command(name = "list-languages")]
    ListLanguages,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Candidate test files or directories
    #[arg(long = "candidate", required = true, num_args = 1..)]
    pub candidates: Vec<PathBuf>,

    /// Existing test files or directories to compare against
    #[arg(long = "existing", num_args = 1..)]
    pub existing: Vec<PathBuf>,

    /// Project root used for test ids, module lookup and coverage runs [default: current directory]
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Root for resolving source files named in coverage data [default: workspace]
    #[arg(long)]
    pub source_root: Option<PathBuf>,

    /// Coverage report measured without the candidate tests
    #[arg(long, requires = "candidate_report")]
    pub baseline_report: Option<PathBuf>,

    /// Coverage report measured with the candidate tests
    #[arg(long, requires = "baseline_report")]
    pub candidate_report: Option<PathBuf>,

    /// Run the workspace's coverage tool for both scopes
    #[arg(long, conflicts_with_all = ["baseline_report", "candidate_report"])]
    pub run_coverage: bool,

    /// Run the two coverage scopes concurrently in separate workspace copies
    #[arg(long, requires = "run_coverage")]
    pub isolated: bool,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "markdown")]
    pub format: ReportFormat,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Similarity threshold (0.0-1.0) [default: 0.70]
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Skip embedding similarity
    #[arg(long)]
    pub no_embeddings: bool,

    /// Use offline hashed embeddings instead of the API
    #[arg(long, conflicts_with = "no_embeddings")]
    pub local_embeddings: bool,

    /// Skip AI suggestions
    #[arg(long)]
    pub no_ai_suggestions: bool,

    /// Skip the redundancy comparison
    #[arg(long)]
    pub no_redundancy: bool,

    /// Skip the outdated import check
    #[arg(long)]
    pub no_outdated_imports: bool,

    /// Report the coverage delta without gaps
    #[arg(long)]
    pub no_gaps: bool,

    /// Number of gaps to report [default: 5]
    #[arg(long)]
    pub top_gaps: Option<usize>,

    /// Project description passed to the suggestion provider
    #[arg(long)]
    pub context: Option<String>,
}

#[derive(Args)]
pub struct InitConfigArgs {
    /// Output configuration file name
    #[arg(short, long, default_value = ".suitecheck.yml")]
    pub output: PathBuf,

    /// Overwrite existing configuration file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ValidateConfigArgs {
    /// Path to configuration file to validate
    #[arg(short, long, required = true)]
    pub config: PathBuf,

    /// Show detailed configuration breakdown
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Markdown team report
    Markdown,
    /// JSON format output
    Json,
    /// YAML format output
    Yaml,
}

impl From<ReportFormat> for OutputFormat {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Markdown => Self::Markdown,
            ReportFormat::Json => Self::Json,
            ReportFormat::Yaml => Self::Yaml,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}
