//! Command Execution Logic
//!
//! Implements the analyze command and the configuration helpers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use owo_colors::OwoColorize;
use tabled::{settings::Style as TableStyle, Table, Tabled};
use tracing::{info, warn};

use crate::cli::args::{AnalyzeArgs, InitConfigArgs, ValidateConfigArgs};
use crate::cli::config_layer::{build_layered_config, load_configuration};
use suitecheck_rs::detectors::coverage::{runner_for_workspace, ReportFileSource};
use suitecheck_rs::io::reports::{render_report, write_report};
use suitecheck_rs::lang::collector::{collect_from_file, discover_test_files};
use suitecheck_rs::lang::registry::registered_languages;
use suitecheck_rs::providers::{
    EmbeddingProvider, LocalEmbeddingProvider, OpenAiClient, OpenAiConfig, SuggestionProvider, WorkspaceSymbolIndex,
};
use suitecheck_rs::{AnalysisInputs, CoverageSource, EngineConfig, QualityEngine, TestCase};

/// Main analyze command implementation
pub async fn analyze_command(args: AnalyzeArgs) -> anyhow::Result<()> {
    let config = build_layered_config(&args)?;

    let cwd = std::env::current_dir().context("Failed to resolve the current directory")?;
    let workspace = args.workspace.as_ref().map_or_else(|| cwd.clone(), |path| cwd.join(path));
    let source_root = args
        .source_root
        .as_ref()
        .map_or_else(|| workspace.clone(), |path| cwd.join(path));

    let candidate_files = expand_test_paths(&args.candidates, &cwd)?;
    let candidates = collect_all(&candidate_files, &workspace)?;
    if candidates.is_empty() {
        anyhow::bail!("No tests found in the candidate files");
    }
    let candidate_set: BTreeSet<&PathBuf> = candidate_files.iter().collect();
    let existing_files: Vec<PathBuf> = expand_test_paths(&args.existing, &cwd)?
        .into_iter()
        .filter(|path| !candidate_set.contains(path))
        .collect();
    let existing = collect_all(&existing_files, &workspace)?;
    info!(
        "Collected {} candidate and {} existing tests",
        candidates.len(),
        existing.len()
    );

    let symbols = WorkspaceSymbolIndex::build(&source_root)?;
    let mut engine = QualityEngine::new(config.clone(), Arc::new(symbols))?;
    let (embedder, suggester) = build_providers(&config, args.local_embeddings);
    if let Some(embedder) = embedder {
        engine = engine.with_embedder(embedder);
    }
    if let Some(suggester) = suggester {
        engine = engine.with_suggester(suggester);
    }

    let relative_candidates: Vec<String> = candidate_files
        .iter()
        .map(|path| relative_display(path, &workspace))
        .collect();
    let mut inputs = AnalysisInputs::new(candidates)
        .with_existing(existing)
        .with_source_root(source_root)
        .with_context(args.context.clone().unwrap_or_default());

    if let (Some(baseline), Some(candidate)) = (&args.baseline_report, &args.candidate_report) {
        inputs = inputs.with_coverage(CoverageSource::Execute {
            runner: Arc::new(ReportFileSource::new(cwd.join(baseline), cwd.join(candidate))),
            workspace: workspace.clone(),
            candidate_files: relative_candidates,
        });
    } else if args.run_coverage {
        match runner_for_workspace(&workspace) {
            Ok(runner) => {
                inputs = inputs.with_coverage(CoverageSource::Execute {
                    runner,
                    workspace: workspace.clone(),
                    candidate_files: relative_candidates,
                });
            }
            Err(e) => warn!("Coverage skipped: {}", e),
        }
    }

    let report = engine.analyze(inputs).await?;

    match &args.out {
        Some(path) => {
            write_report(&report, args.format.into(), path)?;
            eprintln!(
                "{} {} ({:.1}/10, {})",
                "Report written to".green(),
                path.display().to_string().cyan(),
                report.score,
                report.rating
            );
        }
        None => println!("{}", render_report(&report, args.format.into())?),
    }

    Ok(())
}

/// Pick embedding and suggestion providers from config, flags and environment.
fn build_providers(
    config: &EngineConfig,
    local_embeddings: bool,
) -> (Option<Arc<dyn EmbeddingProvider>>, Option<Arc<dyn SuggestionProvider>>) {
    let needs_api = (config.use_embeddings && !local_embeddings) || config.enable_ai_suggestions;
    let client = if needs_api {
        match OpenAiConfig::from_env(config.provider.clone()) {
            Ok(api) => Some(Arc::new(OpenAiClient::new(api))),
            Err(e) => {
                warn!("OpenAI provider unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let embedder: Option<Arc<dyn EmbeddingProvider>> = if !config.use_embeddings {
        None
    } else if local_embeddings {
        Some(Arc::new(LocalEmbeddingProvider::default()) as Arc<dyn EmbeddingProvider>)
    } else {
        client.clone().map(|c| c as Arc<dyn EmbeddingProvider>)
    };
    let suggester = if config.enable_ai_suggestions {
        client.map(|c| c as Arc<dyn SuggestionProvider>)
    } else {
        None
    };
    (embedder, suggester)
}

/// Files stay as given; directories expand to the test files below them.
fn expand_test_paths(paths: &[PathBuf], cwd: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for path in paths.iter().map(|path| cwd.join(path)) {
        if path.is_dir() {
            files.extend(discover_test_files(&path));
        } else if path.is_file() {
            files.insert(path);
        } else {
            anyhow::bail!("Path does not exist: {}", path.display());
        }
    }
    Ok(files.into_iter().collect())
}

fn collect_all(files: &[PathBuf], workspace: &Path) -> anyhow::Result<Vec<TestCase>> {
    let mut tests = Vec::new();
    for file in files {
        let collected =
            collect_from_file(file, workspace).with_context(|| format!("Failed to collect {}", file.display()))?;
        tests.extend(collected);
    }
    Ok(tests)
}

fn relative_display(path: &Path, workspace: &Path) -> String {
    path.strip_prefix(workspace)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Print default configuration in YAML format
pub fn print_default_config() -> anyhow::Result<()> {
    println!("{}", "# Default suitecheck configuration".dimmed());
    println!("{}", "# Save this to a file and customize as needed".dimmed());
    println!("{}", "# Usage: suitecheck analyze --config your-config.yml --candidate <file>".dimmed());
    println!();
    println!("{}", serde_yaml::to_string(&EngineConfig::default())?);
    Ok(())
}

#[derive(Tabled)]
struct SettingRow {
    setting: String,
    value: String,
}

fn setting(setting: &str, value: impl ToString) -> SettingRow {
    SettingRow {
        setting: setting.to_string(),
        value: value.to_string(),
    }
}

/// Initialize a configuration file with defaults
pub fn init_config(args: InitConfigArgs) -> anyhow::Result<()> {
    if args.output.exists() && !args.force {
        anyhow::bail!(
            "Configuration file already exists: {} (use --force to overwrite)",
            args.output.display()
        );
    }

    EngineConfig::default().to_yaml_file(&args.output)?;

    println!(
        "{} {}",
        "Configuration saved to:".bright_green().bold(),
        args.output.display().to_string().cyan()
    );
    println!();
    println!("{}", "Key settings you can customize:".bright_blue().bold());

    let rows = vec![
        setting("similarity_threshold", "Minimum cosine similarity for a pair (inclusive)"),
        setting("use_embeddings / enable_ai_suggestions", "Turn the provider-backed stages on or off"),
        setting("coverage_timeout_seconds", "Budget for each coverage tool run"),
        setting("top_gap_count", "Number of uncovered gaps in the report"),
        setting("provider.*", "Endpoint, models and retry policy; the key comes from OPENAI_API_KEY"),
    ];
    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{}", table);
    Ok(())
}

/// Validate a configuration file
pub fn validate_config(args: ValidateConfigArgs) -> anyhow::Result<()> {
    println!(
        "{} {}",
        "Validating configuration:".bright_blue().bold(),
        args.config.display().to_string().cyan()
    );

    let config = match load_configuration(Some(&args.config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Configuration validation failed:".red(), e);
            eprintln!("{}", "Tip: use 'suitecheck print-default-config' to see the valid format".dimmed());
            return Err(e);
        }
    };
    println!("{}", "Configuration file is valid!".bright_green().bold());

    let mut rows = vec![
        setting("Similarity threshold", format!("{:.2}", config.similarity_threshold)),
        setting("Embeddings", config.use_embeddings),
        setting("AI suggestions", config.enable_ai_suggestions),
        setting("Redundancy check", config.check_redundant_tests),
        setting("Outdated import check", config.check_outdated_imports),
        setting("Coverage timeout (s)", config.coverage_timeout_seconds),
        setting("Gaps", format!("{} (top {})", config.include_gaps, config.top_gap_count)),
    ];
    if args.verbose {
        rows.extend([
            setting(
                "Analysis deadline (s)",
                config
                    .analysis_deadline_seconds
                    .map_or_else(|| "none".to_string(), |s| s.to_string()),
            ),
            setting("Isolated coverage runs", config.isolated_coverage_runs),
            setting("Extra allowed modules", config.extra_allowed_modules.join(", ")),
            setting("Provider base URL", &config.provider.base_url),
            setting("Embedding model", &config.provider.embedding_model),
            setting("Chat model", &config.provider.chat_model),
            setting("Request timeout (s)", config.provider.request_timeout_seconds),
            setting("Max retries", config.provider.max_retries),
        ]);
    }
    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{}", table);
    Ok(())
}

/// List supported languages
pub fn list_languages() -> anyhow::Result<()> {
    #[derive(Tabled)]
    struct LanguageRow {
        language: String,
        extensions: String,
        frameworks: String,
        coverage: String,
    }

    let languages = registered_languages();
    println!("{}", "Supported Languages".bright_blue().bold());
    println!("   Found {} supported languages", languages.len());
    println!();

    let rows: Vec<LanguageRow> = languages
        .iter()
        .map(|info| LanguageRow {
            language: info.name.to_string(),
            extensions: info
                .extensions
                .iter()
                .map(|ext| format!(".{}", ext))
                .collect::<Vec<_>>()
                .join(", "),
            frameworks: info.frameworks.to_string(),
            coverage: info.coverage_tool.to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(TableStyle::rounded());
    println!("{}", table);
    Ok(())
}
