//! Configuration Layer Management
//!
//! Defaults, then the configuration file, then command-line flags. The merged
//! result is validated once before the engine sees it.

use std::path::Path;

use crate::cli::args::AnalyzeArgs;
use suitecheck_rs::EngineConfig;

/// Convert CLI arguments into configuration overrides
pub trait ApplyCliArgs {
    /// Apply every flag that was given; flags left unset keep the file value
    fn apply_cli_args(&mut self, args: &AnalyzeArgs);
}

impl ApplyCliArgs for EngineConfig {
    fn apply_cli_args(&mut self, args: &AnalyzeArgs) {
        if let Some(threshold) = args.threshold {
            self.similarity_threshold = threshold;
        }
        if args.no_embeddings {
            self.use_embeddings = false;
        }
        if args.no_ai_suggestions {
            self.enable_ai_suggestions = false;
        }
        if args.no_redundancy {
            self.check_redundant_tests = false;
        }
        if args.no_outdated_imports {
            self.check_outdated_imports = false;
        }
        if args.no_gaps {
            self.include_gaps = false;
        }
        if let Some(top) = args.top_gaps {
            self.top_gap_count = top;
        }
        if args.isolated {
            self.isolated_coverage_runs = true;
        }
    }
}

/// Load the file layer, or defaults when no file is given.
pub fn load_configuration(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::from_yaml_file(path)?),
        None => Ok(EngineConfig::default()),
    }
}

/// Merge all layers and validate the result.
pub fn build_layered_config(args: &AnalyzeArgs) -> anyhow::Result<EngineConfig> {
    let mut config = load_configuration(args.config.as_deref())?;
    config.apply_cli_args(args);
    config.validate()?;
    Ok(config)
}
