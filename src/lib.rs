//! # suitecheck-rs: Test Suite Quality & Coverage Engine
//!
//! Evaluates newly written ("candidate") automated tests against an existing
//! suite and the code under test:
//!
//! - **Similarity**: embedding-based near-duplicate detection among candidates
//! - **Redundancy**: assertion fingerprints compared with existing tests
//! - **Outdated imports**: imports checked against the current codebase
//! - **Coverage**: Baseline vs Candidate delta with prioritized uncovered gaps
//! - **Suggestions**: advisory optimization hints from an LLM
//!
//! Stages run concurrently; a failing stage degrades the report instead of
//! aborting it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      QualityEngine                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Core         │  Detectors   │  Language   │  Providers     │
//! │ • Config      │ • Similarity │ • Python    │ • OpenAI       │
//! │ • Model       │ • Redundancy │ • JS / TS   │ • Local embed  │
//! │ • Pipeline    │ • Coverage   │ • Collector │ • Symbol index │
//! │ • Report      │              │             │                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use suitecheck_rs::{AnalysisInputs, EngineConfig, QualityEngine};
//! use suitecheck_rs::lang::collector::collect_from_file;
//! use suitecheck_rs::providers::{LocalEmbeddingProvider, WorkspaceSymbolIndex};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let root = std::path::Path::new(".");
//!     let candidates = collect_from_file(&root.join("tests/test_new.py"), root)?;
//!     let engine = QualityEngine::new(EngineConfig::default(), Arc::new(WorkspaceSymbolIndex::build(root)?))?
//!         .with_embedder(Arc::new(LocalEmbeddingProvider::default()));
//!
//!     let report = engine.analyze(AnalysisInputs::new(candidates)).await?;
//!     println!("Quality score: {:.1} ({})", report.score, report.rating);
//!     Ok(())
//! }
//! ```

#![warn(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

#[cfg(feature = "mimalloc")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod core {
    //! Configuration, data model, pipeline and report assembly.

    pub mod config;
    pub mod errors;
    pub mod model;
    pub mod pipeline;
    pub mod report;
}

pub mod detectors {
    //! The analysis stages.

    pub mod coverage;
    pub mod redundancy;
    pub mod similarity;
}

pub mod lang {
    //! Language adapters producing the common syntax tree, and test collection.

    pub mod collector;
    pub mod common;
    pub mod javascript;
    pub mod python;
    pub mod registry;
    pub mod typescript;
}

pub mod io {
    //! Report rendering.

    pub mod reports;
}

pub mod providers;

pub use core::config::{EngineConfig, ProviderConfig};
pub use core::errors::{Result, SuiteError};
pub use core::model::{
    CoverageGap, CoverageRun, CoverageScope, Language, RedundancyFinding, SimilarityPair, StageName, TestCase,
};
pub use core::pipeline::{AnalysisInputs, CoverageSource, QualityEngine};
pub use core::report::{QualityReport, Rating};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
