//! Evoke - the incremental build engine of a static site generator.
//!
//! # Module Structure
//!
//! ```text
//! src/
//! ├── build/       # Orchestration: plugins → public → select → schedule
//! ├── cli/         # clap definitions
//! ├── config/      # evoke.toml
//! ├── freshness/   # blake3 fingerprints, cache, rebuild selection
//! ├── graph/       # content → partial dependency graph
//! ├── layout/      # _layout.html resolution, template sets per chain
//! ├── output/      # atomic writes, overwrite or diff/patch merge
//! ├── pipeline/    # markdown, html, copy and plugin pipelines
//! ├── plugin/      # out-of-process plugin protocol
//! ├── scheduler/   # producer + worker pool, cancellation
//! ├── template/    # {{ .Content }} / {{ partial "…" }} templates
//! └── utils/
//! ```

pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod freshness;
pub mod graph;
pub mod layout;
pub mod logger;
pub mod output;
pub mod pipeline;
pub mod plugin;
pub mod scheduler;
pub mod template;
pub mod utils;

pub use build::{BuildOptions, BuildReport, build};
pub use error::{BuildError, Result};
