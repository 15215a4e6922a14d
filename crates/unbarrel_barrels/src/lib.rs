//! Barrel-import rewriting for JavaScript/TypeScript projects.
//!
//! A barrel is an `index` file that only re-exports bindings from other
//! modules. Importing through one pulls the whole barrel into a bundle; this
//! crate finds the module that actually defines each imported binding and
//! rewrites the import to point at it.
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```no_run
//! use unbarrel_barrels::{Config, run_rewrite};
//! use std::io::{BufWriter, Write};
//!
//! # fn main() -> anyhow::Result<()> {
//! let cfg = Config {
//!     resolve: unbarrel_barrels::ResolveArgs {
//!         root: Some(std::path::PathBuf::from("/path/to/project")),
//!         ..Default::default()
//!     },
//!     entry_glob: None,
//!     write: false,
//!     check: false,
//! };
//!
//! let report = run_rewrite(cfg)?;
//!
//! if !report.files.is_empty() {
//!     let mut stdout = BufWriter::new(std::io::stdout());
//!     unbarrel_barrels::print_rewrites_tree(&mut stdout, &report)?;
//!     stdout.flush()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Querying the graph directly
//!
//! ```no_run
//! use std::path::Path;
//! use unbarrel_barrels::BarrelGraph;
//! use unbarrel_core::{Resolver, ResolverConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let graph = BarrelGraph::new(Resolver::new(ResolverConfig::new("/path/to/project")));
//! let spec = graph.direct_specifier("./components", Path::new("/path/to/project/src/app.ts"), "Button")?;
//! if let Some(spec) = spec {
//!     println!("Button lives in {}", spec.module_path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod barrel;
mod cache;
mod checker;
mod config;
mod pattern;
mod reporter;
mod rewrite;
mod specifier;
mod types;

// Re-export public API
pub use barrel::{BarrelFile, BarrelGraph, Deepest, GraphOptions, ScanMode};
pub use cache::{CacheEntry, SpecifierCache};
pub use checker::{explain, run_rewrite};
pub use config::{Config, ExplainConfig, ResolveArgs};
pub use pattern::{DefaultPattern, PatternTemplate, Segment};
pub use reporter::{print_explanation, print_no_rewrites_message, print_rewrites_tree};
pub use rewrite::{DirectBinding, RewriteOptions, StatementRewrite, plan_rewrites, rewrite_source};
pub use specifier::{Role, Specifier, SpecifierKind};
pub use types::{Explanation, FileRewrite, RewriteReport};
