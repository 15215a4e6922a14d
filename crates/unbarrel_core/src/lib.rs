//! Module resolution core for unbarrel.
//!
//! This crate provides the pieces the barrel rewriter builds on:
//! - Path and specifier predicates
//! - Package manifest discovery (entry points, `exports` matching)
//! - Specifier resolution (aliases, relative paths, installed dependencies)
//! - Top-level statement classification through an injectable parser
//! - Alias-source adapters and source file collection

mod collector;
mod config;
mod constants;
mod error;
mod packages;
mod parser;
pub mod paths;
mod resolver;
mod types;

// Re-export public API
pub use collector::{CollectorConfig, collect_entries};
pub use config::{find_git_root, find_git_root_from, read_tsconfig_aliases, read_workspace_aliases};
pub use constants::{
    DEFAULT_EXTENSIONS, DEFAULT_MODULES_DIRS, INDEX_FILES, JS_TS_EXTENSIONS, is_node_builtin,
};
pub use error::{ResolveError, ResolverState};
pub use packages::{ExportsMatch, Manifest, Package, PackageRegistry};
pub use parser::{ExportBinding, ImportBinding, ModuleItem, ModuleParser, OxcModuleParser};
pub use resolver::{Alias, Resolver, ResolverConfig};
pub use types::{ModuleKind, ResolvedPath};
