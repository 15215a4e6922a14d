use anyhow::{Result, anyhow};
use clap::{Args, Parser};
use std::path::PathBuf;

/// Options shared by every command that resolves specifiers.
#[derive(Debug, Clone, Default, Args)]
pub struct ResolveArgs {
    /// Root directory of the project (defaults to git root)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Extra alias as PATTERN=DEST, where PATTERN is a regex and DEST may use $1 (repeatable)
    #[arg(long = "alias", value_parser = parse_alias)]
    pub aliases: Vec<(String, String)>,

    /// Comma-separated extension search order
    #[arg(long, value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Comma-separated dependency install directories
    #[arg(long, value_delimiter = ',')]
    pub modules_dirs: Vec<String>,

    /// Reuse and persist dependency barrel mappings across runs
    #[arg(long)]
    pub cache: bool,

    /// Cache directory (defaults to <root>/node_modules/.cache/unbarrel)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "rewrite")]
#[command(about = "Rewrite barrel imports into direct imports")]
pub struct Config {
    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Glob pattern to filter source files
    #[arg(long)]
    pub entry_glob: Option<String>,

    /// Write rewritten files back to disk
    #[arg(long)]
    pub write: bool,

    /// Exit non-zero when any rewrite is pending
    #[arg(long)]
    pub check: bool,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "explain")]
#[command(about = "Show how a specifier resolves and where its bindings live")]
pub struct ExplainConfig {
    /// The specifier to resolve, as written in an import
    pub specifier: String,

    /// File the specifier is imported from
    #[arg(long)]
    pub from: PathBuf,

    /// Binding names to look up in the barrel
    pub names: Vec<String>,

    #[command(flatten)]
    pub resolve: ResolveArgs,
}

fn parse_alias(value: &str) -> Result<(String, String)> {
    let (pattern, dest) =
        value.split_once('=').ok_or_else(|| anyhow!("expected PATTERN=DEST, got '{value}'"))?;
    if pattern.is_empty() {
        return Err(anyhow!("alias pattern must not be empty"));
    }
    Ok((pattern.to_string(), dest.to_string()))
}
