use anyhow::{Context, Result, anyhow};
use log::{debug, info, trace, warn};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
};
use unbarrel_core::{
    CollectorConfig, ModuleKind, Resolver, ResolverConfig, collect_entries, find_git_root,
    read_tsconfig_aliases, read_workspace_aliases,
};

use crate::{
    barrel::BarrelGraph,
    cache::SpecifierCache,
    config::{Config, ExplainConfig, ResolveArgs},
    rewrite::{RewriteOptions, plan_rewrites, rewrite_source},
    types::{Explanation, FileRewrite, RewriteReport},
};

fn resolve_root(args: &mut ResolveArgs) -> Result<PathBuf> {
    let root = if let Some(r) = args.root.take() {
        debug!("Using provided root directory: {:?}", r);
        r.canonicalize().unwrap_or(r)
    } else {
        debug!("No root provided, searching for git root");
        find_git_root()?
    };
    info!("Using root directory: {}", root.display());
    args.root = Some(root.clone());
    Ok(root)
}

/// Builds the resolver and barrel graph for `root`: tsconfig paths first,
/// then workspace packages, then aliases given on the command line.
fn build_graph(args: &ResolveArgs, root: &Path) -> Result<BarrelGraph> {
    let mut config = ResolverConfig::new(root);

    let mut aliases = read_tsconfig_aliases(root)?;
    debug!("Found {} tsconfig path aliases", aliases.len());
    let workspaces = read_workspace_aliases(root)?;
    debug!("Found {} workspace packages", workspaces.len());
    aliases.extend(workspaces);
    aliases.extend(args.aliases.iter().cloned());
    for (pattern, dest) in &aliases {
        trace!("Registering alias '{}' -> '{}'", pattern, dest);
        config
            .append_alias(pattern, dest.as_str())
            .with_context(|| format!("Invalid alias pattern '{pattern}'"))?;
    }
    if !args.extensions.is_empty() {
        config.set_extension_search_order(&args.extensions);
    }
    if !args.modules_dirs.is_empty() {
        config.set_dependency_install_directories(&args.modules_dirs);
    }

    let mut graph = BarrelGraph::new(Resolver::new(config));
    if args.cache {
        let dir = args
            .cache_dir
            .clone()
            .unwrap_or_else(|| root.join("node_modules").join(".cache").join("unbarrel"));
        graph = graph.with_cache(SpecifierCache::open(dir)?);
    }
    Ok(graph)
}

/// Consumers follow the project manifest's `type`, CommonJS when absent.
fn project_module_kind(graph: &BarrelGraph, root: &Path) -> Result<ModuleKind> {
    let package = graph.resolver().packages().manifest_at(root)?;
    Ok(package.map(|p| p.kind()).unwrap_or_default())
}

pub fn run_rewrite(mut cfg: Config) -> Result<RewriteReport> {
    info!("Starting barrel rewrite");
    let root = resolve_root(&mut cfg.resolve)?;
    let graph = build_graph(&cfg.resolve, &root)?;
    let options = RewriteOptions { consumer_kind: project_module_kind(&graph, &root)? };
    debug!("Consumer module kind: {:?}", options.consumer_kind);

    debug!("Collecting source files with glob: {:?}", cfg.entry_glob);
    let entries = collect_entries(&CollectorConfig {
        root: root.clone(),
        entry_glob: cfg.entry_glob.clone(),
        modules_dirs: graph.resolver().config().modules_dirs().to_vec(),
    })?;
    if entries.is_empty() {
        warn!("No source files found under {}", root.display());
        return Err(anyhow!("No source files found under {}", root.display()));
    }
    info!("Processing {} source files in parallel", entries.len());

    let mut files: Vec<FileRewrite> = entries
        .par_iter()
        .filter_map(|entry| {
            debug!("Thread {:?} processing: {}", thread::current().id(), entry.display());
            let source = match fs::read_to_string(entry) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Failed to read {}: {}", entry.display(), e);
                    return None;
                }
            };
            let rewrites = plan_rewrites(&graph, &options, entry, &source);
            if rewrites.is_empty() {
                return None;
            }

            let mut written = false;
            if cfg.write {
                match fs::write(entry, rewrite_source(&source, &rewrites)) {
                    Ok(()) => written = true,
                    Err(e) => warn!("Failed to write {}: {}", entry.display(), e),
                }
            }
            let file = entry.strip_prefix(&root).unwrap_or(entry).to_string_lossy().to_string();
            Some(FileRewrite { file, rewrites, written })
        })
        .collect();
    files.sort_by(|a, b| a.file.cmp(&b.file));

    let cached_packages = if cfg.resolve.cache { graph.persist_cache()? } else { 0 };
    let report = RewriteReport {
        root,
        files,
        files_analyzed: entries.len(),
        barrels_scanned: graph.len(),
        cached_packages,
    };
    info!(
        "Barrel rewrite complete. {} statements in {} files",
        report.statements(),
        report.files.len()
    );
    Ok(report)
}

pub fn explain(mut cfg: ExplainConfig) -> Result<Explanation> {
    let root = resolve_root(&mut cfg.resolve)?;
    let graph = build_graph(&cfg.resolve, &root)?;
    let from = if cfg.from.is_absolute() { cfg.from.clone() } else { root.join(&cfg.from) };

    let resolved = graph.resolver().resolve(&cfg.specifier, &from)?;
    let barrel = graph.get_barrel_file(resolved.barrel_source())?;
    let mut names = Vec::with_capacity(cfg.names.len());
    for name in &cfg.names {
        names.push((name.clone(), graph.direct_specifier_of(&resolved, name)?));
    }
    Ok(Explanation {
        specifier: cfg.specifier,
        from,
        is_barrel: barrel.is_barrel(),
        resolved,
        names,
    })
}
