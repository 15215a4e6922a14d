use anyhow::Result;
use dashmap::DashMap;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use unbarrel_core::{
    ModuleItem, ModuleParser, OxcModuleParser, Package, ResolveError, ResolvedPath, Resolver,
    is_node_builtin, paths,
};

use crate::{
    cache::SpecifierCache,
    pattern::DefaultPattern,
    specifier::{Specifier, SpecifierKind},
};

/// The re-export surface of one module, reduced to terminal specifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarrelFile {
    path: PathBuf,
    export_mapping: BTreeMap<String, Specifier>,
    default_pattern: Option<DefaultPattern>,
    /// Patterns of `export *` targets, consulted after the barrel's own.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    star_patterns: Vec<DefaultPattern>,
}

impl BarrelFile {
    pub fn empty(path: &Path) -> Self {
        Self { path: path.to_path_buf(), ..Default::default() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file has any re-export content worth substituting.
    pub fn is_barrel(&self) -> bool {
        !self.export_mapping.is_empty()
            || self.default_pattern.is_some()
            || !self.star_patterns.is_empty()
    }

    pub fn export_mapping(&self) -> &BTreeMap<String, Specifier> {
        &self.export_mapping
    }

    pub fn default_pattern(&self) -> Option<&DefaultPattern> {
        self.default_pattern.as_ref()
    }

    pub fn star_patterns(&self) -> &[DefaultPattern] {
        &self.star_patterns
    }

    /// The literal entry for `name`, else one materialized from the first
    /// pattern whose predicted module exists on disk.
    pub fn get_direct_specifier(&self, name: &str) -> Option<Specifier> {
        if let Some(spec) = self.export_mapping.get(name) {
            return Some(spec.clone());
        }
        let own = self.default_pattern.iter();
        let star = self.star_patterns.iter().filter(|_| name != "default");
        own.chain(star).map(|pattern| pattern.template().instantiate(name)).find(|spec| {
            let exists = spec.module_path.is_file();
            if exists {
                trace!("Materialized '{}' from a pattern of {}", name, self.path.display());
            }
            exists
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Any statement that is not a pure re-export empties the mapping.
    Shallow,
    /// Non-re-export statements are skipped; used for `export *` targets.
    ForceFull,
}

/// Outcome of following a specifier through nested barrels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deepest {
    Terminal(Specifier),
    /// The walk reached a barrel already being scanned or visited.
    Cycle(Specifier),
}

impl Deepest {
    pub fn into_specifier(self) -> Specifier {
        match self {
            Deepest::Terminal(spec) | Deepest::Cycle(spec) => spec,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GraphOptions {
    /// Turn a default pattern that absorbed a single re-export back into a
    /// literal entry.
    pub promote_single_use_pattern: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self { promote_single_use_pattern: true }
    }
}

/// Barrel files of one package.
#[derive(Debug)]
struct PackageBarrels {
    package: Arc<Package>,
    barrels: DashMap<PathBuf, Arc<BarrelFile>>,
    restored: bool,
}

/// Builds and answers queries over the re-export graph for one run.
pub struct BarrelGraph {
    resolver: Resolver,
    parser: Box<dyn ModuleParser>,
    options: GraphOptions,
    tables: DashMap<PathBuf, Arc<PackageBarrels>>,
    full_scans: DashMap<PathBuf, Arc<BarrelFile>>,
    cache: Option<SpecifierCache>,
    stale: DashMap<PathBuf, Arc<Package>>,
}

impl BarrelGraph {
    pub fn new(resolver: Resolver) -> Self {
        Self::with_parser(resolver, Box::new(OxcModuleParser))
    }

    pub fn with_parser(resolver: Resolver, parser: Box<dyn ModuleParser>) -> Self {
        Self {
            resolver,
            parser,
            options: GraphOptions::default(),
            tables: DashMap::new(),
            full_scans: DashMap::new(),
            cache: None,
            stale: DashMap::new(),
        }
    }

    pub fn with_options(mut self, options: GraphOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cache(mut self, cache: SpecifierCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Number of barrel files held across all packages.
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.value().barrels.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The barrel mapping of `path`; empty when `path` is not an `index`
    /// file, cannot be parsed, or is not a pure re-export module.
    pub fn get_barrel_file(&self, path: &Path) -> Result<Arc<BarrelFile>, ResolveError> {
        let mut stack = Vec::new();
        self.barrel_file_in(path, &mut stack)
    }

    /// Resolves `specifier` from `origin` and returns the terminal specifier
    /// for `name`, or `None` when the import should be left untouched.
    pub fn direct_specifier(
        &self,
        specifier: &str,
        origin: &Path,
        name: &str,
    ) -> Result<Option<Specifier>, ResolveError> {
        let resolved = self.resolver.resolve(specifier, origin)?;
        self.direct_specifier_of(&resolved, name)
    }

    pub fn direct_specifier_of(
        &self,
        resolved: &ResolvedPath,
        name: &str,
    ) -> Result<Option<Specifier>, ResolveError> {
        if resolved.used_manifest_exports_field() {
            return Ok(None);
        }
        let target = resolved.barrel_source();
        let barrel = self.get_barrel_file(target)?;
        if !barrel.is_barrel() {
            return Ok(None);
        }
        Ok(barrel.get_direct_specifier(name).filter(|spec| spec.module_path != barrel.path))
    }

    /// Follows `spec` through content-bearing barrels to the module that
    /// defines it. Depth is bounded only by the re-export graph itself.
    pub fn deepest(&self, spec: Specifier) -> Result<Deepest, ResolveError> {
        let mut stack = Vec::new();
        self.deepest_in(spec, &mut stack)
    }

    /// Writes the mappings of every dependency package scanned this run
    /// whose cache was stale or absent. Returns the number of packages written.
    pub fn persist_cache(&self) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        let mut written = 0;
        for entry in self.stale.iter() {
            let root = entry.key();
            let Some(table) = self.tables.get(root).map(|t| Arc::clone(t.value())) else {
                continue;
            };
            let barrels: BTreeMap<PathBuf, BarrelFile> = table
                .barrels
                .iter()
                .map(|b| (b.key().clone(), b.value().as_ref().clone()))
                .collect();
            if cache.store(entry.value(), barrels)? {
                written += 1;
            }
        }
        info!("Persisted barrel cache for {} packages", written);
        Ok(written)
    }

    fn table_for(&self, path: &Path) -> Result<Arc<PackageBarrels>, ResolveError> {
        let package = self.resolver.get_package_of(path)?;
        let root = package.root_dir().to_path_buf();
        if let Some(hit) = self.tables.get(&root) {
            return Ok(Arc::clone(hit.value()));
        }

        let restored = match (&self.cache, package.is_dependency()) {
            (Some(cache), true) => cache.load(&package),
            _ => None,
        };
        let table = match restored {
            Some(entry) => PackageBarrels {
                package,
                barrels: entry
                    .barrel_files
                    .into_iter()
                    .map(|(path, barrel)| (path, Arc::new(barrel)))
                    .collect(),
                restored: true,
            },
            None => PackageBarrels { package, barrels: DashMap::new(), restored: false },
        };
        let entry = self.tables.entry(root).or_insert_with(|| Arc::new(table));
        Ok(Arc::clone(entry.value()))
    }

    fn barrel_file_in(
        &self,
        path: &Path,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Arc<BarrelFile>, ResolveError> {
        if !paths::is_barrel_filename(path) {
            return Ok(Arc::new(BarrelFile::empty(path)));
        }
        let path = paths::normalize(path);
        let table = self.table_for(&path)?;
        if let Some(hit) = table.barrels.get(&path) {
            trace!("Barrel cache hit: {}", path.display());
            return Ok(Arc::clone(hit.value()));
        }

        let barrel = Arc::new(self.scan(&path, ScanMode::Shallow, stack)?);
        debug!(
            "Scanned {}: {} entries{}",
            path.display(),
            barrel.export_mapping.len(),
            if barrel.default_pattern.is_some() { " + default pattern" } else { "" }
        );
        let barrel = Arc::clone(table.barrels.entry(path).or_insert(barrel).value());
        if table.package.is_dependency() && !table.restored {
            let root = table.package.root_dir().to_path_buf();
            self.stale.entry(root).or_insert_with(|| Arc::clone(&table.package));
        }
        Ok(barrel)
    }

    /// Force-full scan of an `export *` target, memoized per path.
    fn full_scan_in(
        &self,
        path: &Path,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Option<Arc<BarrelFile>>, ResolveError> {
        if let Some(hit) = self.full_scans.get(path) {
            return Ok(Some(Arc::clone(hit.value())));
        }
        if stack.iter().any(|p| p == path) {
            debug!("Skipping cyclic export * of {}", path.display());
            return Ok(None);
        }
        let barrel = Arc::new(self.scan(path, ScanMode::ForceFull, stack)?);
        let barrel = Arc::clone(self.full_scans.entry(path.to_path_buf()).or_insert(barrel).value());
        Ok(Some(barrel))
    }

    fn deepest_in(&self, spec: Specifier, stack: &mut Vec<PathBuf>) -> Result<Deepest, ResolveError> {
        let mut current = spec;
        let mut visited: Vec<PathBuf> = Vec::new();
        loop {
            if current.kind == SpecifierKind::Namespace
                || !paths::is_barrel_filename(&current.module_path)
            {
                return Ok(Deepest::Terminal(current));
            }
            let module = current.module_path.clone();
            if stack.contains(&module) || visited.contains(&module) {
                trace!("Cycle through {} for '{}'", module.display(), current.external_name);
                return Ok(Deepest::Cycle(current));
            }
            let barrel = self.barrel_file_in(&module, stack)?;
            if !barrel.is_barrel() {
                return Ok(Deepest::Terminal(current));
            }
            let Some(next) = barrel.get_direct_specifier(current.binding_name()) else {
                return Ok(Deepest::Terminal(current));
            };
            trace!(
                "'{}' in {} comes from {}",
                current.binding_name(),
                module.display(),
                next.module_path.display()
            );
            visited.push(module);
            current = next.to_export(&current.external_name);
        }
    }

    fn resolve_module(&self, source: &str, from: &Path) -> Result<ResolvedPath, ResolveError> {
        self.resolver.resolve(source, from)
    }

    fn scan(
        &self,
        path: &Path,
        mode: ScanMode,
        stack: &mut Vec<PathBuf>,
    ) -> Result<BarrelFile, ResolveError> {
        let source = fs::read_to_string(path)
            .map_err(|source| ResolveError::ModuleRead { path: path.to_path_buf(), source })?;
        let Some(items) = self.parser.parse_module(path, &source) else {
            debug!("Treating unparseable {} as a non-barrel", path.display());
            return Ok(BarrelFile::empty(path));
        };

        stack.push(path.to_path_buf());
        let result = self.scan_items(path, &items, mode, stack);
        stack.pop();
        result
    }

    fn scan_items(
        &self,
        path: &Path,
        items: &[ModuleItem],
        mode: ScanMode,
        stack: &mut Vec<PathBuf>,
    ) -> Result<BarrelFile, ResolveError> {
        let mut builder = BarrelBuilder::new(path, self.options);
        let declared: HashSet<&str> = items
            .iter()
            .filter_map(|item| match item {
                ModuleItem::ExportDeclaration { names } => Some(names),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
            .collect();

        for item in items {
            match item {
                ModuleItem::Import { bindings, .. } if bindings.is_empty() => {
                    if mode == ScanMode::Shallow {
                        trace!("Side-effect import disqualifies {}", path.display());
                        return Ok(BarrelFile::empty(path));
                    }
                }
                ModuleItem::Import { source, bindings } => {
                    if is_node_builtin(source) {
                        continue;
                    }
                    let module = self.resolve_module(source, path)?;
                    for binding in bindings {
                        builder.imports.insert(
                            binding.local.clone(),
                            (
                                Specifier::import(
                                    module.barrel_source(),
                                    &binding.imported,
                                    &binding.local,
                                ),
                                module.used_manifest_exports_field(),
                            ),
                        );
                    }
                }
                ModuleItem::ReExport { source, bindings } => {
                    let module = self.resolve_module(source, path)?;
                    for binding in bindings {
                        let spec = Specifier::export(
                            module.barrel_source(),
                            &binding.local,
                            &binding.exported,
                        );
                        let spec = self.deepen(spec, module.used_manifest_exports_field(), stack)?;
                        builder.record(&binding.exported, spec);
                    }
                }
                ModuleItem::ExportLocal { bindings } => {
                    for binding in bindings {
                        if let Some((imported, boundary)) = builder.imports.get(&binding.local) {
                            let spec = imported.to_export(&binding.exported);
                            let boundary = *boundary;
                            let spec = self.deepen(spec, boundary, stack)?;
                            builder.record(&binding.exported, spec);
                        } else if declared.contains(binding.local.as_str()) {
                            builder.record(
                                &binding.exported,
                                Specifier::export(path, &binding.local, &binding.exported),
                            );
                        } else {
                            trace!("Dropping export of undeclared '{}'", binding.local);
                        }
                    }
                }
                ModuleItem::ExportDeclaration { names } => {
                    if mode == ScanMode::Shallow {
                        trace!("Local declaration disqualifies {}", path.display());
                        return Ok(BarrelFile::empty(path));
                    }
                    for name in names {
                        builder.record(name, Specifier::export(path, name, name));
                    }
                }
                ModuleItem::ExportDefault { identifier } => {
                    let imported = identifier.as_ref().and_then(|id| builder.imports.get(id));
                    match imported {
                        Some((imported, boundary)) => {
                            let spec = imported.to_export("default");
                            let boundary = *boundary;
                            let spec = self.deepen(spec, boundary, stack)?;
                            builder.record("default", spec);
                        }
                        None if mode == ScanMode::Shallow => {
                            trace!("Local default export disqualifies {}", path.display());
                            return Ok(BarrelFile::empty(path));
                        }
                        None => builder.record("default", Specifier::export(path, "default", "default")),
                    }
                }
                ModuleItem::ExportAll { source, alias: Some(alias) } => {
                    let module = self.resolve_module(source, path)?;
                    builder.record(alias, Specifier::export(module.barrel_source(), "*", alias));
                }
                ModuleItem::ExportAll { source, alias: None } => {
                    let module = self.resolve_module(source, path)?;
                    if module.used_manifest_exports_field() {
                        // The names behind an exports map are not enumerable here.
                        if mode == ScanMode::Shallow {
                            return Ok(BarrelFile::empty(path));
                        }
                        continue;
                    }
                    let target = paths::normalize(module.barrel_source());
                    if let Some(nested) = self.full_scan_in(&target, stack)? {
                        builder.merge(&nested);
                    }
                }
                ModuleItem::Inert => {}
                ModuleItem::Other => {
                    if mode == ScanMode::Shallow {
                        trace!("Statement disqualifies {}", path.display());
                        return Ok(BarrelFile::empty(path));
                    }
                }
            }
        }

        Ok(builder.finish())
    }

    fn deepen(
        &self,
        spec: Specifier,
        boundary: bool,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Specifier, ResolveError> {
        if boundary {
            return Ok(spec);
        }
        Ok(self.deepest_in(spec, stack)?.into_specifier())
    }
}

/// Mutable state of one scan.
struct BarrelBuilder {
    path: PathBuf,
    dir: PathBuf,
    options: GraphOptions,
    /// Local name to import view, and whether it resolved through an exports map.
    imports: HashMap<String, (Specifier, bool)>,
    mapping: BTreeMap<String, Specifier>,
    pattern: Option<DefaultPattern>,
    star_patterns: Vec<DefaultPattern>,
}

impl BarrelBuilder {
    fn new(path: &Path, options: GraphOptions) -> Self {
        Self {
            path: path.to_path_buf(),
            dir: path.parent().unwrap_or(path).to_path_buf(),
            options,
            imports: HashMap::new(),
            mapping: BTreeMap::new(),
            pattern: None,
            star_patterns: Vec::new(),
        }
    }

    fn record(&mut self, name: &str, spec: Specifier) {
        match &mut self.pattern {
            Some(pattern) => {
                if pattern.try_absorb(&spec) {
                    self.mapping.remove(name);
                } else {
                    self.mapping.insert(name.to_string(), spec);
                }
            }
            None => match DefaultPattern::seed(&spec, &self.dir) {
                Some(pattern) => {
                    self.mapping.remove(name);
                    self.pattern = Some(pattern);
                }
                None => {
                    self.mapping.insert(name.to_string(), spec);
                }
            },
        }
    }

    /// Merges the surface of an `export *` target; `default` never crosses.
    fn merge(&mut self, nested: &BarrelFile) {
        for (name, spec) in &nested.export_mapping {
            if name != "default" {
                self.mapping.insert(name.clone(), spec.clone());
            }
        }
        if let Some(pattern) = &nested.default_pattern {
            if self.pattern.is_none() {
                self.pattern = Some(pattern.clone());
            } else if !self.star_patterns.contains(pattern) {
                self.star_patterns.push(pattern.clone());
            }
        }
        for pattern in &nested.star_patterns {
            if !self.star_patterns.contains(pattern) {
                self.star_patterns.push(pattern.clone());
            }
        }
    }

    fn finish(mut self) -> BarrelFile {
        if self.options.promote_single_use_pattern
            && let Some(seed) = self.pattern.as_ref().and_then(|p| p.single_use()).cloned()
        {
            self.mapping.entry(seed.external_name.clone()).or_insert(seed);
            self.pattern = None;
        }
        BarrelFile {
            path: self.path,
            export_mapping: self.mapping,
            default_pattern: self.pattern,
            star_patterns: self.star_patterns,
        }
    }
}
