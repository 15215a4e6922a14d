use dashmap::DashMap;
use log::{debug, trace};
use regex::Regex;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    constants::{DEFAULT_EXTENSIONS, DEFAULT_MODULES_DIRS},
    error::{ResolveError, ResolverState},
    packages::{Package, PackageRegistry},
    paths,
    types::{ModuleKind, ResolvedPath},
};

/// A specifier rewrite rule: the first alias whose pattern matches wins.
#[derive(Debug, Clone)]
pub struct Alias {
    pattern: Regex,
    destination: String,
}

impl Alias {
    /// `destination` may reference capture groups of `pattern` (`${1}`).
    pub fn new(pattern: &str, destination: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self { pattern: Regex::new(pattern)?, destination: destination.into() })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    fn apply(&self, specifier: &str) -> Option<String> {
        if !self.pattern.is_match(specifier) {
            return None;
        }
        Some(self.pattern.replace(specifier, self.destination.as_str()).into_owned())
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub project_root: PathBuf,
    aliases: Vec<Alias>,
    extensions: Vec<String>,
    modules_dirs: Vec<String>,
}

impl ResolverConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            aliases: Vec::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            modules_dirs: DEFAULT_MODULES_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn append_alias(
        &mut self,
        pattern: &str,
        destination: impl Into<String>,
    ) -> Result<(), regex::Error> {
        self.aliases.push(Alias::new(pattern, destination)?);
        Ok(())
    }

    /// Entries gain a leading dot if missing; the literal path is always probed first.
    pub fn set_extension_search_order<S: AsRef<str>>(&mut self, extensions: &[S]) {
        let mut normalized = vec![String::new()];
        for ext in extensions {
            let ext = ext.as_ref().trim();
            if ext.is_empty() {
                continue;
            }
            let ext = if ext.starts_with('.') { ext.to_string() } else { format!(".{ext}") };
            if !normalized.contains(&ext) {
                normalized.push(ext);
            }
        }
        self.extensions = normalized;
    }

    pub fn set_dependency_install_directories<S: AsRef<str>>(&mut self, dirs: &[S]) {
        self.modules_dirs = dirs.iter().map(|d| d.as_ref().to_string()).collect();
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn modules_dirs(&self) -> &[String] {
        &self.modules_dirs
    }

    pub fn state(&self) -> ResolverState {
        ResolverState {
            aliases: self
                .aliases
                .iter()
                .map(|a| (a.pattern().to_string(), a.destination().to_string()))
                .collect(),
            extensions: self.extensions.clone(),
            modules_dirs: self.modules_dirs.clone(),
        }
    }

    fn substitute_alias(&self, specifier: &str) -> Option<String> {
        self.aliases.iter().find_map(|alias| alias.apply(specifier))
    }
}

/// Resolves specifiers to on-disk modules for one compilation run.
#[derive(Debug)]
pub struct Resolver {
    config: ResolverConfig,
    packages: PackageRegistry,
    dependency_roots: DashMap<String, Option<PathBuf>>,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        let packages = PackageRegistry::new(&config.project_root, config.modules_dirs.clone());
        Self { config, packages, dependency_roots: DashMap::new() }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn packages(&self) -> &PackageRegistry {
        &self.packages
    }

    pub fn append_alias(
        &mut self,
        pattern: &str,
        destination: impl Into<String>,
    ) -> Result<(), regex::Error> {
        self.config.append_alias(pattern, destination)?;
        self.dependency_roots.clear();
        Ok(())
    }

    pub fn set_extension_search_order<S: AsRef<str>>(&mut self, extensions: &[S]) {
        self.config.set_extension_search_order(extensions);
        self.dependency_roots.clear();
    }

    pub fn set_dependency_install_directories<S: AsRef<str>>(&mut self, dirs: &[S]) {
        self.config.set_dependency_install_directories(dirs);
        self.packages =
            PackageRegistry::new(&self.config.project_root, self.config.modules_dirs.clone());
        self.dependency_roots.clear();
    }

    pub fn is_dependency_path(&self, path: &Path) -> bool {
        self.packages.is_dependency_path(path)
    }

    pub fn get_package_of(&self, path: &Path) -> Result<Arc<Package>, ResolveError> {
        self.packages.get_package_of(path)
    }

    pub fn resolve(&self, specifier: &str, origin: &Path) -> Result<ResolvedPath, ResolveError> {
        trace!("Resolving: '{}' from {}", specifier, origin.display());

        let request = if paths::is_regular_path(specifier) {
            specifier.to_string()
        } else {
            match self.config.substitute_alias(specifier) {
                Some(rewritten) => {
                    trace!("Alias rewrote '{}' to '{}'", specifier, rewritten);
                    rewritten
                }
                None => specifier.to_string(),
            }
        };

        let resolved = if paths::is_regular_path(&request) {
            let base = origin.parent().unwrap_or(&self.config.project_root);
            let target = paths::normalize(&base.join(&request));
            self.resolve_location(specifier, &target, origin)?
        } else {
            self.resolve_dependency(specifier, &request, origin)?
        };

        match resolved {
            Some(resolved) => {
                debug!(
                    "Resolved '{}' from {} to {}",
                    specifier,
                    origin.display(),
                    resolved.primary_file().display()
                );
                Ok(resolved)
            }
            None => Err(ResolveError::NotFound {
                specifier: specifier.to_string(),
                origin: origin.to_path_buf(),
                state: self.config.state(),
            }),
        }
    }

    /// Literal path with extensions, then the directory manifest, then `index`.
    fn resolve_location(
        &self,
        specifier: &str,
        target: &Path,
        origin: &Path,
    ) -> Result<Option<ResolvedPath>, ResolveError> {
        if let Some(file) = self.probe_extensions(target) {
            let kind = self.classify(&file, origin)?;
            return Ok(Some(ResolvedPath::single(specifier, file, kind)));
        }
        if !target.is_dir() {
            return Ok(None);
        }
        if let Some(package) = self.packages.manifest_at(target)?
            && let Some(resolved) = self.resolve_manifest_fields(specifier, &package, origin)?
        {
            return Ok(Some(resolved));
        }
        if let Some(file) = self.probe_extensions(&target.join("index")) {
            let kind = self.classify(&file, origin)?;
            return Ok(Some(ResolvedPath::single(specifier, file, kind)));
        }
        Ok(None)
    }

    fn resolve_manifest_fields(
        &self,
        specifier: &str,
        package: &Package,
        origin: &Path,
    ) -> Result<Option<ResolvedPath>, ResolveError> {
        if let Some(matched) = package.match_exports(".") {
            trace!("Using exports field of {} for '{}'", package.name(), specifier);
            return Ok(ResolvedPath::from_entries(
                specifier,
                Some(matched.import),
                Some(matched.require),
            )
            .map(ResolvedPath::with_exports_field));
        }

        let root = package.root_dir();
        let cjs = package.cjs_main().and_then(|main| self.probe_entry(&root.join(main)));
        let esm = package.esm_main().and_then(|main| self.probe_entry(&root.join(main)));
        let Some(resolved) = ResolvedPath::from_entries(specifier, esm, cjs) else {
            return Ok(None);
        };
        if !resolved.is_dual() {
            return Ok(Some(resolved));
        }
        let context = self.origin_context(origin)?;
        trace!("Dual entry for '{}', origin context {:?}", specifier, context);
        Ok(Some(resolved.narrowed_to(context)))
    }

    fn resolve_dependency(
        &self,
        specifier: &str,
        request: &str,
        origin: &Path,
    ) -> Result<Option<ResolvedPath>, ResolveError> {
        let (name, rest) = paths::split_package_specifier(request);
        let Some(root) = self.dependency_root(name, origin) else {
            return Ok(None);
        };

        if !rest.is_empty()
            && let Some(package) = self.packages.manifest_at(&root)?
            && let Some(matched) = package.match_exports(&format!(".{rest}"))
        {
            trace!("Using exports field of {} for subpath '{}'", name, rest);
            return Ok(ResolvedPath::from_entries(
                specifier,
                Some(matched.import),
                Some(matched.require),
            )
            .map(ResolvedPath::with_exports_field));
        }

        let target = paths::normalize(&root.join(rest.trim_start_matches('/')));
        self.resolve_location(specifier, &target, origin)
    }

    /// The installed root of package `name`, memoized by name alone.
    fn dependency_root(&self, name: &str, origin: &Path) -> Option<PathBuf> {
        if let Some(hit) = self.dependency_roots.get(name) {
            trace!("Dependency root cache hit for '{}'", name);
            return hit.value().clone();
        }
        let start = origin.parent().unwrap_or(&self.config.project_root);
        let found = start
            .ancestors()
            .filter(|dir| !self.is_dependency_path(dir))
            .find_map(|dir| {
                self.config
                    .modules_dirs
                    .iter()
                    .map(|install| dir.join(install).join(name))
                    .find(|candidate| candidate.is_dir())
            });
        match &found {
            Some(root) => debug!("Found dependency '{}' at {}", name, root.display()),
            None => debug!("Dependency '{}' is not installed above {}", name, start.display()),
        }
        self.dependency_roots.insert(name.to_string(), found.clone());
        found
    }

    fn probe_extensions(&self, base: &Path) -> Option<PathBuf> {
        self.config.extensions.iter().find_map(|ext| {
            let candidate = PathBuf::from(format!("{}{}", base.display(), ext));
            trace!("Probing {}", candidate.display());
            candidate.is_file().then_some(candidate)
        })
    }

    fn probe_entry(&self, entry: &Path) -> Option<PathBuf> {
        let entry = paths::normalize(entry);
        self.probe_extensions(&entry).or_else(|| self.probe_extensions(&entry.join("index")))
    }

    /// The module format the origin file is evaluated in, when known.
    fn origin_context(&self, origin: &Path) -> Result<Option<ModuleKind>, ResolveError> {
        if paths::has_extension(origin, "cjs") || paths::has_extension(origin, "cts") {
            return Ok(Some(ModuleKind::CommonJs));
        }
        if paths::has_extension(origin, "mjs") || paths::has_extension(origin, "mts") {
            return Ok(Some(ModuleKind::Module));
        }
        Ok(self.packages.get_package_of(origin)?.declared_kind())
    }

    /// Classifies a resolved file relative to the boundary crossed to reach it.
    fn classify(&self, file: &Path, origin: &Path) -> Result<ModuleKind, ResolveError> {
        if paths::has_extension(file, "cjs") {
            return Ok(ModuleKind::CommonJs);
        }
        if paths::has_extension(file, "mjs") {
            return Ok(ModuleKind::Module);
        }
        if !self.is_dependency_path(origin)
            && self.is_dependency_path(file)
            && self.packages.get_package_of(file)?.kind() != ModuleKind::Module
        {
            return Ok(ModuleKind::CommonJs);
        }
        Ok(ModuleKind::Module)
    }
}
