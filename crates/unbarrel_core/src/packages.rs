//! Package manifest discovery and memoization.

use dashmap::DashMap;
use log::{debug, trace};
use serde::Deserialize;
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    constants::{DEFAULT_EXTENSIONS, MANIFEST_FILE},
    error::ResolveError,
    paths,
    types::ModuleKind,
};

/// The subset of `package.json` the resolver reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub module_type: Option<String>,
    pub main: Option<String>,
    pub module: Option<String>,
    pub exports: Option<Value>,
    pub workspaces: Option<Value>,
}

impl Manifest {
    pub fn read(path: &Path) -> Result<Self, ResolveError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ResolveError::ManifestRead { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text)
            .map_err(|source| ResolveError::ManifestParse { path: path.to_path_buf(), source })
    }
}

/// A conditional `exports` entry that declares both `require` and `import`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportsMatch {
    pub require: PathBuf,
    pub import: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Package {
    root_dir: PathBuf,
    name: String,
    manifest: Manifest,
    is_dependency: bool,
}

impl Package {
    fn load(root_dir: &Path, install_dirs: &[String]) -> Result<Self, ResolveError> {
        let mut manifest = Manifest::read(&root_dir.join(MANIFEST_FILE))?;
        normalize_main_field(&mut manifest, root_dir);
        normalize_exports_field(&mut manifest);
        let is_dependency = paths::is_dependency_path(root_dir, install_dirs);
        let name = if is_dependency {
            paths::dependency_name(&root_dir.join(MANIFEST_FILE), install_dirs)
                .or_else(|| manifest.name.clone())
                .unwrap_or_else(|| ".".to_string())
        } else {
            manifest.name.clone().unwrap_or_else(|| ".".to_string())
        };
        Ok(Self { root_dir: root_dir.to_path_buf(), name, manifest, is_dependency })
    }

    fn synthetic(root_dir: &Path) -> Self {
        Self {
            root_dir: root_dir.to_path_buf(),
            name: ".".to_string(),
            manifest: Manifest::default(),
            is_dependency: false,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest.version.as_deref()
    }

    pub fn is_dependency(&self) -> bool {
        self.is_dependency
    }

    pub fn kind(&self) -> ModuleKind {
        ModuleKind::from_manifest_type(self.manifest.module_type.as_deref())
    }

    /// The kind only when the manifest states it explicitly.
    pub fn declared_kind(&self) -> Option<ModuleKind> {
        self.manifest.module_type.as_deref().map(|t| ModuleKind::from_manifest_type(Some(t)))
    }

    /// `main` when the package is CommonJS.
    pub fn cjs_main(&self) -> Option<&str> {
        match self.kind() {
            ModuleKind::CommonJs => self.manifest.main.as_deref(),
            ModuleKind::Module => None,
        }
    }

    /// `main` for ESM packages, `module` otherwise.
    pub fn esm_main(&self) -> Option<&str> {
        match self.kind() {
            ModuleKind::Module => self.manifest.main.as_deref(),
            ModuleKind::CommonJs => self.manifest.module.as_deref(),
        }
    }

    fn cjs_entry(&self) -> Option<PathBuf> {
        self.cjs_main().map(|main| paths::normalize(&self.root_dir.join(main)))
    }

    fn esm_entry(&self) -> Option<PathBuf> {
        self.manifest.module.as_deref().map(|module| paths::normalize(&self.root_dir.join(module)))
    }

    /// Maps a file in the ESM output folder onto its CommonJS counterpart,
    /// swapping both the folder and the extension declared by `main`.
    pub fn convert_esm_sibling_to_cjs(&self, esm_path: &Path) -> Option<PathBuf> {
        let cjs_entry = self.cjs_entry()?;
        let esm_entry = self.esm_entry()?;
        let esm_folder = esm_entry.parent()?;
        let cjs_folder = cjs_entry.parent()?;
        let relative = esm_path.strip_prefix(esm_folder).ok()?;
        let mut converted = cjs_folder.join(relative);
        if let Some(ext) = cjs_entry.extension() {
            converted.set_extension(ext);
        }
        trace!("Converted ESM path {} to {}", esm_path.display(), converted.display());
        Some(converted)
    }

    /// Finds the `exports` entry for `subpath` (`"."` or `"./sub"`) that
    /// declares both a `require` and an `import` condition.
    pub fn match_exports(&self, subpath: &str) -> Option<ExportsMatch> {
        let exports = self.manifest.exports.as_ref()?.as_object()?;
        let wanted = paths::normalize(Path::new(subpath));
        for (key, value) in exports {
            if paths::normalize(Path::new(key)) != wanted {
                continue;
            }
            let Some(conditions) = value.as_object() else {
                continue;
            };
            let require = conditions.get("require").and_then(condition_target);
            let import = conditions.get("import").and_then(condition_target);
            if let (Some(require), Some(import)) = (require, import) {
                trace!("Matched exports entry '{}' in {}", key, self.name);
                return Some(ExportsMatch {
                    require: paths::normalize(&self.root_dir.join(require)),
                    import: paths::normalize(&self.root_dir.join(import)),
                });
            }
        }
        None
    }
}

fn condition_target(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(obj) => obj.get("default").and_then(condition_target),
        _ => None,
    }
}

/// An extension-less `main` is rewritten to the concrete file it names.
fn normalize_main_field(manifest: &mut Manifest, root_dir: &Path) {
    let Some(main) = manifest.main.as_deref() else {
        return;
    };
    if Path::new(main).extension().is_some() {
        return;
    }
    let base = paths::normalize(&root_dir.join(main));
    let candidates = DEFAULT_EXTENSIONS
        .iter()
        .map(|ext| PathBuf::from(format!("{}{}", base.display(), ext)))
        .chain(DEFAULT_EXTENSIONS.iter().map(|ext| base.join(format!("index{ext}"))));
    for candidate in candidates {
        if candidate.is_file()
            && let Ok(relative) = candidate.strip_prefix(root_dir)
        {
            let normalized = format!("./{}", relative.to_string_lossy());
            trace!("Normalized main field '{}' to '{}'", main, normalized);
            manifest.main = Some(normalized);
            return;
        }
    }
}

/// A conditions-only `exports` object is the entry for `"."`.
fn normalize_exports_field(manifest: &mut Manifest) {
    let Some(Value::Object(obj)) = &manifest.exports else {
        return;
    };
    if obj.is_empty() || obj.keys().any(|key| key.starts_with('.')) {
        return;
    }
    let conditions = Value::Object(obj.clone());
    let mut wrapped = serde_json::Map::new();
    wrapped.insert(".".to_string(), conditions);
    manifest.exports = Some(Value::Object(wrapped));
}

/// Locates and memoizes the manifest governing each module.
#[derive(Debug)]
pub struct PackageRegistry {
    project_root: PathBuf,
    install_dirs: Vec<String>,
    packages: DashMap<PathBuf, Arc<Package>>,
    governing_roots: DashMap<PathBuf, PathBuf>,
}

impl PackageRegistry {
    pub fn new(project_root: impl Into<PathBuf>, install_dirs: Vec<String>) -> Self {
        Self {
            project_root: project_root.into(),
            install_dirs,
            packages: DashMap::new(),
            governing_roots: DashMap::new(),
        }
    }

    pub fn install_dirs(&self) -> &[String] {
        &self.install_dirs
    }

    pub fn is_dependency_path(&self, path: &Path) -> bool {
        paths::is_dependency_path(path, &self.install_dirs)
    }

    /// The package whose manifest sits exactly in `dir`, if there is one.
    pub fn manifest_at(&self, dir: &Path) -> Result<Option<Arc<Package>>, ResolveError> {
        if let Some(hit) = self.packages.get(dir) {
            return Ok(Some(Arc::clone(hit.value())));
        }
        if !dir.join(MANIFEST_FILE).is_file() {
            return Ok(None);
        }
        self.load(dir).map(Some)
    }

    /// The package governing `module_path`.
    ///
    /// Dependencies are governed by the outermost manifest below their
    /// install directory, so nested `package.json` files inside a published
    /// package never split it. First-party files use the nearest ancestor
    /// manifest, falling back to a synthetic package at the project root.
    pub fn get_package_of(&self, module_path: &Path) -> Result<Arc<Package>, ResolveError> {
        let start = module_path.parent().unwrap_or(module_path).to_path_buf();
        if let Some(root) = self.governing_roots.get(&start).map(|r| r.value().clone()) {
            if let Some(hit) = self.packages.get(&root) {
                return Ok(Arc::clone(hit.value()));
            }
            if root == self.project_root && !root.join(MANIFEST_FILE).is_file() {
                return Ok(self.synthetic_root());
            }
        }

        let root = if self.is_dependency_path(&start) {
            self.highest_dependency_manifest_dir(&start)
        } else {
            self.nearest_manifest_dir(&start)
        };

        let package = match root {
            Some(root) => self.load(&root)?,
            None => {
                trace!("No manifest governs {}, using project root", module_path.display());
                self.synthetic_root()
            }
        };
        self.governing_roots.insert(start, package.root_dir().to_path_buf());
        Ok(package)
    }

    /// See [`Package::convert_esm_sibling_to_cjs`].
    pub fn convert_esm_sibling_to_cjs(
        &self,
        esm_path: &Path,
    ) -> Result<Option<PathBuf>, ResolveError> {
        let package = self.get_package_of(esm_path)?;
        Ok(package.convert_esm_sibling_to_cjs(esm_path))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn load(&self, root: &Path) -> Result<Arc<Package>, ResolveError> {
        if let Some(hit) = self.packages.get(root) {
            return Ok(Arc::clone(hit.value()));
        }
        let package = Arc::new(Package::load(root, &self.install_dirs)?);
        debug!(
            "Loaded package '{}' ({:?}) from {}",
            package.name(),
            package.kind(),
            root.display()
        );
        self.packages.insert(root.to_path_buf(), Arc::clone(&package));
        Ok(package)
    }

    fn synthetic_root(&self) -> Arc<Package> {
        let entry = self
            .packages
            .entry(self.project_root.clone())
            .or_insert_with(|| Arc::new(Package::synthetic(&self.project_root)));
        Arc::clone(entry.value())
    }

    fn nearest_manifest_dir(&self, start: &Path) -> Option<PathBuf> {
        let bounded = start.starts_with(&self.project_root);
        start
            .ancestors()
            .take_while(|dir| !bounded || dir.starts_with(&self.project_root))
            .find(|dir| dir.join(MANIFEST_FILE).is_file())
            .map(Path::to_path_buf)
    }

    fn highest_dependency_manifest_dir(&self, start: &Path) -> Option<PathBuf> {
        let mut highest = None;
        for dir in start.ancestors() {
            let is_install_dir = dir
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| self.install_dirs.iter().any(|d| d == name));
            if is_install_dir {
                break;
            }
            if dir.join(MANIFEST_FILE).is_file() {
                highest = Some(dir.to_path_buf());
            }
        }
        highest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, path: &str, content: &str) -> PathBuf {
        let file_path = dir.join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    fn registry(root: &Path) -> PackageRegistry {
        PackageRegistry::new(root, vec!["node_modules".to_string()])
    }

    #[test]
    fn test_dependency_uses_outermost_manifest_below_install_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(root, "package.json", r#"{"name": "app"}"#);
        create_test_file(
            root,
            "node_modules/ui/package.json",
            r#"{"name": "ui", "version": "1.0.0", "module": "./esm/index.js"}"#,
        );
        create_test_file(root, "node_modules/ui/esm/package.json", r#"{"type": "module"}"#);
        let file = create_test_file(root, "node_modules/ui/esm/button/index.js", "");

        let registry = registry(root);
        let package = registry.get_package_of(&file).unwrap();
        assert_eq!(package.root_dir(), root.join("node_modules/ui"));
        assert_eq!(package.name(), "ui");
        assert_eq!(package.version(), Some("1.0.0"));
        assert!(package.is_dependency());
    }

    #[test]
    fn test_scoped_dependency_name() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(root, "node_modules/@mui/material/package.json", r#"{"name": "x"}"#);
        let file = create_test_file(root, "node_modules/@mui/material/index.js", "");

        let package = registry(root).get_package_of(&file).unwrap();
        assert_eq!(package.name(), "@mui/material");
    }

    #[test]
    fn test_first_party_uses_nearest_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(root, "package.json", r#"{"name": "app"}"#);
        create_test_file(root, "packages/lib/package.json", r#"{"name": "lib", "type": "module"}"#);
        let file = create_test_file(root, "packages/lib/src/index.js", "");

        let package = registry(root).get_package_of(&file).unwrap();
        assert_eq!(package.name(), "lib");
        assert_eq!(package.kind(), ModuleKind::Module);
        assert!(!package.is_dependency());
    }

    #[test]
    fn test_first_party_without_manifest_uses_project_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let file = create_test_file(root, "src/index.js", "");

        let registry = registry(root);
        let package = registry.get_package_of(&file).unwrap();
        assert_eq!(package.name(), ".");
        assert_eq!(package.root_dir(), root);
        assert_eq!(package.kind(), ModuleKind::CommonJs);
        let again = registry.get_package_of(&file).unwrap();
        assert!(Arc::ptr_eq(&package, &again));
    }

    #[test]
    fn test_manifest_is_read_once_per_package() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let manifest = create_test_file(root, "node_modules/ui/package.json", r#"{"name": "ui"}"#);
        let a = create_test_file(root, "node_modules/ui/a/index.js", "");
        let b = create_test_file(root, "node_modules/ui/b/index.js", "");

        let registry = registry(root);
        let first = registry.get_package_of(&a).unwrap();
        fs::write(&manifest, "not json").unwrap();
        let second = registry.get_package_of(&b).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(root, "node_modules/bad/package.json", "{ nope");
        let file = create_test_file(root, "node_modules/bad/index.js", "");

        let err = registry(root).get_package_of(&file).unwrap_err();
        assert!(matches!(err, ResolveError::ManifestParse { .. }));
    }

    #[test]
    fn test_entries_follow_declared_kind() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(root, "cjs/package.json", r#"{"main": "./main.js", "module": "./m.js"}"#);
        create_test_file(root, "esm/package.json", r#"{"type": "module", "main": "./main.js"}"#);

        let registry = registry(root);
        let cjs = registry.manifest_at(&root.join("cjs")).unwrap().unwrap();
        assert_eq!(cjs.cjs_main(), Some("./main.js"));
        assert_eq!(cjs.esm_main(), Some("./m.js"));

        let esm = registry.manifest_at(&root.join("esm")).unwrap().unwrap();
        assert_eq!(esm.cjs_main(), None);
        assert_eq!(esm.esm_main(), Some("./main.js"));

        assert!(registry.manifest_at(&root.join("missing")).unwrap().is_none());
    }

    #[test]
    fn test_extensionless_main_is_normalized() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(root, "node_modules/lib/package.json", r#"{"main": "lib/index"}"#);
        create_test_file(root, "node_modules/lib/lib/index.js", "");

        let package =
            registry(root).manifest_at(&root.join("node_modules/lib")).unwrap().unwrap();
        assert_eq!(package.manifest().main.as_deref(), Some("./lib/index.js"));
    }

    #[test]
    fn test_convert_esm_sibling_to_cjs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(
            root,
            "node_modules/ui/package.json",
            r#"{"main": "./cjs/index.cjs", "module": "./esm/index.js"}"#,
        );
        let esm = create_test_file(root, "node_modules/ui/esm/button/Button.js", "");

        let registry = registry(root);
        let converted = registry.convert_esm_sibling_to_cjs(&esm).unwrap();
        assert_eq!(converted, Some(root.join("node_modules/ui/cjs/button/Button.cjs")));

        let outside = root.join("node_modules/ui/other/Button.js");
        assert_eq!(registry.convert_esm_sibling_to_cjs(&outside).unwrap(), None);
    }

    #[test]
    fn test_match_exports_requires_both_conditions() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(
            root,
            "node_modules/dual/package.json",
            r#"{
                "exports": {
                    ".": { "require": "./cjs/index.js", "import": { "default": "./esm/index.js" } },
                    "./only-import": { "import": "./esm/only.js" },
                    "./feature": { "require": { "default": "./cjs/f.js" }, "import": "./esm/f.js" }
                }
            }"#,
        );

        let package =
            registry(root).manifest_at(&root.join("node_modules/dual")).unwrap().unwrap();
        let dot = package.match_exports(".").unwrap();
        assert_eq!(dot.require, root.join("node_modules/dual/cjs/index.js"));
        assert_eq!(dot.import, root.join("node_modules/dual/esm/index.js"));
        assert!(package.match_exports("./only-import").is_none());
        assert!(package.match_exports("./feature").is_some());
        assert!(package.match_exports("./missing").is_none());
    }

    #[test]
    fn test_conditions_only_exports_apply_to_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(
            root,
            "node_modules/cond/package.json",
            r#"{"exports": {"require": "./index.cjs", "import": "./index.mjs"}}"#,
        );

        let package =
            registry(root).manifest_at(&root.join("node_modules/cond")).unwrap().unwrap();
        let matched = package.match_exports(".").unwrap();
        assert_eq!(matched.import, root.join("node_modules/cond/index.mjs"));
    }
}
