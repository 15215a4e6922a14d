use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The module-loading format a file or package targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    #[default]
    CommonJs,
    Module,
}

impl ModuleKind {
    /// Interprets a manifest `type` field; anything but `"module"` is CommonJS.
    pub fn from_manifest_type(value: Option<&str>) -> Self {
        match value {
            Some("module") => ModuleKind::Module,
            _ => ModuleKind::CommonJs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ResolvedFiles {
    Esm(PathBuf),
    Cjs(PathBuf),
    Dual { esm: PathBuf, cjs: PathBuf },
}

/// The on-disk module(s) a specifier resolved to.
///
/// At least one of the ESM and CommonJS files is always present. Both are
/// present only for dual packages, in which case the caller picks one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    original_path: String,
    files: ResolvedFiles,
    /// The ESM file dropped when a dual result was narrowed to CommonJS.
    narrowed_esm: Option<PathBuf>,
    used_manifest_exports_field: bool,
}

impl ResolvedPath {
    pub fn single(original_path: impl Into<String>, file: PathBuf, kind: ModuleKind) -> Self {
        let files = match kind {
            ModuleKind::Module => ResolvedFiles::Esm(file),
            ModuleKind::CommonJs => ResolvedFiles::Cjs(file),
        };
        Self {
            original_path: original_path.into(),
            files,
            narrowed_esm: None,
            used_manifest_exports_field: false,
        }
    }

    /// Builds a result from optional entries; `None` when neither is present.
    pub fn from_entries(
        original_path: impl Into<String>,
        esm: Option<PathBuf>,
        cjs: Option<PathBuf>,
    ) -> Option<Self> {
        let files = match (esm, cjs) {
            (Some(esm), Some(cjs)) => ResolvedFiles::Dual { esm, cjs },
            (Some(esm), None) => ResolvedFiles::Esm(esm),
            (None, Some(cjs)) => ResolvedFiles::Cjs(cjs),
            (None, None) => return None,
        };
        Some(Self {
            original_path: original_path.into(),
            files,
            narrowed_esm: None,
            used_manifest_exports_field: false,
        })
    }

    pub(crate) fn with_exports_field(mut self) -> Self {
        self.used_manifest_exports_field = true;
        self
    }

    /// Keeps only the file matching `context` when both are present. The
    /// ESM side of a CommonJS narrowing is kept as the barrel source.
    pub(crate) fn narrowed_to(self, context: Option<ModuleKind>) -> Self {
        let (files, narrowed_esm) = match (self.files, context) {
            (ResolvedFiles::Dual { esm, .. }, Some(ModuleKind::Module)) => {
                (ResolvedFiles::Esm(esm), self.narrowed_esm)
            }
            (ResolvedFiles::Dual { esm, cjs }, Some(ModuleKind::CommonJs)) => {
                (ResolvedFiles::Cjs(cjs), Some(esm))
            }
            (files, _) => (files, self.narrowed_esm),
        };
        Self { files, narrowed_esm, ..self }
    }

    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    pub fn abs_esm_file(&self) -> Option<&Path> {
        match &self.files {
            ResolvedFiles::Esm(esm) | ResolvedFiles::Dual { esm, .. } => Some(esm),
            ResolvedFiles::Cjs(_) => None,
        }
    }

    pub fn abs_cjs_file(&self) -> Option<&Path> {
        match &self.files {
            ResolvedFiles::Cjs(cjs) | ResolvedFiles::Dual { cjs, .. } => Some(cjs),
            ResolvedFiles::Esm(_) => None,
        }
    }

    /// True when the result came from a conditional `exports` entry; such
    /// results are a resolution boundary and must not be treated as barrels.
    pub fn used_manifest_exports_field(&self) -> bool {
        self.used_manifest_exports_field
    }

    pub fn is_dual(&self) -> bool {
        matches!(self.files, ResolvedFiles::Dual { .. })
    }

    /// The file to scan for re-exports: the ESM file when present.
    pub fn primary_file(&self) -> &Path {
        match &self.files {
            ResolvedFiles::Esm(file) | ResolvedFiles::Cjs(file) => file,
            ResolvedFiles::Dual { esm, .. } => esm,
        }
    }

    /// The file to read re-exports from. A CommonJS-narrowed dual result
    /// still answers with its ESM file, since compiled CommonJS barrels are
    /// not statically analyzable.
    pub fn barrel_source(&self) -> &Path {
        self.narrowed_esm.as_deref().unwrap_or_else(|| self.primary_file())
    }

    /// The file a consumer of the given kind should load.
    pub fn file_for(&self, kind: ModuleKind) -> &Path {
        match (&self.files, kind) {
            (ResolvedFiles::Dual { cjs, .. }, ModuleKind::CommonJs) => cjs,
            _ => self.primary_file(),
        }
    }
}
