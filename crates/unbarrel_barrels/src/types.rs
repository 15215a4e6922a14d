use serde::Serialize;
use std::path::PathBuf;
use unbarrel_core::ResolvedPath;

use crate::{rewrite::StatementRewrite, specifier::Specifier};

/// The rewrites planned for one source file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRewrite {
    /// Path relative to the project root.
    pub file: String,
    pub rewrites: Vec<StatementRewrite>,
    pub written: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteReport {
    pub root: PathBuf,
    pub files: Vec<FileRewrite>,
    pub files_analyzed: usize,
    pub barrels_scanned: usize,
    pub cached_packages: usize,
}

impl RewriteReport {
    pub fn statements(&self) -> usize {
        self.files.iter().map(|f| f.rewrites.len()).sum()
    }

    /// Rewrites found but not written back.
    pub fn pending(&self) -> usize {
        self.files.iter().filter(|f| !f.written).map(|f| f.rewrites.len()).sum()
    }
}

/// What the graph knows about one specifier seen from one file.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub specifier: String,
    pub from: PathBuf,
    pub resolved: ResolvedPath,
    pub is_barrel: bool,
    pub names: Vec<(String, Option<Specifier>)>,
}
