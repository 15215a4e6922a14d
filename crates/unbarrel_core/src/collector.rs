use anyhow::Result;
use ignore::WalkBuilder;
use log::{debug, trace};
use std::path::PathBuf;

use crate::constants::JS_TS_EXTENSIONS;

pub struct CollectorConfig {
    pub root: PathBuf,
    /// Substring the root-relative path must contain; also admits test files.
    pub entry_glob: Option<String>,
    pub modules_dirs: Vec<String>,
}

/// Source files a project pass should rewrite.
pub fn collect_entries(cfg: &CollectorConfig) -> Result<Vec<PathBuf>> {
    debug!("Collecting source files");
    let mut files: Vec<PathBuf> = Vec::new();
    let root = &cfg.root;
    debug!("Walking directory tree from root: {}", root.display());
    let modules_dirs = cfg.modules_dirs.clone();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(true)
        .git_ignore(true)
        .filter_entry(move |entry| {
            entry.file_name().to_str().is_none_or(|name| !modules_dirs.iter().any(|d| d == name))
        })
        .build();

    for res in walker {
        let dent = res?;
        let p = dent.path();
        if !p.is_file() {
            continue;
        }

        let Some(ext) = p.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !JS_TS_EXTENSIONS.contains(&ext) {
            continue;
        }

        let rel_str = p.strip_prefix(root).unwrap_or(p).to_string_lossy().to_string();
        match &cfg.entry_glob {
            Some(gl) => {
                if rel_str.contains(gl.as_str()) {
                    trace!("Matched source file with glob '{}': {}", gl, rel_str);
                    files.push(p.to_path_buf());
                }
            }
            None => {
                if rel_str.contains(".test.") || rel_str.contains(".spec.") {
                    trace!("Skipping test file: {}", rel_str);
                    continue;
                }
                if rel_str.ends_with(".d.ts") {
                    continue;
                }
                files.push(p.to_path_buf());
            }
        }
    }
    files.sort();
    debug!("Collected {} source files", files.len());
    Ok(files)
}
