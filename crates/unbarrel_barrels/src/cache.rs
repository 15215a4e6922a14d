//! Cross-run persistence of dependency barrel mappings, stamped by version.

use anyhow::{Context, Result};
use dashmap::DashMap;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    process,
};
use unbarrel_core::Package;

use crate::barrel::BarrelFile;

const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub package_name: String,
    pub package_version: String,
    pub barrel_files: BTreeMap<PathBuf, BarrelFile>,
}

#[derive(Debug)]
pub struct SpecifierCache {
    dir: PathBuf,
    metadata: DashMap<String, String>,
}

fn entry_file_name(package_name: &str) -> String {
    format!("{}.json", package_name.replace('/', "+"))
}

fn read_metadata(path: &Path) -> Result<BTreeMap<String, String>> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse cache metadata {}", path.display())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to read cache metadata {}", path.display()))
        }
    }
}

/// Writes through a sibling temporary file so readers never see a partial file.
fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension(format!("json.{}.tmp", process::id()));
    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

impl SpecifierCache {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let metadata = DashMap::new();
        for (name, version) in read_metadata(&dir.join(METADATA_FILE))? {
            metadata.insert(name, version);
        }
        debug!("Opened specifier cache at {} ({} packages)", dir.display(), metadata.len());
        Ok(Self { dir, metadata })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The cached mapping of `package`, if it was stamped with the installed version.
    pub fn load(&self, package: &Package) -> Option<CacheEntry> {
        let version = package.version()?;
        let stamped = self.metadata.get(package.name()).map(|v| v.value().clone())?;
        if stamped != version {
            debug!(
                "Cache for {} is stale (cached {}, installed {})",
                package.name(),
                stamped,
                version
            );
            return None;
        }

        let path = self.dir.join(entry_file_name(package.name()));
        let entry = fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<CacheEntry>(&text).ok());
        match entry {
            Some(entry) if entry.package_version == version => {
                debug!(
                    "Restored {} barrel files of {}@{} from cache",
                    entry.barrel_files.len(),
                    package.name(),
                    version
                );
                Some(entry)
            }
            _ => {
                debug!("Cache file for {} is missing or unreadable", package.name());
                None
            }
        }
    }

    /// Persists `barrel_files` for `package`. Packages without a version are
    /// skipped; returns whether anything was written.
    pub fn store(
        &self,
        package: &Package,
        barrel_files: BTreeMap<PathBuf, BarrelFile>,
    ) -> Result<bool> {
        let Some(version) = package.version() else {
            trace!("Not caching {}: no version", package.name());
            return Ok(false);
        };
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir {}", self.dir.display()))?;

        let entry = CacheEntry {
            package_name: package.name().to_string(),
            package_version: version.to_string(),
            barrel_files,
        };
        let path = self.dir.join(entry_file_name(package.name()));
        write_atomically(&path, &serde_json::to_string_pretty(&entry)?)?;

        let metadata_path = self.dir.join(METADATA_FILE);
        let mut metadata = read_metadata(&metadata_path)?;
        metadata.insert(entry.package_name.clone(), entry.package_version.clone());
        write_atomically(&metadata_path, &serde_json::to_string_pretty(&metadata)?)?;
        self.metadata.insert(entry.package_name, entry.package_version);

        debug!("Cached {}@{} at {}", package.name(), version, path.display());
        Ok(true)
    }
}
