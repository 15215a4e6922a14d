use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Snapshot of the resolver configuration, attached to resolution failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverState {
    pub aliases: Vec<(String, String)>,
    pub extensions: Vec<String>,
    pub modules_dirs: Vec<String>,
}

impl fmt::Display for ResolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let aliases: Vec<String> =
            self.aliases.iter().map(|(pattern, dest)| format!("{pattern} -> {dest}")).collect();
        write!(
            f,
            "aliases: [{}], extensions: {:?}, install directories: {:?}",
            aliases.join(", "),
            self.extensions,
            self.modules_dirs
        )
    }
}

/// Errors raised while resolving specifiers or reading the modules they name.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Cannot resolve '{specifier}' from {} ({state})", origin.display())]
    NotFound { specifier: String, origin: PathBuf, state: ResolverState },

    #[error("Failed to read manifest {}: {source}", path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse manifest {}: {source}", path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read module {}: {source}", path.display())]
    ModuleRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
