//! Pure path and specifier predicates shared by every other module.

use path_clean::clean;
use std::path::{Component, Path, PathBuf};

use crate::constants::INDEX_FILES;

/// Returns true when `specifier` is a relative, absolute or drive-letter path
/// rather than a bare package name or alias.
pub fn is_regular_path(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with(".\\")
        || specifier.starts_with("..\\")
        || specifier.starts_with('/')
        || is_drive_path(specifier)
}

fn is_drive_path(specifier: &str) -> bool {
    let bytes = specifier.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

/// Returns true when any component of `path` is one of the install directories.
pub fn is_dependency_path(path: &Path, install_dirs: &[String]) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => install_dirs.iter().any(|dir| name == dir.as_str()),
        _ => false,
    })
}

/// Lexically cleans `path` (`.` and `..` segments, duplicate separators).
pub fn normalize(path: &Path) -> PathBuf {
    clean(path)
}

pub fn is_barrel_filename(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).is_some_and(|name| INDEX_FILES.contains(&name))
}

/// Case-insensitive extension check; `ext` is given without the dot.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Splits a bare specifier into its package name and the remaining subpath.
///
/// `@scope/name/sub/file` becomes `("@scope/name", "/sub/file")` and
/// `lodash` becomes `("lodash", "")`.
pub fn split_package_specifier(specifier: &str) -> (&str, &str) {
    let segments = if specifier.starts_with('@') { 2 } else { 1 };
    let mut end = 0;
    for (seen, (idx, _)) in specifier.match_indices('/').enumerate() {
        if seen + 1 == segments {
            end = idx;
            break;
        }
    }
    if end == 0 { (specifier, "") } else { specifier.split_at(end) }
}

/// Components after the last install directory in `path`, if any.
fn components_after_install_dir<'p>(
    path: &'p Path,
    install_dirs: &[String],
) -> Option<Vec<&'p str>> {
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .collect();
    let last = parts.iter().rposition(|part| install_dirs.iter().any(|dir| dir == part))?;
    Some(parts[last + 1..].to_vec())
}

/// Name of the installed package that owns `path` (`@scope/name` or `name`).
pub fn dependency_name(path: &Path, install_dirs: &[String]) -> Option<String> {
    let rest = components_after_install_dir(path, install_dirs)?;
    match rest.as_slice() {
        [scope, name, ..] if scope.starts_with('@') => Some(format!("{scope}/{name}")),
        [name, ..] => Some((*name).to_string()),
        [] => None,
    }
}

/// The specifier a rewritten import should use for `path`: installed files
/// become bare `pkg/sub/file.js` specifiers, first-party files keep their
/// absolute path.
pub fn module_specifier(path: &Path, install_dirs: &[String]) -> String {
    match components_after_install_dir(path, install_dirs) {
        Some(rest) if !rest.is_empty() => rest.join("/"),
        _ => path.to_string_lossy().to_string(),
    }
}
