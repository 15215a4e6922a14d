//! Alias-source adapters: turn tsconfig `paths` and workspace manifests into
//! `pattern -> destination` pairs for [`crate::ResolverConfig::append_alias`].

use anyhow::{Context, Result, anyhow};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use log::{debug, trace};
use serde_json::Value;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{
    constants::{DEFAULT_MODULES_DIRS, MANIFEST_FILE, TSCONFIG_FILE},
    packages::Manifest,
    paths,
};

pub fn find_git_root() -> Result<PathBuf> {
    find_git_root_from(&env::current_dir()?)
}

pub fn find_git_root_from(start: &Path) -> Result<PathBuf> {
    debug!("Searching for git root");
    trace!("Starting search from: {:?}", start);

    for dir in start.ancestors() {
        if dir.join(".git").exists() {
            debug!("Found git root at: {:?}", dir);
            return Ok(dir.to_path_buf());
        }
    }
    Err(anyhow!("Could not find .git directory in any parent folder"))
}

/// Pattern matching `key` exactly or followed by a subpath, capturing the rest.
fn prefix_pattern(key: &str) -> String {
    format!("^{}(/.*)?$", regex::escape(key))
}

fn tsconfig_files(root: &Path) -> Vec<PathBuf> {
    WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(|entry| {
            entry.file_name().to_str().is_none_or(|name| !DEFAULT_MODULES_DIRS.contains(&name))
        })
        .build()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() == TSCONFIG_FILE)
        .map(|e| e.path().to_path_buf())
        .collect()
}

/// Every `compilerOptions.paths` entry of every `tsconfig.json` under `root`,
/// as an anchored alias. Files are read as JSON5, so comments and trailing
/// commas are accepted. Only the first target of each entry is used.
pub fn read_tsconfig_aliases(root: &Path) -> Result<Vec<(String, String)>> {
    debug!("Reading tsconfig paths from root: {:?}", root);
    let mut aliases = Vec::new();

    for tsconfig_path in tsconfig_files(root) {
        let content = fs::read_to_string(&tsconfig_path)
            .with_context(|| format!("Failed to read {}", tsconfig_path.display()))?;
        let json: Value = match json5::from_str(&content) {
            Ok(json) => json,
            Err(e) => {
                debug!("Skipping unparseable {}: {}", tsconfig_path.display(), e);
                continue;
            }
        };
        let Some(compiler_options) = json.get("compilerOptions") else {
            continue;
        };
        let Some(paths_obj) = compiler_options.get("paths").and_then(Value::as_object) else {
            continue;
        };

        let base_url = compiler_options.get("baseUrl").and_then(Value::as_str).unwrap_or(".");
        let tsconfig_dir = tsconfig_path.parent().unwrap_or(root);
        let base_path = tsconfig_dir.join(base_url);

        for (alias, targets) in paths_obj {
            let Some(target) = targets.as_array().and_then(|t| t.first()).and_then(Value::as_str)
            else {
                continue;
            };
            let key = alias.trim_end_matches("/*");
            let destination = paths::normalize(&base_path.join(target.trim_end_matches("/*")));
            let destination = format!("{}${{1}}", destination.display());
            trace!("Found tsconfig path alias: '{}' -> {}", key, destination);
            aliases.push((prefix_pattern(key), destination));
        }
    }

    debug!("Loaded {} tsconfig path aliases", aliases.len());
    Ok(aliases)
}

fn workspace_globs(manifest: &Manifest) -> Vec<String> {
    let list = match &manifest.workspaces {
        Some(Value::Array(items)) => items.as_slice(),
        Some(Value::Object(obj)) => match obj.get("packages") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };
    list.iter().filter_map(Value::as_str).map(str::to_string).collect()
}

/// Workspace globs matched against root-relative directories.
struct WorkspaceMatcher {
    include: GlobSet,
    exclude: GlobSet,
}

impl WorkspaceMatcher {
    /// Builds the matcher; `!`-prefixed globs exclude. `None` when no glob
    /// includes anything.
    fn build(globs: &[String]) -> Result<Option<Self>> {
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();
        let mut included = 0;
        for raw in globs {
            let (negated, pattern) = match raw.trim().strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw.trim()),
            };
            let pattern = pattern.trim_start_matches("./").trim_end_matches('/');
            if pattern.is_empty() {
                continue;
            }
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .with_context(|| format!("Invalid workspace glob '{raw}'"))?;
            if negated {
                exclude.add(glob);
            } else {
                include.add(glob);
                included += 1;
            }
        }
        if included == 0 {
            return Ok(None);
        }
        Ok(Some(Self {
            include: include.build().context("Failed to build workspace globs")?,
            exclude: exclude.build().context("Failed to build workspace globs")?,
        }))
    }

    fn is_match(&self, relative: &str) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }
}

/// Every package matched by the root manifest's `workspaces` globs, as a
/// `name -> directory` alias.
pub fn read_workspace_aliases(root: &Path) -> Result<Vec<(String, String)>> {
    let manifest_path = root.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Ok(Vec::new());
    }
    let manifest = Manifest::read(&manifest_path)?;
    let Some(matcher) = WorkspaceMatcher::build(&workspace_globs(&manifest))? else {
        return Ok(Vec::new());
    };

    let mut aliases = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(|entry| {
            entry.file_name().to_str().is_none_or(|name| !DEFAULT_MODULES_DIRS.contains(&name))
        })
        .build();
    for entry in walker.filter_map(|e| e.ok()) {
        if entry.file_name() != MANIFEST_FILE {
            continue;
        }
        let Some(dir) = entry.path().parent() else {
            continue;
        };
        let Ok(relative) = dir.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if relative.is_empty() || !matcher.is_match(&relative) {
            continue;
        }
        let Some(name) = Manifest::read(entry.path())?.name else {
            continue;
        };
        trace!("Found workspace package '{}' at {}", name, dir.display());
        aliases.push((prefix_pattern(&name), format!("{}${{1}}", dir.display())));
    }

    debug!("Loaded {} workspace aliases", aliases.len());
    Ok(aliases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
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

    fn apply(aliases: &[(String, String)], specifier: &str) -> Option<String> {
        aliases.iter().find_map(|(pattern, dest)| {
            let re = Regex::new(pattern).unwrap();
            re.is_match(specifier).then(|| re.replace(specifier, dest.as_str()).into_owned())
        })
    }

    #[test]
    fn test_find_git_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        let subdir = root.join("src").join("components");
        fs::create_dir_all(&subdir).unwrap();

        assert_eq!(find_git_root_from(&subdir).unwrap(), root);
    }

    #[test]
    fn test_read_tsconfig_aliases_with_base_url() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(
            root,
            "tsconfig.json",
            r#"
{
  // comment
  "compilerOptions": {
    "baseUrl": "src", // Another comment
    "paths": {
      "@components/*": ["components/*"],
      "@utils": ["utils/index.ts"]
    }
  }
}
"#,
        );

        let aliases = read_tsconfig_aliases(root).unwrap();
        assert_eq!(aliases.len(), 2);
        let components = root.join("src/components");
        assert_eq!(
            apply(&aliases, "@components/Button"),
            Some(format!("{}/Button", components.display()))
        );
        assert_eq!(apply(&aliases, "@components"), Some(components.display().to_string()));
        assert_eq!(
            apply(&aliases, "@utils"),
            Some(root.join("src/utils/index.ts").display().to_string())
        );
        assert_eq!(apply(&aliases, "@componentsX"), None);
    }

    #[test]
    fn test_read_tsconfig_aliases_block_comments_and_trailing_commas() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(
            root,
            "tsconfig.json",
            r#"
{
  /* Shared settings
     for the app */
  "compilerOptions": {
    "baseUrl": ".",
    "paths": {
      "@lib/*": ["lib/*",],
    },
  },
}
"#,
        );

        let aliases = read_tsconfig_aliases(root).unwrap();
        assert_eq!(aliases.len(), 1);
        assert_eq!(
            apply(&aliases, "@lib/math"),
            Some(format!("{}/math", root.join("lib").display()))
        );
    }

    #[test]
    fn test_read_tsconfig_aliases_multiple_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(
            root,
            "tsconfig.json",
            r#"{"compilerOptions": {"paths": {"@root/*": ["src/*"]}}}"#,
        );
        create_test_file(
            root,
            "apps/web/tsconfig.json",
            r#"{"compilerOptions": {"paths": {"@app/*": ["app/*"]}}}"#,
        );
        create_test_file(
            root,
            "node_modules/dep/tsconfig.json",
            r#"{"compilerOptions": {"paths": {"@dep/*": ["x/*"]}}}"#,
        );

        let aliases = read_tsconfig_aliases(root).unwrap();
        assert_eq!(aliases.len(), 2);
        assert!(apply(&aliases, "@app/x").unwrap().ends_with("apps/web/app/x"));
    }

    #[test]
    fn test_read_tsconfig_aliases_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_tsconfig_aliases(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_read_workspace_aliases() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(root, "package.json", r#"{"name": "mono", "workspaces": ["packages/*"]}"#);
        create_test_file(root, "packages/ui/package.json", r#"{"name": "@mono/ui"}"#);
        create_test_file(root, "packages/ui/nested/package.json", r#"{"name": "nested"}"#);
        create_test_file(root, "tools/cli/package.json", r#"{"name": "cli"}"#);

        let aliases = read_workspace_aliases(root).unwrap();
        assert_eq!(aliases.len(), 1);
        assert_eq!(
            apply(&aliases, "@mono/ui/Button"),
            Some(format!("{}/Button", root.join("packages/ui").display()))
        );
    }

    #[test]
    fn test_read_workspace_aliases_object_form() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(
            root,
            "package.json",
            r#"{"workspaces": {"packages": ["libs/**"]}}"#,
        );
        create_test_file(root, "libs/a/b/package.json", r#"{"name": "b"}"#);

        let aliases = read_workspace_aliases(root).unwrap();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].0, "^b(/.*)?$");
    }

    #[test]
    fn test_workspace_matcher() {
        let globs = |items: &[&str]| items.iter().map(|g| g.to_string()).collect::<Vec<_>>();

        let matcher = WorkspaceMatcher::build(&globs(&["./packages/*/"])).unwrap().unwrap();
        assert!(matcher.is_match("packages/ui"));
        assert!(!matcher.is_match("packages/ui/nested"));

        let matcher = WorkspaceMatcher::build(&globs(&["libs/**"])).unwrap().unwrap();
        assert!(matcher.is_match("libs/a/b"));

        let matcher = WorkspaceMatcher::build(&globs(&["{apps,tools}/*"])).unwrap().unwrap();
        assert!(matcher.is_match("apps/web"));
        assert!(matcher.is_match("tools/cli"));
        assert!(!matcher.is_match("packages/ui"));

        let matcher =
            WorkspaceMatcher::build(&globs(&["packages/*", "!packages/legacy"])).unwrap().unwrap();
        assert!(matcher.is_match("packages/ui"));
        assert!(!matcher.is_match("packages/legacy"));

        assert!(WorkspaceMatcher::build(&globs(&["!packages/x"])).unwrap().is_none());
    }

    #[test]
    fn test_read_workspace_aliases_braces_and_negation() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(
            root,
            "package.json",
            r#"{"workspaces": ["{apps,packages}/*", "!packages/legacy"]}"#,
        );
        create_test_file(root, "apps/web/package.json", r#"{"name": "web"}"#);
        create_test_file(root, "packages/ui/package.json", r#"{"name": "ui"}"#);
        create_test_file(root, "packages/legacy/package.json", r#"{"name": "legacy"}"#);

        let mut names: Vec<String> =
            read_workspace_aliases(root).unwrap().into_iter().map(|(pattern, _)| pattern).collect();
        names.sort();
        assert_eq!(names, vec!["^ui(/.*)?$".to_string(), "^web(/.*)?$".to_string()]);
    }
}
