//! Constants for file extensions, manifests and install directories.
//!
//! This module centralizes the names the resolver probes for, so that
//! resolution, barrel detection and file collection agree on them.
//!
//! ## Module System Extensions
//!
//! - `.mts` and `.mjs`: ES Module files (use `import`/`export`)
//! - `.cts` and `.cjs`: CommonJS files (use `require`/`module.exports`)

/// File extensions for JavaScript/TypeScript files that should be rewritten
pub const JS_TS_EXTENSIONS: &[&str] = &[
    "ts",  // TypeScript
    "tsx", // TypeScript with JSX
    "mts", // TypeScript module
    "cts", // TypeScript CommonJS
    "js",  // JavaScript
    "jsx", // JavaScript with JSX
    "mjs", // JavaScript module
    "cjs", // JavaScript CommonJS
];

/// Default extension search order. The empty entry probes the literal path first.
pub const DEFAULT_EXTENSIONS: &[&str] = &["", ".js", ".jsx", ".ts", ".tsx", ".mjs", ".cjs"];

/// Default directories dependencies are installed into
pub const DEFAULT_MODULES_DIRS: &[&str] = &["node_modules"];

/// File names that make a module a barrel candidate
pub const INDEX_FILES: &[&str] = &[
    "index.ts",
    "index.tsx",
    "index.mts",
    "index.cts",
    "index.js",
    "index.jsx",
    "index.mjs",
    "index.cjs",
];

pub const MANIFEST_FILE: &str = "package.json";

pub const TSCONFIG_FILE: &str = "tsconfig.json";

/// Node.js built-in modules, which never resolve to a file on disk
pub const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Returns true for `node:`-prefixed specifiers and bare built-in module names
/// (including subpaths such as `fs/promises`).
pub fn is_node_builtin(specifier: &str) -> bool {
    if specifier.starts_with("node:") {
        return true;
    }
    let head = specifier.split('/').next().unwrap_or(specifier);
    NODE_BUILTINS.contains(&head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_files_uses_all_extensions() {
        assert_eq!(INDEX_FILES.len(), JS_TS_EXTENSIONS.len());
        for ext in JS_TS_EXTENSIONS {
            let expected = format!("index.{}", ext);
            assert!(INDEX_FILES.contains(&expected.as_str()), "INDEX_FILES missing '{}'", expected);
        }
    }

    #[test]
    fn test_default_extensions_probe_literal_path_first() {
        assert_eq!(DEFAULT_EXTENSIONS[0], "");
        for ext in &DEFAULT_EXTENSIONS[1..] {
            assert!(ext.starts_with('.'), "extension '{}' should start with a dot", ext);
        }
    }

    #[test]
    fn test_is_node_builtin() {
        assert!(is_node_builtin("fs"));
        assert!(is_node_builtin("fs/promises"));
        assert!(is_node_builtin("node:path"));
        assert!(!is_node_builtin("react"));
        assert!(!is_node_builtin("./fs"));
        assert!(!is_node_builtin("@scope/fs"));
    }
}
