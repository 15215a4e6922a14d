//! Plans and applies direct-import rewrites for one consumer file.

use log::{debug, trace, warn};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxc_span::{GetSpan, SourceType};
use serde::Serialize;
use std::{
    path::{Component, Path},
    sync::Arc,
};
use unbarrel_core::{ModuleKind, is_node_builtin, paths};

use crate::{
    barrel::{BarrelFile, BarrelGraph},
    specifier::{Specifier, SpecifierKind},
};

#[derive(Debug, Clone, Copy)]
pub struct RewriteOptions {
    /// Module format of consumers whose extension does not decide it.
    pub consumer_kind: ModuleKind,
}

/// One binding of a rewritten statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectBinding {
    pub module_specifier: String,
    pub binding_name: String,
    /// Local name for imports, exported name for re-exports.
    pub alias: String,
    pub kind: SpecifierKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRewrite {
    pub start: usize,
    pub end: usize,
    pub original: String,
    pub replacement: String,
    pub bindings: Vec<DirectBinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementShape {
    Import,
    ReExport,
}

fn source_type_for(path: &Path) -> SourceType {
    let ext = path.extension().and_then(|e| e.to_str());

    SourceType::default()
        .with_module(true)
        .with_jsx(matches!(ext, Some("tsx") | Some("jsx") | Some("js")))
        .with_typescript(matches!(ext, Some("ts") | Some("tsx") | Some("mts") | Some("cts")))
}

fn consumer_kind(file: &Path, options: &RewriteOptions) -> ModuleKind {
    if paths::has_extension(file, "cjs") || paths::has_extension(file, "cts") {
        ModuleKind::CommonJs
    } else if paths::has_extension(file, "mjs") || paths::has_extension(file, "mts") {
        ModuleKind::Module
    } else {
        options.consumer_kind
    }
}

/// Relative `./`-prefixed specifier from `from_dir` to `target`.
fn relative_specifier(from_dir: &Path, target: &Path) -> String {
    let from: Vec<Component> = from_dir.components().collect();
    let to: Vec<Component> = target.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(to[common..].iter().map(|c| c.as_os_str().to_string_lossy().to_string()));
    let joined = parts.join("/");
    if joined.starts_with("..") { joined } else { format!("./{joined}") }
}

fn render_import(binding: &DirectBinding, module: &str) -> String {
    match binding.kind {
        SpecifierKind::Default => format!("import {} from {};", binding.alias, module),
        SpecifierKind::Namespace => format!("import * as {} from {};", binding.alias, module),
        SpecifierKind::Named if binding.binding_name == binding.alias => {
            format!("import {{ {} }} from {};", binding.alias, module)
        }
        SpecifierKind::Named => {
            format!("import {{ {} as {} }} from {};", binding.binding_name, binding.alias, module)
        }
    }
}

fn render_reexport(binding: &DirectBinding, module: &str) -> String {
    match binding.kind {
        SpecifierKind::Namespace => format!("export * as {} from {};", binding.alias, module),
        _ if binding.binding_name == binding.alias => {
            format!("export {{ {} }} from {};", binding.alias, module)
        }
        _ => format!("export {{ {} as {} }} from {};", binding.binding_name, binding.alias, module),
    }
}

struct Planner<'a> {
    graph: &'a BarrelGraph,
    file: &'a Path,
    kind: ModuleKind,
}

impl Planner<'_> {
    /// The barrel behind `source`, or `None` when the statement must stay.
    fn barrel_for(&self, source: &str) -> Option<Arc<BarrelFile>> {
        if is_node_builtin(source) {
            trace!("Skipping built-in '{}'", source);
            return None;
        }
        let resolved = match self.graph.resolver().resolve(source, self.file) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Leaving '{}' in {} untouched: {}", source, self.file.display(), e);
                return None;
            }
        };
        if resolved.used_manifest_exports_field() {
            trace!("'{}' resolved through an exports map", source);
            return None;
        }
        match self.graph.get_barrel_file(resolved.barrel_source()) {
            Ok(barrel) if barrel.is_barrel() => Some(barrel),
            Ok(_) => None,
            Err(e) => {
                warn!("Leaving '{}' in {} untouched: {}", source, self.file.display(), e);
                None
            }
        }
    }

    fn module_specifier(&self, spec: &Specifier) -> String {
        let install_dirs = self.graph.resolver().config().modules_dirs();
        let mut target = spec.module_path.clone();
        if self.kind == ModuleKind::CommonJs && self.graph.resolver().is_dependency_path(&target) {
            match self.graph.resolver().packages().convert_esm_sibling_to_cjs(&target) {
                Ok(Some(cjs)) => target = cjs,
                Ok(None) => {}
                Err(e) => debug!("No CommonJS sibling for {}: {}", target.display(), e),
            }
        }
        if paths::is_dependency_path(&target, install_dirs) {
            paths::module_specifier(&target, install_dirs)
        } else {
            let from_dir = self.file.parent().unwrap_or(self.file);
            relative_specifier(from_dir, &target)
        }
    }

    /// `requests` pairs the name asked of the barrel with its alias. `None`
    /// unless the barrel answers every request.
    fn direct_bindings(
        &self,
        module: &str,
        requests: &[(String, String)],
    ) -> Option<Vec<DirectBinding>> {
        let barrel = self.barrel_for(module)?;
        let mut bindings = Vec::with_capacity(requests.len());
        for (name, alias) in requests {
            let Some(spec) =
                barrel.get_direct_specifier(name).filter(|spec| spec.module_path != barrel.path())
            else {
                debug!("'{}' is not re-exported by {}", name, barrel.path().display());
                return None;
            };
            bindings.push(DirectBinding {
                module_specifier: self.module_specifier(&spec),
                binding_name: spec.binding_name().to_string(),
                alias: alias.clone(),
                kind: spec.kind,
            });
        }
        Some(bindings)
    }

    fn plan(
        &self,
        shape: StatementShape,
        span: (usize, usize),
        source_text: &str,
        module: &str,
        requests: &[(String, String)],
    ) -> Option<StatementRewrite> {
        let bindings = self.direct_bindings(module, requests)?;
        let mut lines = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let quoted = serde_json::to_string(&binding.module_specifier).ok()?;
            lines.push(match shape {
                StatementShape::Import => render_import(binding, &quoted),
                StatementShape::ReExport => render_reexport(binding, &quoted),
            });
        }

        let (start, end) = span;
        Some(StatementRewrite {
            start,
            end,
            original: source_text[start..end].to_string(),
            replacement: lines.join("\n"),
            bindings,
        })
    }

    /// Splits a module-factory mock of a barrel into one mock per direct
    /// module, each factory keeping the properties its module defines.
    fn plan_mock(
        &self,
        span: (usize, usize),
        source_text: &str,
        module: &str,
        properties: &[(String, &str)],
    ) -> Option<StatementRewrite> {
        let requests: Vec<(String, String)> =
            properties.iter().map(|(name, _)| (name.clone(), name.clone())).collect();
        let bindings = self.direct_bindings(module, &requests)?;

        let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
        for (binding, (_, value)) in bindings.iter().zip(properties) {
            let entry = match binding.kind {
                SpecifierKind::Named => format!("{}: {}", binding.binding_name, value),
                SpecifierKind::Default => format!("__esModule: true, default: {}", value),
                SpecifierKind::Namespace => {
                    debug!("Cannot split the mock of namespace '{}'", binding.alias);
                    return None;
                }
            };
            match groups.iter_mut().find(|(m, _)| *m == binding.module_specifier) {
                Some((_, entries)) => entries.push(entry),
                None => groups.push((binding.module_specifier.as_str(), vec![entry])),
            }
        }

        let mut lines = Vec::with_capacity(groups.len());
        for (module, entries) in &groups {
            let quoted = serde_json::to_string(module).ok()?;
            lines.push(format!("jest.mock({}, () => ({{ {} }}));", quoted, entries.join(", ")));
        }

        let (start, end) = span;
        Some(StatementRewrite {
            start,
            end,
            original: source_text[start..end].to_string(),
            replacement: lines.join("\n"),
            bindings,
        })
    }
}

fn unparenthesized<'b, 'a>(mut expr: &'b Expression<'a>) -> &'b Expression<'a> {
    while let Expression::ParenthesizedExpression(pe) = expr {
        expr = &pe.expression;
    }
    expr
}

/// `jest.mock('source', () => ({ Name: value }))`: the mocked source and
/// each property name with the source text of its value. Automocks, spreads
/// and computed keys are not split.
fn mock_requests<'s>(
    stmt: &ExpressionStatement<'_>,
    source_text: &'s str,
) -> Option<(String, Vec<(String, &'s str)>)> {
    let Expression::CallExpression(call) = &stmt.expression else {
        return None;
    };
    let Expression::StaticMemberExpression(callee) = &call.callee else {
        return None;
    };
    if !matches!(&callee.object, Expression::Identifier(id) if id.name.as_str() == "jest")
        || callee.property.name.as_str() != "mock"
        || call.arguments.len() != 2
    {
        return None;
    }
    let Some(Expression::StringLiteral(module)) = call.arguments[0].as_expression() else {
        return None;
    };
    let Some(Expression::ArrowFunctionExpression(factory)) = call.arguments[1].as_expression()
    else {
        return None;
    };
    if !factory.expression {
        return None;
    }
    let Some(Statement::ExpressionStatement(body)) = factory.body.statements.first() else {
        return None;
    };
    let Expression::ObjectExpression(object) = unparenthesized(&body.expression) else {
        return None;
    };
    if object.properties.is_empty() {
        return None;
    }

    let mut properties = Vec::with_capacity(object.properties.len());
    for property in &object.properties {
        let prop = property.as_property()?;
        if prop.computed || !matches!(prop.kind, PropertyKind::Init) {
            return None;
        }
        let name = match &prop.key {
            PropertyKey::StaticIdentifier(id) => id.name.to_string(),
            PropertyKey::StringLiteral(lit) => lit.value.to_string(),
            _ => return None,
        };
        let value = prop.value.span();
        properties.push((name, &source_text[value.start as usize..value.end as usize]));
    }
    Some((module.value.to_string(), properties))
}

fn import_requests(decl: &ImportDeclaration) -> Option<Vec<(String, String)>> {
    if decl.import_kind.is_type() {
        return None;
    }
    let specifiers = decl.specifiers.as_ref().filter(|s| !s.is_empty())?;
    specifiers
        .iter()
        .map(|spec| match spec {
            ImportDeclarationSpecifier::ImportSpecifier(s) if !s.import_kind.is_type() => {
                Some((s.imported.name().to_string(), s.local.name.to_string()))
            }
            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                Some(("default".to_string(), s.local.name.to_string()))
            }
            _ => None,
        })
        .collect()
}

fn reexport_requests(decl: &ExportNamedDeclaration) -> Option<Vec<(String, String)>> {
    if decl.export_kind.is_type() || decl.declaration.is_some() || decl.specifiers.is_empty() {
        return None;
    }
    decl.specifiers
        .iter()
        .map(|spec| {
            (!spec.export_kind.is_type())
                .then(|| (spec.local.name().to_string(), spec.exported.name().to_string()))
        })
        .collect()
}

/// Rewrites every import, `export … from` or `jest.mock` factory statement of
/// `file` that goes through a content-bearing barrel. Statements with any
/// binding the barrel cannot answer are left untouched.
pub fn plan_rewrites(
    graph: &BarrelGraph,
    options: &RewriteOptions,
    file: &Path,
    source: &str,
) -> Vec<StatementRewrite> {
    let allocator = Allocator::default();
    let ParserReturn { program, errors, panicked, .. } =
        OxcParser::new(&allocator, source, source_type_for(file)).parse();
    if panicked || !errors.is_empty() {
        debug!("Skipping unparseable {}", file.display());
        return Vec::new();
    }

    let planner = Planner { graph, file, kind: consumer_kind(file, options) };
    let mut rewrites = Vec::new();
    for stmt in &program.body {
        let planned = match stmt {
            Statement::ImportDeclaration(decl) => import_requests(decl).and_then(|requests| {
                planner.plan(
                    StatementShape::Import,
                    (decl.span.start as usize, decl.span.end as usize),
                    source,
                    decl.source.value.as_str(),
                    &requests,
                )
            }),
            Statement::ExportNamedDeclaration(decl) => {
                let module = decl.source.as_ref().map(|s| s.value.as_str());
                module.zip(reexport_requests(decl)).and_then(|(module, requests)| {
                    planner.plan(
                        StatementShape::ReExport,
                        (decl.span.start as usize, decl.span.end as usize),
                        source,
                        module,
                        &requests,
                    )
                })
            }
            Statement::ExpressionStatement(stmt) => {
                mock_requests(stmt, source).and_then(|(module, properties)| {
                    planner.plan_mock(
                        (stmt.span.start as usize, stmt.span.end as usize),
                        source,
                        &module,
                        &properties,
                    )
                })
            }
            _ => None,
        };
        if let Some(rewrite) = planned {
            trace!("Planned rewrite of '{}'", rewrite.original);
            rewrites.push(rewrite);
        }
    }
    debug!("Planned {} rewrites in {}", rewrites.len(), file.display());
    rewrites
}

/// Splices `rewrites` into `source`.
pub fn rewrite_source(source: &str, rewrites: &[StatementRewrite]) -> String {
    let mut ordered: Vec<&StatementRewrite> = rewrites.iter().collect();
    ordered.sort_by_key(|r| std::cmp::Reverse(r.start));
    let mut output = source.to_string();
    for rewrite in ordered {
        output.replace_range(rewrite.start..rewrite.end, &rewrite.replacement);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, path::PathBuf};
    use tempfile::TempDir;
    use unbarrel_core::{Resolver, ResolverConfig};

    fn create_test_file(dir: &Path, path: &str, content: &str) -> PathBuf {
        let file_path = dir.join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    fn graph(root: &Path) -> BarrelGraph {
        BarrelGraph::new(Resolver::new(ResolverConfig::new(root)))
    }

    const ESM: RewriteOptions = RewriteOptions { consumer_kind: ModuleKind::Module };
    const CJS: RewriteOptions = RewriteOptions { consumer_kind: ModuleKind::CommonJs };

    fn components(root: &Path) {
        create_test_file(
            root,
            "src/components/index.js",
            "export { Button } from './Button/Button';\nexport { default as Icon } from './Icon/Icon';",
        );
        create_test_file(root, "src/components/Button/Button.js", "export const Button = 1;");
        create_test_file(root, "src/components/Icon/Icon.js", "export default 1;");
    }

    #[test]
    fn test_rewrites_named_and_default_bindings() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        components(root);
        let source = "import { Button, Icon as MyIcon } from './components';\nrender(Button, MyIcon);\n";
        let app = create_test_file(root, "src/app.js", source);

        let graph = graph(root);
        let rewrites = plan_rewrites(&graph, &ESM, &app, source);
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].original, "import { Button, Icon as MyIcon } from './components';");
        assert_eq!(
            rewrites[0].replacement,
            "import { Button } from \"./components/Button/Button.js\";\n\
             import MyIcon from \"./components/Icon/Icon.js\";"
        );
        assert_eq!(rewrites[0].bindings[1].binding_name, "default");

        let output = rewrite_source(source, &rewrites);
        assert!(output.ends_with("render(Button, MyIcon);\n"));
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        components(root);
        let source = "import { Button } from './components';\n";
        let app = create_test_file(root, "src/app.js", source);

        let graph = graph(root);
        let once = rewrite_source(source, &plan_rewrites(&graph, &ESM, &app, source));
        assert_ne!(once, source);
        let twice_plan = plan_rewrites(&graph, &ESM, &app, &once);
        assert!(twice_plan.is_empty());
        assert_eq!(rewrite_source(&once, &twice_plan), once);
    }

    #[test]
    fn test_direct_import_is_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        components(root);
        let source = "import { Button } from './components/Button/Button';\n";
        let app = create_test_file(root, "src/app.js", source);

        assert!(plan_rewrites(&graph(root), &ESM, &app, source).is_empty());
    }

    #[test]
    fn test_statements_left_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        components(root);
        let source = "import * as all from './components';\n\
                      import { Button, Missing } from './components';\n\
                      import type { Props } from './components';\n\
                      import { readFile } from 'fs';\n\
                      import { nothing } from './nowhere';\n\
                      import './components';\n";
        let app = create_test_file(root, "src/app.ts", source);

        assert!(plan_rewrites(&graph(root), &ESM, &app, source).is_empty());
    }

    #[test]
    fn test_rewrites_export_from() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        components(root);
        let source = "export { Button as PrimaryButton, Icon } from './components';\n";
        let app = create_test_file(root, "src/app.js", source);

        let rewrites = plan_rewrites(&graph(root), &ESM, &app, source);
        assert_eq!(rewrites.len(), 1);
        assert_eq!(
            rewrites[0].replacement,
            "export { Button as PrimaryButton } from \"./components/Button/Button.js\";\n\
             export { default as Icon } from \"./components/Icon/Icon.js\";"
        );
    }

    #[test]
    fn test_commonjs_consumer_gets_cjs_sibling() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(
            root,
            "node_modules/ui/package.json",
            r#"{"name": "ui", "main": "./cjs/index.js", "module": "./esm/index.js"}"#,
        );
        create_test_file(root, "node_modules/ui/esm/index.js", "export { Button } from './Button/Button.js';");
        create_test_file(root, "node_modules/ui/esm/Button/Button.js", "export const Button = 1;");
        create_test_file(root, "node_modules/ui/cjs/index.js", "module.exports = require('./Button/Button.js');");
        create_test_file(root, "node_modules/ui/cjs/Button/Button.js", "exports.Button = 1;");
        let source = "import { Button } from 'ui';\n";
        let app = create_test_file(root, "src/app.js", source);

        let graph = graph(root);
        let cjs = plan_rewrites(&graph, &CJS, &app, source);
        assert_eq!(cjs[0].replacement, "import { Button } from \"ui/cjs/Button/Button.js\";");

        let esm = plan_rewrites(&graph, &ESM, &app, source);
        assert_eq!(esm[0].replacement, "import { Button } from \"ui/esm/Button/Button.js\";");
    }

    #[test]
    fn test_commonjs_project_still_sees_through_dual_barrels() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_file(root, "package.json", r#"{"name": "app", "type": "commonjs"}"#);
        create_test_file(
            root,
            "node_modules/ui/package.json",
            r#"{"name": "ui", "main": "./cjs/index.js", "module": "./esm/index.js"}"#,
        );
        create_test_file(root, "node_modules/ui/esm/index.js", "export { Button } from './Button/Button.js';");
        create_test_file(root, "node_modules/ui/esm/Button/Button.js", "export const Button = 1;");
        create_test_file(root, "node_modules/ui/cjs/index.js", "module.exports = require('./Button/Button.js');");
        create_test_file(root, "node_modules/ui/cjs/Button/Button.js", "exports.Button = 1;");
        let source = "import { Button } from 'ui';\n";
        let app = create_test_file(root, "src/app.js", source);

        let graph = graph(root);
        let resolved = graph.resolver().resolve("ui", &app).unwrap();
        assert!(!resolved.is_dual());
        assert_eq!(resolved.barrel_source(), root.join("node_modules/ui/esm/index.js"));

        let rewrites = plan_rewrites(&graph, &CJS, &app, source);
        assert_eq!(rewrites.len(), 1);
        assert_eq!(rewrites[0].replacement, "import { Button } from \"ui/cjs/Button/Button.js\";");
    }

    #[test]
    fn test_splits_jest_mock_factory_by_direct_module() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        components(root);
        let mock = "jest.mock('./components', () => ({\n  Button: () => null,\n  Icon: 'icon',\n}));";
        let source = format!("import {{ Button }} from './components';\n{mock}\n");
        let test_file = create_test_file(root, "src/app.test.js", &source);

        let rewrites = plan_rewrites(&graph(root), &ESM, &test_file, &source);
        assert_eq!(rewrites.len(), 2);
        assert_eq!(rewrites[1].original, mock);
        assert_eq!(
            rewrites[1].replacement,
            "jest.mock(\"./components/Button/Button.js\", () => ({ Button: () => null }));\n\
             jest.mock(\"./components/Icon/Icon.js\", () => ({ __esModule: true, default: 'icon' }));"
        );
        assert_eq!(rewrites[1].bindings.len(), 2);
        assert_eq!(rewrites[1].bindings[1].kind, SpecifierKind::Default);
    }

    #[test]
    fn test_mocks_that_cannot_be_split_are_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        components(root);
        let source = "jest.mock('./components');\n\
                      jest.mock('./components', () => ({ ...jest.requireActual('./components'), Button: 1 }));\n\
                      jest.mock('./components', () => ({ Missing: 1 }));\n\
                      jest.mock('./components', () => ({ [key]: 1 }));\n\
                      other.mock('./components', () => ({ Button: 1 }));\n";
        let test_file = create_test_file(root, "src/app.test.js", source);

        assert!(plan_rewrites(&graph(root), &ESM, &test_file, source).is_empty());
    }

    #[test]
    fn test_relative_specifier() {
        assert_eq!(
            relative_specifier(Path::new("/p/src"), Path::new("/p/src/a/b.js")),
            "./a/b.js"
        );
        assert_eq!(
            relative_specifier(Path::new("/p/src/pages"), Path::new("/p/src/a/b.js")),
            "../a/b.js"
        );
    }
}
