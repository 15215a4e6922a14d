use log::{debug, trace};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::{Parser as OxcParser, ParserReturn};
use oxc_span::SourceType;
use std::path::Path;

/// `imported` is `"default"` for default imports and `"*"` for namespace imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub imported: String,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBinding {
    pub local: String,
    pub exported: String,
}

/// Top-level statement classification used by the barrel scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleItem {
    /// `import … from 'source'`; no bindings means a side-effect import.
    Import { source: String, bindings: Vec<ImportBinding> },
    /// `export { a as b } from 'source'`
    ReExport { source: String, bindings: Vec<ExportBinding> },
    /// `export { a as b }`
    ExportLocal { bindings: Vec<ExportBinding> },
    /// `export const a = …`, `export function f() {}`, …
    ExportDeclaration { names: Vec<String> },
    /// `export * from 'source'` or `export * as alias from 'source'`
    ExportAll { source: String, alias: Option<String> },
    /// `export default …`; `identifier` is set for `export default name`.
    ExportDefault { identifier: Option<String> },
    /// Erased at runtime: type-only imports/exports, type declarations, `;`.
    Inert,
    Other,
}

pub trait ModuleParser: Send + Sync {
    /// Returns `None` when `source` cannot be parsed cleanly.
    fn parse_module(&self, path: &Path, source: &str) -> Option<Vec<ModuleItem>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OxcModuleParser;

impl ModuleParser for OxcModuleParser {
    fn parse_module(&self, path: &Path, source: &str) -> Option<Vec<ModuleItem>> {
        let allocator = Allocator::default();
        let ParserReturn { program, errors, panicked, .. } =
            OxcParser::new(&allocator, source, source_type_for(path)).parse();
        if panicked || !errors.is_empty() {
            debug!("Failed to parse {} ({} diagnostics)", path.display(), errors.len());
            return None;
        }

        let items: Vec<ModuleItem> = program.body.iter().map(classify_statement).collect();
        trace!("Classified {} statements in {}", items.len(), path.display());
        Some(items)
    }
}

fn classify_statement(stmt: &Statement) -> ModuleItem {
    match stmt {
        Statement::ImportDeclaration(decl) => classify_import(decl),
        Statement::ExportNamedDeclaration(decl) => classify_named_export(decl),
        Statement::ExportAllDeclaration(decl) => {
            if decl.export_kind.is_type() {
                return ModuleItem::Inert;
            }
            ModuleItem::ExportAll {
                source: decl.source.value.to_string(),
                alias: decl.exported.as_ref().map(|name| name.name().to_string()),
            }
        }
        Statement::ExportDefaultDeclaration(decl) => match &decl.declaration {
            ExportDefaultDeclarationKind::Identifier(ident) => {
                ModuleItem::ExportDefault { identifier: Some(ident.name.to_string()) }
            }
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => ModuleItem::Inert,
            _ => ModuleItem::ExportDefault { identifier: None },
        },
        Statement::TSTypeAliasDeclaration(_)
        | Statement::TSInterfaceDeclaration(_)
        | Statement::EmptyStatement(_) => ModuleItem::Inert,
        _ => ModuleItem::Other,
    }
}

fn classify_import(decl: &ImportDeclaration) -> ModuleItem {
    let source = decl.source.value.to_string();
    if decl.import_kind.is_type() {
        return ModuleItem::Inert;
    }
    let Some(specifiers) = &decl.specifiers else {
        return ModuleItem::Import { source, bindings: Vec::new() };
    };
    if specifiers.is_empty() {
        // `import {} from 'x'` still evaluates the module
        return ModuleItem::Import { source, bindings: Vec::new() };
    }

    let bindings: Vec<ImportBinding> = specifiers
        .iter()
        .filter_map(|spec| match spec {
            ImportDeclarationSpecifier::ImportSpecifier(s) if s.import_kind.is_type() => None,
            ImportDeclarationSpecifier::ImportSpecifier(s) => Some(ImportBinding {
                imported: s.imported.name().to_string(),
                local: s.local.name.to_string(),
            }),
            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => Some(ImportBinding {
                imported: "default".to_string(),
                local: s.local.name.to_string(),
            }),
            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => Some(ImportBinding {
                imported: "*".to_string(),
                local: s.local.name.to_string(),
            }),
        })
        .collect();

    if bindings.is_empty() {
        return ModuleItem::Inert;
    }
    ModuleItem::Import { source, bindings }
}

fn classify_named_export(decl: &ExportNamedDeclaration) -> ModuleItem {
    if decl.export_kind.is_type() {
        return ModuleItem::Inert;
    }

    if let Some(declaration) = &decl.declaration {
        return match declaration_names(declaration) {
            Some(names) => ModuleItem::ExportDeclaration { names },
            None => ModuleItem::Inert,
        };
    }

    let bindings: Vec<ExportBinding> = decl
        .specifiers
        .iter()
        .filter(|spec| !spec.export_kind.is_type())
        .map(|spec| ExportBinding {
            local: spec.local.name().to_string(),
            exported: spec.exported.name().to_string(),
        })
        .collect();
    if bindings.is_empty() && !decl.specifiers.is_empty() {
        return ModuleItem::Inert;
    }

    match &decl.source {
        Some(source) => ModuleItem::ReExport { source: source.value.to_string(), bindings },
        None => ModuleItem::ExportLocal { bindings },
    }
}

/// Names bound by an exported declaration; `None` for type-only declarations.
fn declaration_names(declaration: &Declaration) -> Option<Vec<String>> {
    let names = match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|d| d.id.get_binding_identifiers())
            .map(|ident| ident.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::TSEnumDeclaration(e) => vec![e.id.name.to_string()],
        Declaration::TSTypeAliasDeclaration(_) | Declaration::TSInterfaceDeclaration(_) => {
            return None;
        }
        _ => Vec::new(),
    };
    Some(names)
}

fn source_type_for(path: &Path) -> SourceType {
    let ext = path.extension().and_then(|e| e.to_str());

    SourceType::default()
        .with_module(true)
        .with_jsx(matches!(ext, Some("tsx") | Some("jsx") | Some("js")))
        .with_typescript(matches!(ext, Some("ts") | Some("tsx") | Some("mts") | Some("cts")))
}
