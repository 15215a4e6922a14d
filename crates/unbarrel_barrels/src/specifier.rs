use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecifierKind {
    Default,
    Named,
    Namespace,
}

impl SpecifierKind {
    /// Kind of the binding a module exposes under `name`.
    pub fn of_binding(name: &str) -> Self {
        match name {
            "default" => SpecifierKind::Default,
            "*" => SpecifierKind::Namespace,
            _ => SpecifierKind::Named,
        }
    }
}

/// Which side of a binding `external_name` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// `external_name` is the name a barrel exports the binding under.
    Export,
    /// `external_name` is the name requested from `module_path`.
    Import,
}

/// One binding of one module, seen either from the exporting barrel or from
/// an importer.
///
/// `module_path` always names the module that defines the binding under
/// `local_name` (for an [`Role::Export`]) or exposes it under `external_name`
/// (for an [`Role::Import`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specifier {
    pub role: Role,
    pub module_path: PathBuf,
    pub local_name: String,
    pub external_name: String,
    pub kind: SpecifierKind,
}

impl Specifier {
    /// `module_path` exposes `local` and the barrel re-exports it as `exported`.
    pub fn export(
        module_path: impl Into<PathBuf>,
        local: impl Into<String>,
        exported: impl Into<String>,
    ) -> Self {
        let local = local.into();
        Self {
            role: Role::Export,
            module_path: module_path.into(),
            kind: SpecifierKind::of_binding(&local),
            local_name: local,
            external_name: exported.into(),
        }
    }

    /// An importer binds `imported` from `module_path` as `local`.
    pub fn import(
        module_path: impl Into<PathBuf>,
        imported: impl Into<String>,
        local: impl Into<String>,
    ) -> Self {
        let imported = imported.into();
        Self {
            role: Role::Import,
            module_path: module_path.into(),
            kind: SpecifierKind::of_binding(&imported),
            external_name: imported,
            local_name: local.into(),
        }
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// The name `module_path` itself exposes the binding under.
    pub fn binding_name(&self) -> &str {
        match self.role {
            Role::Export => &self.local_name,
            Role::Import => &self.external_name,
        }
    }

    /// The export view of the same binding, re-exported as `exported`.
    pub fn to_export(&self, exported: &str) -> Specifier {
        Specifier::export(self.module_path.clone(), self.binding_name(), exported)
    }

    /// The import view of the same binding, bound locally as `local`.
    pub fn to_import(&self, local: &str) -> Specifier {
        Specifier::import(self.module_path.clone(), self.binding_name(), local)
    }
}
